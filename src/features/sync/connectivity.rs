//! Online/offline signal consumed by the drainer and the sync service.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

use super::service::ticker;
use crate::config::BackendConfig;
use crate::error::MarketError;

/// Source of network connectivity status.
pub trait Connectivity: Send + Sync {
    /// Current status. Cheap; not a guarantee the next request succeeds.
    fn is_online(&self) -> bool;

    /// Receive status changes. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Host-driven connectivity flag.
///
/// Whatever observes the network (an OS hook, an [`HttpProbe`], a test)
/// calls [`NetworkStatus::set_online`]; subscribers are only woken on actual
/// transitions.
#[derive(Debug)]
pub struct NetworkStatus {
    tx: watch::Sender<bool>,
}

impl NetworkStatus {
    #[must_use]
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx }
    }

    /// Record the current status. Returns whether it changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            info!(online, "connectivity_changed");
        }
        changed
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Connectivity for NetworkStatus {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Decides connectivity by requesting the backend's health path.
///
/// Any HTTP response counts as online (an auth error still proves the
/// backend is reachable); only transport failures count as offline.
pub struct HttpProbe {
    client: Client,
    url: Url,
    status: Arc<NetworkStatus>,
}

impl HttpProbe {
    /// # Errors
    ///
    /// Returns an error if the health URL is invalid or the HTTP client
    /// cannot be created.
    pub fn new(config: &BackendConfig, status: Arc<NetworkStatus>) -> Result<Self, MarketError> {
        let base = Url::parse(&config.url)
            .map_err(|e| MarketError::Config(format!("Invalid backend url {}: {e}", config.url)))?;
        let url = health_url(&base, &config.health_path)?;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| MarketError::Backend(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, url, status })
    }

    /// Probe once and publish the result.
    pub async fn check(&self) -> bool {
        let online = match self.client.get(self.url.clone()).send().await {
            Ok(resp) => {
                debug!(url = %self.url, status_code = resp.status().as_u16(), "probe_reachable");
                true
            },
            Err(e) => {
                debug!(url = %self.url, error = %e, "probe_unreachable");
                false
            },
        };

        self.status.set_online(online);
        online
    }

    /// Probe every `every` until the returned handle is aborted.
    #[must_use]
    pub fn spawn(self, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = ticker(every);
            loop {
                ticker.tick().await;
                self.check().await;
            }
        })
    }
}

/// Append `health_path` to the base URL's own path, as request URLs do.
fn health_url(base: &Url, health_path: &str) -> Result<Url, MarketError> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| MarketError::Config(format!("{base} cannot be a base url")))?;
        segments
            .pop_if_empty()
            .extend(health_path.split('/').filter(|s| !s.is_empty()));
        if health_path.ends_with('/') {
            segments.push("");
        }
    }
    Ok(url)
}
