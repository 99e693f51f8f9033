//! Backend dispatch: applying one mutation against the hosted data API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::mutation::{Mutation, OperationKind};
use crate::config::BackendConfig;
use crate::error::{DispatchError, MarketError};

/// Longest response body kept in a [`DispatchError::Rejected`].
const MAX_ERROR_BODY: usize = 512;

/// Applies a mutation to the remote backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Perform the mutation. `Ok` means the backend confirmed it.
    async fn dispatch(&self, mutation: &Mutation) -> Result<(), DispatchError>;
}

/// A request ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: Method,
    pub url: Url,
    pub body: Option<Value>,
}

/// Dispatcher for a PostgREST-style REST API (`/rest/v1/{table}`).
pub struct HttpDispatcher {
    client: Client,
    base: Url,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpDispatcher {
    /// Build a dispatcher from backend settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be
    /// created.
    pub fn new(config: &BackendConfig) -> Result<Self, MarketError> {
        let base = Url::parse(&config.url)
            .map_err(|e| MarketError::Config(format!("Invalid backend url {}: {e}", config.url)))?;
        let timeout = Duration::from_millis(config.request_timeout_ms);

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MarketError::Backend(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base,
            api_key: config.api_key.clone(),
            timeout,
        })
    }

    /// Map a mutation onto method, URL and body.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Encode` if the payload cannot be serialized or
    /// the base URL cannot carry a path.
    pub fn request_for(&self, mutation: &Mutation) -> Result<RequestSpec, DispatchError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| DispatchError::Encode(format!("{} cannot be a base url", self.base)))?
            .pop_if_empty()
            .extend(["rest", "v1", mutation.resource_type().table()]);

        if let Some(id) = mutation.resource_id() {
            url.query_pairs_mut().append_pair("id", &format!("eq.{id}"));
        }

        let method = match mutation.operation() {
            OperationKind::Create => Method::POST,
            OperationKind::Update => Method::PATCH,
            OperationKind::Delete => Method::DELETE,
        };

        let body = mutation
            .payload_json()
            .map_err(|e| DispatchError::Encode(e.to_string()))?;

        Ok(RequestSpec { method, url, body })
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, mutation: &Mutation) -> Result<(), DispatchError> {
        let spec = self.request_for(mutation)?;

        debug!(
            method = %spec.method,
            url = %spec.url,
            mutation = %mutation.label(),
            "dispatch_starting"
        );

        let mut request = self
            .client
            .request(spec.method, spec.url)
            .header("Prefer", "return=minimal");

        if let Some(key) = &self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }
        if let Some(body) = &spec.body {
            request = request.json(body);
        }

        match request.send().await {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => {
                let status = resp.status().as_u16();
                let mut body = resp.text().await.unwrap_or_default();
                if body.len() > MAX_ERROR_BODY {
                    let cut = (0..=MAX_ERROR_BODY)
                        .rev()
                        .find(|i| body.is_char_boundary(*i))
                        .unwrap_or(0);
                    body.truncate(cut);
                }

                warn!(status_code = status, mutation = %mutation.label(), "dispatch_rejected");
                Err(DispatchError::Rejected { status, body })
            },
            Err(e) if e.is_timeout() => {
                Err(DispatchError::Timeout(u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)))
            },
            Err(e) => Err(DispatchError::Network(e.to_string())),
        }
    }
}
