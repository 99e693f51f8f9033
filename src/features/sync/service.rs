//! Background wiring: drain when connectivity returns and on a timer.
//!
//! A [`SyncService`] is built once at startup and owns the drain task, its
//! timer and its connectivity subscription. [`SyncService::teardown`] stops
//! all three; dropping the service without it aborts the task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::connectivity::Connectivity;
use super::dispatch::Dispatcher;
use super::drainer::{DrainReport, QueueDrainer};
use super::producer::QueueProducer;
use super::store::QueueStore;

/// Reports kept for slow subscribers before they start lagging.
const REPORT_BUFFER: usize = 16;

/// Shortest period accepted for background timers.
pub(crate) const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Interval that fires immediately, then every `every` (at least
/// [`MIN_PERIOD`]), delaying rather than bursting after a stall.
pub(crate) fn ticker(every: Duration) -> Interval {
    if every < MIN_PERIOD {
        warn!(requested = ?every, used = ?MIN_PERIOD, "timer_period_raised");
    }
    let mut ticker = tokio::time::interval(every.max(MIN_PERIOD));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Timing knobs for the service.
#[derive(Debug, Clone, Copy)]
pub struct ServiceOptions {
    /// Period of the safety-net drain while online
    pub drain_interval: Duration,
    /// Upper bound for one backend dispatch
    pub dispatch_timeout: Duration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            drain_interval: Duration::from_secs(60),
            dispatch_timeout: Duration::from_secs(15),
        }
    }
}

/// What caused a drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Reconnect,
    Interval,
}

impl Trigger {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Reconnect => "reconnect",
            Self::Interval => "interval",
        }
    }
}

/// Owns the offline queue's producer, drainer and background triggers.
pub struct SyncService {
    producer: QueueProducer,
    drainer: Arc<QueueDrainer>,
    reports: broadcast::Sender<DrainReport>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SyncService {
    /// Start the service. Must be called inside a tokio runtime.
    #[must_use]
    pub fn start(
        store: Arc<QueueStore>,
        dispatcher: Arc<dyn Dispatcher>,
        connectivity: Arc<dyn Connectivity>,
        options: ServiceOptions,
    ) -> Self {
        let producer = QueueProducer::new(store.clone());
        let drainer = Arc::new(QueueDrainer::new(
            store,
            dispatcher,
            connectivity.clone(),
            options.dispatch_timeout,
        ));
        let (reports, _) = broadcast::channel(REPORT_BUFFER);
        let (shutdown, shutdown_rx) = watch::channel(false);
        // Subscribe before spawning so a transition right after `start` is not missed
        let online_rx = connectivity.subscribe();

        let task = tokio::spawn(run(
            drainer.clone(),
            connectivity,
            online_rx,
            reports.clone(),
            options.drain_interval,
            shutdown_rx,
        ));

        info!(
            drain_interval_secs = options.drain_interval.as_secs(),
            dispatch_timeout_secs = options.dispatch_timeout.as_secs(),
            "sync_service_started"
        );

        Self {
            producer,
            drainer,
            reports,
            shutdown,
            task: Some(task),
        }
    }

    /// Handle for recording mutations; clone it into call sites.
    #[must_use]
    pub const fn producer(&self) -> &QueueProducer {
        &self.producer
    }

    #[must_use]
    pub fn store(&self) -> &Arc<QueueStore> {
        self.drainer.store()
    }

    /// Observe every drain report the service produces.
    #[must_use]
    pub fn subscribe_reports(&self) -> broadcast::Receiver<DrainReport> {
        self.reports.subscribe()
    }

    /// Run a pass now, outside the timer. Subject to the single-flight guard.
    pub async fn drain_now(&self) -> DrainReport {
        let report = self.drainer.drain().await;
        let _ = self.reports.send(report.clone());
        report
    }

    /// Stop the timer, drop the connectivity subscription and wait for any
    /// in-flight pass to finish.
    pub async fn teardown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "sync_service_task_failed");
            }
        }
        info!("sync_service_stopped");
    }
}

impl Drop for SyncService {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            warn!("sync_service_dropped_without_teardown");
            task.abort();
        }
    }
}

async fn run(
    drainer: Arc<QueueDrainer>,
    connectivity: Arc<dyn Connectivity>,
    mut online_rx: watch::Receiver<bool>,
    reports: broadcast::Sender<DrainReport>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut listening = true;
    let mut ticker = ticker(every);
    let mut passes = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            changed = online_rx.changed(), if listening => {
                if changed.is_err() {
                    warn!("connectivity_source_closed");
                    listening = false;
                    continue;
                }
                if *online_rx.borrow_and_update() {
                    spawn_pass(&mut passes, &drainer, &reports, Trigger::Reconnect);
                } else {
                    debug!("connectivity_lost");
                }
            }
            _ = ticker.tick() => {
                if connectivity.is_online() {
                    spawn_pass(&mut passes, &drainer, &reports, Trigger::Interval);
                }
            }
            Some(joined) = passes.join_next(), if !passes.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "queue_drain_task_failed");
                }
            }
        }
    }

    drop(online_rx);
    while let Some(joined) = passes.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "queue_drain_task_failed");
        }
    }
}

fn spawn_pass(
    passes: &mut JoinSet<()>,
    drainer: &Arc<QueueDrainer>,
    reports: &broadcast::Sender<DrainReport>,
    trigger: Trigger,
) {
    debug!(trigger = trigger.as_str(), "queue_drain_triggered");
    let drainer = drainer.clone();
    let reports = reports.clone();
    passes.spawn(async move {
        let report = drainer.drain().await;
        let _ = reports.send(report);
    });
}
