//! Replays queued mutations against the backend.
//!
//! A pass works on a snapshot of the queue, dispatches entries strictly in
//! order and stops at the first failure, so a later mutation never lands
//! before one it may depend on. Only the applied prefix is removed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use super::connectivity::Connectivity;
use super::dispatch::Dispatcher;
use super::mutation::QueuedMutation;
use super::store::QueueStore;
use crate::error::DispatchError;

/// How a drain pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainOutcome {
    /// Connectivity reported offline; nothing was attempted
    Offline,
    /// Another pass was running; this one did nothing
    AlreadyRunning,
    /// The queue was empty
    Empty,
    /// Every entry in the snapshot was applied
    Completed,
    /// An entry failed; it and everything after it stay queued
    Halted,
}

impl std::fmt::Display for DrainOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Offline => "offline",
            Self::AlreadyRunning => "already_running",
            Self::Empty => "empty",
            Self::Completed => "completed",
            Self::Halted => "halted",
        };
        write!(f, "{s}")
    }
}

/// The entry that stopped a pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrainFailure {
    /// Position in the snapshot
    pub index: usize,
    /// e.g. `listing/update`
    pub mutation: String,
    pub resource_id: Option<String>,
    pub error: String,
    pub transient: bool,
}

/// Result of one drain pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrainReport {
    pub outcome: DrainOutcome,
    /// Entries in the snapshot
    pub snapshot: usize,
    pub applied: usize,
    /// Entries left in the queue after the commit
    pub remaining: usize,
    pub failure: Option<DrainFailure>,
}

impl DrainReport {
    const fn idle(outcome: DrainOutcome, remaining: usize) -> Self {
        Self {
            outcome,
            snapshot: 0,
            applied: 0,
            remaining,
            failure: None,
        }
    }
}

/// Releases the single-flight flag when a pass ends, even on panic or
/// cancellation.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drains the queue against a [`Dispatcher`].
pub struct QueueDrainer {
    store: Arc<QueueStore>,
    dispatcher: Arc<dyn Dispatcher>,
    connectivity: Arc<dyn Connectivity>,
    dispatch_timeout: Duration,
    in_flight: AtomicBool,
}

impl QueueDrainer {
    #[must_use]
    pub fn new(
        store: Arc<QueueStore>,
        dispatcher: Arc<dyn Dispatcher>,
        connectivity: Arc<dyn Connectivity>,
        dispatch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            dispatcher,
            connectivity,
            dispatch_timeout,
            in_flight: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<QueueStore> {
        &self.store
    }

    /// Whether a pass is currently running.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one drain pass.
    ///
    /// Never fails: backend and storage errors end up in the report and the
    /// log, and the affected entries stay queued for the next pass.
    pub async fn drain(&self) -> DrainReport {
        let Some(_flight) = FlightGuard::acquire(&self.in_flight) else {
            info!(key = %self.store.key(), "queue_drain_already_running");
            return DrainReport::idle(DrainOutcome::AlreadyRunning, self.store.len());
        };

        if !self.connectivity.is_online() {
            return DrainReport::idle(DrainOutcome::Offline, self.store.len());
        }

        let snapshot = self.store.read_all();
        if snapshot.is_empty() {
            return DrainReport::idle(DrainOutcome::Empty, 0);
        }

        info!(key = %self.store.key(), entries = snapshot.len(), "queue_drain_starting");

        let mut applied = 0;
        let mut failure = None;

        for (index, queued) in snapshot.iter().enumerate() {
            match self.dispatch_one(queued).await {
                Ok(()) => applied += 1,
                Err(e) => {
                    warn!(
                        index,
                        mutation = %queued.mutation.label(),
                        resource_id = queued.mutation.resource_id().unwrap_or(""),
                        transient = e.is_transient(),
                        error = %e,
                        "dispatch_failed"
                    );
                    failure = Some(DrainFailure {
                        index,
                        mutation: queued.mutation.label(),
                        resource_id: queued.mutation.resource_id().map(String::from),
                        error: e.to_string(),
                        transient: e.is_transient(),
                    });
                    break;
                },
            }
        }

        let remaining = if applied == 0 {
            self.store.len()
        } else {
            match self.store.commit_applied(&snapshot[..applied]) {
                Ok(remaining) => remaining,
                Err(e) => {
                    // Applied entries stay persisted and will be dispatched again
                    error!(applied, error = %e, "queue_commit_failed");
                    self.store.len()
                },
            }
        };

        let report = DrainReport {
            outcome: if failure.is_some() {
                DrainOutcome::Halted
            } else {
                DrainOutcome::Completed
            },
            snapshot: snapshot.len(),
            applied,
            remaining,
            failure,
        };

        info!(
            outcome = %report.outcome,
            snapshot = report.snapshot,
            applied = report.applied,
            remaining = report.remaining,
            "queue_drain_complete"
        );

        report
    }

    async fn dispatch_one(&self, queued: &QueuedMutation) -> Result<(), DispatchError> {
        match tokio::time::timeout(
            self.dispatch_timeout,
            self.dispatcher.dispatch(&queued.mutation),
        )
        .await
        {
            Ok(result) => result,
            Err(_elapsed) => Err(DispatchError::Timeout(
                u64::try_from(self.dispatch_timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::sync::connectivity::NetworkStatus;
    use crate::features::sync::dispatch::MockDispatcher;
    use crate::features::sync::mutation::{Change, ListingPatch, Mutation, NewListing};
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use mockall::Sequence;
    use tokio::sync::Notify;

    const TIMEOUT: Duration = Duration::from_secs(15);

    fn listing(title: &str) -> Mutation {
        Mutation::Listing(Change::Create {
            payload: NewListing {
                title: title.to_string(),
                description: None,
                price: None,
                category: None,
                condition: None,
                images: Vec::new(),
            },
        })
    }

    fn title_of(m: &Mutation) -> &str {
        match m {
            Mutation::Listing(Change::Create { payload }) => &payload.title,
            _ => "",
        }
    }

    fn seeded_store(titles: &[&str]) -> Arc<QueueStore> {
        let store = Arc::new(QueueStore::new(Arc::new(MemoryStore::new()), "q"));
        for title in titles {
            store.append(QueuedMutation::now(listing(title))).unwrap();
        }
        store
    }

    fn drainer(store: Arc<QueueStore>, dispatcher: impl Dispatcher + 'static, online: bool) -> QueueDrainer {
        QueueDrainer::new(
            store,
            Arc::new(dispatcher),
            Arc::new(NetworkStatus::new(online)),
            TIMEOUT,
        )
    }

    fn titles(store: &QueueStore) -> Vec<String> {
        store
            .read_all()
            .iter()
            .map(|q| title_of(&q.mutation).to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_drain_dispatches_in_fifo_order() {
        let store = seeded_store(&["a", "b", "c"]);
        let mut mock = MockDispatcher::new();
        let mut seq = Sequence::new();
        for expected in ["a", "b", "c"] {
            mock.expect_dispatch()
                .withf(move |m| title_of(m) == expected)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(()));
        }

        let report = drainer(store.clone(), mock, true).drain().await;

        assert_eq!(report.outcome, DrainOutcome::Completed);
        assert_eq!(report.snapshot, 3);
        assert_eq!(report.applied, 3);
        assert_eq!(report.remaining, 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_drain_stops_at_first_failure() {
        let store = seeded_store(&["a", "b", "c"]);
        let mut mock = MockDispatcher::new();
        let mut seq = Sequence::new();
        mock.expect_dispatch()
            .withf(|m| title_of(m) == "a")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_dispatch()
            .withf(|m| title_of(m) == "b")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Err(DispatchError::Rejected {
                    status: 422,
                    body: "violates check constraint".to_string(),
                })
            });

        let report = drainer(store.clone(), mock, true).drain().await;

        assert_eq!(report.outcome, DrainOutcome::Halted);
        assert_eq!(report.applied, 1);
        assert_eq!(report.remaining, 2);
        let failure = report.failure.unwrap();
        assert_eq!(failure.index, 1);
        assert_eq!(failure.mutation, "listing/create");
        assert!(!failure.transient);
        assert_eq!(titles(&store), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_retained_entries_replay_in_order_next_pass() {
        let store = seeded_store(&["b", "c"]);
        let mut mock = MockDispatcher::new();
        let mut seq = Sequence::new();
        for expected in ["b", "c"] {
            mock.expect_dispatch()
                .withf(move |m| title_of(m) == expected)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(()));
        }

        let report = drainer(store.clone(), mock, true).drain().await;
        assert_eq!(report.outcome, DrainOutcome::Completed);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_drain_is_noop_when_offline() {
        let store = seeded_store(&["a", "b"]);
        let before = store.read_all();
        let mut mock = MockDispatcher::new();
        mock.expect_dispatch().never();

        let report = drainer(store.clone(), mock, false).drain().await;

        assert_eq!(report.outcome, DrainOutcome::Offline);
        assert_eq!(report.remaining, 2);
        assert_eq!(store.read_all(), before);
    }

    #[tokio::test]
    async fn test_drain_empty_queue() {
        let store = seeded_store(&[]);
        let mut mock = MockDispatcher::new();
        mock.expect_dispatch().never();

        let report = drainer(store, mock, true).drain().await;
        assert_eq!(report.outcome, DrainOutcome::Empty);
    }

    #[tokio::test]
    async fn test_update_after_create_waits_for_create() {
        let store = Arc::new(QueueStore::new(Arc::new(MemoryStore::new()), "q"));
        store.append(QueuedMutation::now(listing("desk"))).unwrap();
        store
            .append(QueuedMutation::now(Mutation::Listing(Change::Update {
                resource_id: "l-1".to_string(),
                payload: ListingPatch {
                    price: Some(5.0),
                    ..ListingPatch::default()
                },
            })))
            .unwrap();

        let mut mock = MockDispatcher::new();
        mock.expect_dispatch()
            .times(1)
            .returning(|_| Err(DispatchError::Network("connection reset".to_string())));

        let report = drainer(store.clone(), mock, true).drain().await;

        assert_eq!(report.outcome, DrainOutcome::Halted);
        assert!(report.failure.unwrap().transient);
        assert_eq!(store.len(), 2);
    }

    /// Blocks every dispatch until released.
    struct GatedDispatcher {
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Dispatcher for GatedDispatcher {
        async fn dispatch(&self, _mutation: &Mutation) -> Result<(), DispatchError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_concurrent_drain_is_rejected() {
        let store = seeded_store(&["a"]);
        let gate = Arc::new(GatedDispatcher {
            started: Notify::new(),
            release: Notify::new(),
        });
        let drainer = Arc::new(QueueDrainer::new(
            store.clone(),
            gate.clone(),
            Arc::new(NetworkStatus::new(true)),
            TIMEOUT,
        ));

        let first = tokio::spawn({
            let drainer = drainer.clone();
            async move { drainer.drain().await }
        });
        gate.started.notified().await;
        assert!(drainer.is_draining());

        let second = drainer.drain().await;
        assert_eq!(second.outcome, DrainOutcome::AlreadyRunning);
        assert_eq!(second.applied, 0);

        gate.release.notify_one();
        let first = first.await.unwrap();
        assert_eq!(first.outcome, DrainOutcome::Completed);
        assert!(!drainer.is_draining());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_during_drain_survives() {
        let store = seeded_store(&["a"]);
        let gate = Arc::new(GatedDispatcher {
            started: Notify::new(),
            release: Notify::new(),
        });
        let drainer = Arc::new(QueueDrainer::new(
            store.clone(),
            gate.clone(),
            Arc::new(NetworkStatus::new(true)),
            TIMEOUT,
        ));

        let pass = tokio::spawn({
            let drainer = drainer.clone();
            async move { drainer.drain().await }
        });
        gate.started.notified().await;

        store.append(QueuedMutation::now(listing("late"))).unwrap();
        gate.release.notify_one();

        let report = pass.await.unwrap();
        assert_eq!(report.snapshot, 1);
        assert_eq!(report.applied, 1);
        assert_eq!(report.remaining, 1);
        assert_eq!(titles(&store), vec!["late"]);
    }

    struct HangingDispatcher;

    #[async_trait]
    impl Dispatcher for HangingDispatcher {
        async fn dispatch(&self, _mutation: &Mutation) -> Result<(), DispatchError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_dispatch_times_out() {
        let store = seeded_store(&["a", "b"]);

        let report = drainer(store.clone(), HangingDispatcher, true).drain().await;

        assert_eq!(report.outcome, DrainOutcome::Halted);
        let failure = report.failure.unwrap();
        assert_eq!(failure.index, 0);
        assert!(failure.error.contains("15000"));
        assert_eq!(store.len(), 2);
    }
}
