//! Entry point application code uses to record mutation intents.

use std::sync::Arc;

use tracing::{error, info};

use super::mutation::{Mutation, QueuedMutation};
use super::store::QueueStore;

/// Appends mutation intents to the queue.
///
/// Cheap to clone; every clone writes to the same [`QueueStore`].
#[derive(Clone)]
pub struct QueueProducer {
    store: Arc<QueueStore>,
}

impl QueueProducer {
    #[must_use]
    pub const fn new(store: Arc<QueueStore>) -> Self {
        Self { store }
    }

    /// Record a mutation for later replay.
    ///
    /// Never blocks on the network and never fails from the caller's point of
    /// view: if the substrate rejects the write the error is logged and
    /// `None` is returned.
    pub fn enqueue(&self, mutation: Mutation) -> Option<QueuedMutation> {
        let queued = QueuedMutation::now(mutation);
        let label = queued.mutation.label();

        match self.store.append(queued.clone()) {
            Ok(()) => {
                info!(
                    mutation = %label,
                    resource_id = queued.mutation.resource_id().unwrap_or(""),
                    enqueued_at = queued.enqueued_at,
                    "mutation_enqueued"
                );
                Some(queued)
            },
            Err(e) => {
                error!(mutation = %label, error = %e, "mutation_enqueue_failed");
                None
            },
        }
    }
}
