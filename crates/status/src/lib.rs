//! Job status tracking: durable store, subscription registry, and the
//! push/pull-consistent progress notifier.

mod store;
mod subscribers;

pub use store::{JobQuery, StatusStore};
pub use subscribers::{ConnectionId, SubscriberRegistry};

use std::sync::Arc;
use tracing::debug;

use unmixer_common::{JobState, Result, StatusDocument};

/// Publishes job progress: durable write first, then best-effort push to
/// every subscribed channel. A client that receives a push and
/// immediately polls never observes staler data than the push implied.
pub struct ProgressNotifier {
    store: Arc<StatusStore>,
    subscribers: Arc<SubscriberRegistry>,
}

impl ProgressNotifier {
    #[must_use]
    pub fn new(store: Arc<StatusStore>, subscribers: Arc<SubscriberRegistry>) -> Self {
        Self { store, subscribers }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<StatusStore> {
        &self.store
    }

    #[must_use]
    pub fn subscribers(&self) -> &Arc<SubscriberRegistry> {
        &self.subscribers
    }

    /// Durably record a status document, then push the effective
    /// (post-clamp) document to subscribers. Push has no acknowledgment,
    /// no retry, and no queueing for closed channels; a dead subscriber
    /// is pruned and never blocks the caller.
    pub async fn publish(
        &self,
        job_id: &str,
        state: JobState,
        progress: u8,
        message: impl Into<String>,
    ) -> Result<StatusDocument> {
        let doc = StatusDocument::new(job_id, state, progress, message);
        let effective = self.store.write(doc).await?;

        let mut dead = Vec::new();
        for (conn_id, tx) in self.subscribers.channels_for(job_id).await {
            if tx.send(effective.clone()).is_err() {
                dead.push(conn_id);
            }
        }
        for conn_id in dead {
            debug!("Pruning closed push channel {}", conn_id);
            self.subscribers.unregister(&conn_id).await;
        }

        Ok(effective)
    }

    /// Publish a terminal failure with progress frozen at its last value
    pub async fn fail(&self, job_id: &str, message: impl Into<String>) -> Result<StatusDocument> {
        let progress = self.store.progress(job_id).await;
        self.publish(job_id, JobState::Failed, progress, message).await
    }
}
