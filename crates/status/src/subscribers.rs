//! Explicit subscription state, decoupled from connection identity.
//!
//! A connection registers once and may then subscribe to any number of
//! job ids; a job id may have zero, one, or many subscribers. Job ids
//! act as capability tokens, so subscribe performs no authorization.

use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use unmixer_common::StatusDocument;

/// Transient identifier assigned to a push channel on connect
pub type ConnectionId = String;

pub struct SubscriberRegistry {
    /// Connection id -> outbound channel
    channels: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<StatusDocument>>>,
    /// Job id -> subscribed connection ids
    by_job: RwLock<HashMap<String, HashSet<ConnectionId>>>,
}

impl SubscriberRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::with_capacity(16)),
            by_job: RwLock::new(HashMap::with_capacity(16)),
        }
    }

    /// Bind a freshly connected channel to its transient id
    pub async fn register(&self, conn_id: &str, sender: mpsc::UnboundedSender<StatusDocument>) {
        self.channels.write().await.insert(conn_id.to_string(), sender);
    }

    /// Subscribe an already-registered connection to a job id
    pub async fn subscribe(&self, conn_id: &str, job_id: &str) {
        debug!("Connection {} subscribed to job {}", conn_id, job_id);
        self.by_job
            .write()
            .await
            .entry(job_id.to_string())
            .or_default()
            .insert(conn_id.to_string());
    }

    /// Drop a connection and all its job bindings
    pub async fn unregister(&self, conn_id: &str) {
        self.channels.write().await.remove(conn_id);
        let mut by_job = self.by_job.write().await;
        by_job.retain(|_, conns| {
            conns.remove(conn_id);
            !conns.is_empty()
        });
    }

    /// Snapshot the outbound channels currently subscribed to a job
    pub async fn channels_for(
        &self,
        job_id: &str,
    ) -> Vec<(ConnectionId, mpsc::UnboundedSender<StatusDocument>)> {
        let by_job = self.by_job.read().await;
        let Some(conns) = by_job.get(job_id) else {
            return Vec::new();
        };
        let channels = self.channels.read().await;
        conns
            .iter()
            .filter_map(|c| channels.get(c).map(|tx| (c.clone(), tx.clone())))
            .collect()
    }

    pub async fn subscriber_count(&self, job_id: &str) -> usize {
        self.by_job.read().await.get(job_id).map_or(0, HashSet::len)
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_many_subscribers_per_job() {
        let registry = SubscriberRegistry::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        registry.register("c1", tx1).await;
        registry.register("c2", tx2).await;
        registry.subscribe("c1", "job-a").await;
        registry.subscribe("c2", "job-a").await;

        assert_eq!(registry.subscriber_count("job-a").await, 2);
        assert_eq!(registry.channels_for("job-a").await.len(), 2);
        assert_eq!(registry.channels_for("job-b").await.len(), 0);
    }

    #[tokio::test]
    async fn test_unregister_removes_all_bindings() {
        let registry = SubscriberRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.register("c1", tx).await;
        registry.subscribe("c1", "job-a").await;
        registry.subscribe("c1", "job-b").await;

        registry.unregister("c1").await;
        assert_eq!(registry.subscriber_count("job-a").await, 0);
        assert_eq!(registry.subscriber_count("job-b").await, 0);
        assert!(registry.channels_for("job-a").await.is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_without_channel_yields_no_targets() {
        // A subscription whose connection never registered (or already
        // unregistered) must not produce a delivery target.
        let registry = SubscriberRegistry::new();
        registry.subscribe("ghost", "job-a").await;
        assert!(registry.channels_for("job-a").await.is_empty());
    }
}
