//! Durable, concurrency-safe keyed store of job status documents.
//!
//! The in-memory map is the source of truth for live jobs; every accepted
//! write is mirrored to `<outputs>/<job_id>/status.json` via a temp file
//! and an atomic rename so a concurrent reader never observes a torn
//! document. Only the task that owns a job id ever writes to it, so
//! last-writer-wins per key is sufficient.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::warn;

use unmixer_common::{JobState, ProcessingError, Result, StatusDocument};

/// Outcome of a status lookup. An unknown job id is a normal response
/// variant, never an error.
#[derive(Debug, Clone)]
pub enum JobQuery {
    /// No output directory was ever created for this id
    NotFound,
    /// The last written document (or the initial placeholder)
    Found(StatusDocument),
}

pub struct StatusStore {
    /// Root directory holding one subdirectory per job id
    outputs_root: PathBuf,
    docs: RwLock<HashMap<String, StatusDocument>>,
}

impl StatusStore {
    #[must_use]
    pub fn new(outputs_root: impl Into<PathBuf>) -> Self {
        Self {
            outputs_root: outputs_root.into(),
            docs: RwLock::new(HashMap::with_capacity(16)),
        }
    }

    /// Directory owned by a job
    #[must_use]
    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.outputs_root.join(job_id)
    }

    /// Upsert a document, enforcing the state machine invariants:
    /// writes to a terminal record are ignored, backward state
    /// transitions are ignored, and same-state progress regressions are
    /// clamped to the stored value. Returns the effective document.
    pub async fn write(&self, doc: StatusDocument) -> Result<StatusDocument> {
        let effective = {
            let mut docs = self.docs.write().await;
            let effective = match docs.get(&doc.id) {
                None => doc,
                Some(prev) if prev.status.is_terminal() => {
                    warn!(
                        "Ignoring status write for terminal job {} ({:?} -> {:?})",
                        doc.id, prev.status, doc.status
                    );
                    return Ok(prev.clone());
                }
                Some(prev) if doc.status == prev.status => StatusDocument {
                    progress: doc.progress.max(prev.progress),
                    ..doc
                },
                // Failed is reachable from any non-terminal state
                Some(_) if doc.status == JobState::Failed => doc,
                Some(prev) if doc.status.rank() < prev.status.rank() => {
                    warn!(
                        "Ignoring backward transition for job {} ({:?} -> {:?})",
                        doc.id, prev.status, doc.status
                    );
                    return Ok(prev.clone());
                }
                Some(_) => doc,
            };
            docs.insert(effective.id.clone(), effective.clone());
            effective
        };

        // Mirror to disk off the async workers, lock released. The
        // owning task awaits each write, so documents for one job hit
        // disk in order.
        let dir = self.job_dir(&effective.id);
        let to_persist = effective.clone();
        tokio::task::spawn_blocking(move || persist(&dir, &to_persist))
            .await
            .map_err(|e| ProcessingError::Other(format!("status persist task failed: {e}")))??;
        Ok(effective)
    }

    /// Look up the last written document for a job id.
    ///
    /// Memory hit wins; otherwise a missing job directory means the id
    /// was never allocated, an unparsed or absent `status.json` under an
    /// existing directory means processing has not written yet.
    pub async fn get(&self, job_id: &str) -> JobQuery {
        if let Some(doc) = self.docs.read().await.get(job_id) {
            return JobQuery::Found(doc.clone());
        }

        let dir = self.job_dir(job_id);
        if !dir.exists() {
            return JobQuery::NotFound;
        }

        match std::fs::read_to_string(dir.join("status.json")) {
            Ok(raw) => match serde_json::from_str::<StatusDocument>(&raw) {
                Ok(doc) => JobQuery::Found(doc),
                Err(e) => {
                    warn!("Unreadable status document for job {}: {}", job_id, e);
                    JobQuery::Found(StatusDocument::placeholder(job_id))
                }
            },
            Err(_) => JobQuery::Found(StatusDocument::placeholder(job_id)),
        }
    }

    /// Current progress of a job, 0 if never written
    pub async fn progress(&self, job_id: &str) -> u8 {
        match self.get(job_id).await {
            JobQuery::Found(doc) => doc.progress,
            JobQuery::NotFound => 0,
        }
    }

}

fn persist(dir: &Path, doc: &StatusDocument) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    write_atomic(dir, &dir.join("status.json"), doc)
}

/// Write the serialized document next to its destination, then rename
/// into place so readers see either the old or the new document.
fn write_atomic(dir: &Path, dest: &Path, doc: &StatusDocument) -> Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    let raw = serde_json::to_vec(doc).map_err(|e| ProcessingError::Other(e.to_string()))?;
    tmp.write_all(&raw)?;
    tmp.persist(dest)
        .map_err(|e| ProcessingError::IoError(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, status: JobState, progress: u8) -> StatusDocument {
        StatusDocument::new(id, status, progress, "test")
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StatusStore::new(tmp.path());
        assert!(matches!(store.get("nope").await, JobQuery::NotFound));
    }

    #[tokio::test]
    async fn test_existing_dir_without_document_yields_placeholder() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("j1")).unwrap();
        let store = StatusStore::new(tmp.path());
        match store.get("j1").await {
            JobQuery::Found(d) => {
                assert_eq!(d.status, JobState::Queued);
                assert_eq!(d.progress, 0);
            }
            JobQuery::NotFound => panic!("expected placeholder"),
        }
    }

    #[tokio::test]
    async fn test_write_persists_and_reads_back() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StatusStore::new(tmp.path());
        store.write(doc("j1", JobState::Separating, 42)).await.unwrap();

        // A fresh store with an empty memory map must read the durable copy
        let cold = StatusStore::new(tmp.path());
        match cold.get("j1").await {
            JobQuery::Found(d) => {
                assert_eq!(d.status, JobState::Separating);
                assert_eq!(d.progress, 42);
            }
            JobQuery::NotFound => panic!("expected durable document"),
        }
    }

    #[tokio::test]
    async fn test_same_state_progress_never_regresses() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StatusStore::new(tmp.path());
        store.write(doc("j1", JobState::Separating, 60)).await.unwrap();
        let effective = store.write(doc("j1", JobState::Separating, 30)).await.unwrap();
        assert_eq!(effective.progress, 60);
    }

    #[tokio::test]
    async fn test_progress_may_drop_on_forward_transition() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StatusStore::new(tmp.path());
        store.write(doc("j1", JobState::Separating, 90)).await.unwrap();
        let effective = store.write(doc("j1", JobState::Converting, 80)).await.unwrap();
        assert_eq!(effective.status, JobState::Converting);
        assert_eq!(effective.progress, 80);
    }

    #[tokio::test]
    async fn test_backward_transition_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StatusStore::new(tmp.path());
        store.write(doc("j1", JobState::Converting, 80)).await.unwrap();
        let effective = store.write(doc("j1", JobState::Separating, 95)).await.unwrap();
        assert_eq!(effective.status, JobState::Converting);
    }

    #[tokio::test]
    async fn test_failed_reachable_from_any_non_terminal_state() {
        let tmp = tempfile::tempdir().unwrap();
        for state in [JobState::Queued, JobState::Separating, JobState::Converting] {
            let store = StatusStore::new(tmp.path());
            let id = format!("job-{}", state.rank());
            store.write(doc(&id, state, 40)).await.unwrap();
            let effective = store.write(doc(&id, JobState::Failed, 40)).await.unwrap();
            assert_eq!(effective.status, JobState::Failed);
        }
    }

    #[tokio::test]
    async fn test_concurrent_writers_on_distinct_jobs() {
        // Each job is driven by its own task; persistence must not
        // serialize unrelated jobs behind one held lock.
        let tmp = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(StatusStore::new(tmp.path()));

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = std::sync::Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let id = format!("job-{i}");
                store.write(doc(&id, JobState::Separating, 10)).await.unwrap();
                store.write(doc(&id, JobState::Converting, 80)).await.unwrap();
                store.write(doc(&id, JobState::Completed, 100)).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let cold = StatusStore::new(tmp.path());
        for i in 0..16 {
            match cold.get(&format!("job-{i}")).await {
                JobQuery::Found(d) => {
                    assert_eq!(d.status, JobState::Completed);
                    assert_eq!(d.progress, 100);
                }
                JobQuery::NotFound => panic!("missing durable document for job-{i}"),
            }
        }
    }

    #[tokio::test]
    async fn test_terminal_states_are_immutable() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StatusStore::new(tmp.path());
        store.write(doc("j1", JobState::Completed, 100)).await.unwrap();
        let effective = store.write(doc("j1", JobState::Failed, 100)).await.unwrap();
        assert_eq!(effective.status, JobState::Completed);

        store.write(doc("j2", JobState::Failed, 55)).await.unwrap();
        let effective = store.write(doc("j2", JobState::Completed, 100)).await.unwrap();
        assert_eq!(effective.status, JobState::Failed);
        assert_eq!(effective.progress, 55);
    }
}
