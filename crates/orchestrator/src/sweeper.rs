//! Delayed reclamation of original uploaded files.
//!
//! Each scheduled deletion is an owned, cancellable task keyed by job
//! id, so a sweep can be revoked if a job record is purged early.
//! Deletion is best-effort; a missing file is not an error. Canonical
//! output artifacts are never swept.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct RetentionSweeper {
    delay: Duration,
    /// Job id -> (schedule token, sweep task). A finished sweep removes
    /// its own entry; the token keeps it from removing a replacement
    /// scheduled under the same job id.
    tasks: Arc<Mutex<HashMap<String, (u64, JoinHandle<()>)>>>,
    next_token: AtomicU64,
}

impl RetentionSweeper {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            tasks: Arc::new(Mutex::new(HashMap::with_capacity(16))),
            next_token: AtomicU64::new(0),
        }
    }

    /// Schedule deletion of `path` after the configured delay.
    /// Rescheduling the same job id replaces the previous sweep.
    pub async fn schedule(&self, job_id: &str, path: PathBuf) {
        let delay = self.delay;
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let job = job_id.to_string();
        let map = Arc::clone(&self.tasks);

        // Insert under the lock so the task cannot observe the map
        // before its own entry exists.
        let mut tasks = self.tasks.lock().await;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => info!("Reclaimed source file for job {}: {}", job, path.display()),
                Err(e) => debug!(
                    "Source file for job {} already gone ({}): {}",
                    job,
                    path.display(),
                    e
                ),
            }
            let mut tasks = map.lock().await;
            if tasks.get(&job).is_some_and(|(t, _)| *t == token) {
                tasks.remove(&job);
            }
        });

        if let Some((_, old)) = tasks.insert(job_id.to_string(), (token, handle)) {
            old.abort();
        }
    }

    /// Revoke a scheduled sweep
    pub async fn cancel(&self, job_id: &str) {
        if let Some((_, handle)) = self.tasks.lock().await.remove(job_id) {
            handle.abort();
            debug!("Cancelled retention sweep for job {}", job_id);
        }
    }

    /// Number of sweeps that have not yet run or been cancelled
    pub async fn pending(&self) -> usize {
        self.tasks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deletes_after_delay() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("upload.wav");
        std::fs::write(&file, "audio").unwrap();

        let sweeper = RetentionSweeper::new(Duration::from_millis(20));
        sweeper.schedule("j1", file.clone()).await;

        assert!(file.exists());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn test_missing_file_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let sweeper = RetentionSweeper::new(Duration::from_millis(10));
        sweeper.schedule("j1", tmp.path().join("never-existed.wav")).await;
        // The sweep task must finish without panicking or lingering
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(sweeper.pending().await, 0);
    }

    #[tokio::test]
    async fn test_cancel_revokes_scheduled_sweep() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("upload.wav");
        std::fs::write(&file, "audio").unwrap();

        let sweeper = RetentionSweeper::new(Duration::from_millis(30));
        sweeper.schedule("j1", file.clone()).await;
        sweeper.cancel("j1").await;

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(file.exists());
        assert_eq!(sweeper.pending().await, 0);
    }

    #[tokio::test]
    async fn test_completed_sweeps_leave_no_entries() {
        // A long-lived process schedules one sweep per job; finished
        // sweeps must not accumulate in the task map.
        let tmp = tempfile::tempdir().unwrap();
        let sweeper = RetentionSweeper::new(Duration::from_millis(5));
        for i in 0..50 {
            let file = tmp.path().join(format!("upload-{i}.wav"));
            std::fs::write(&file, "audio").unwrap();
            sweeper.schedule(&format!("job-{i}"), file).await;
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(sweeper.pending().await, 0);
        for i in 0..50 {
            assert!(!tmp.path().join(format!("upload-{i}.wav")).exists());
        }
    }

    #[tokio::test]
    async fn test_reschedule_replaces_previous_sweep() {
        let tmp = tempfile::tempdir().unwrap();
        let first = tmp.path().join("first.wav");
        let second = tmp.path().join("second.wav");
        std::fs::write(&first, "audio").unwrap();
        std::fs::write(&second, "audio").unwrap();

        let sweeper = RetentionSweeper::new(Duration::from_millis(40));
        sweeper.schedule("j1", first.clone()).await;
        sweeper.schedule("j1", second.clone()).await;

        tokio::time::sleep(Duration::from_millis(150)).await;
        // The replaced sweep was aborted; only the second file goes
        assert!(first.exists());
        assert!(!second.exists());
        assert_eq!(sweeper.pending().await, 0);
    }
}
