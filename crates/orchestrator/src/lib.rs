//! Separation job orchestration.
//!
//! One independent tokio task per job, sharing only the status store
//! with other jobs. The orchestrator sequences backend selection
//! (primary, then the deterministic fallback on any primary failure),
//! forwards backend progress to the notifier, normalizes the output
//! layout into the canonical artifact pair, and reports the terminal
//! state. There is no retry beyond the single built-in fallback and no
//! cancellation of a running job.

mod sweeper;

pub use sweeper::RetentionSweeper;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, warn};

use unmixer_common::{BackendKind, JobState, Result};
use unmixer_separation::{normalize_outputs, ProgressUpdate, SeparationBackend};
use unmixer_status::ProgressNotifier;

/// Everything a job needs to run. The id is an opaque high-entropy
/// token that doubles as the capability to query the job.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub job_id: String,
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    /// Client-supplied quality hint, currently advisory only
    pub quality: Option<String>,
}

/// Internal per-job record. Which backend ran is bookkeeping only; the
/// status document never carries it.
#[derive(Debug, Clone, Default)]
struct JobRecord {
    backend_used: Option<BackendKind>,
}

pub struct Orchestrator {
    notifier: Arc<ProgressNotifier>,
    primary: Arc<dyn SeparationBackend>,
    fallback: Arc<dyn SeparationBackend>,
    sweeper: Arc<RetentionSweeper>,
    records: RwLock<HashMap<String, JobRecord>>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        notifier: Arc<ProgressNotifier>,
        primary: Arc<dyn SeparationBackend>,
        fallback: Arc<dyn SeparationBackend>,
        sweeper: Arc<RetentionSweeper>,
    ) -> Self {
        Self {
            notifier,
            primary,
            fallback,
            sweeper,
            records: RwLock::new(HashMap::with_capacity(16)),
        }
    }

    /// Fire-and-forget: spawn the job task and return immediately. All
    /// observable effects go through the status store.
    pub fn start(self: &Arc<Self>, spec: JobSpec) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_to_completion(spec).await;
        });
    }

    /// Drive one job to its terminal state. Public so tests can await
    /// the pipeline deterministically; production callers use `start`.
    pub async fn run_to_completion(&self, spec: JobSpec) {
        info!("Starting separation job {}", spec.job_id);
        self.records
            .write()
            .await
            .insert(spec.job_id.clone(), JobRecord::default());

        if let Err(e) = self.run_pipeline(&spec).await {
            error!("Job {} failed: {}", spec.job_id, e);
            if let Err(pub_err) = self.notifier.fail(&spec.job_id, e.to_string()).await {
                error!("Could not record failure for job {}: {}", spec.job_id, pub_err);
            }
        }

        // The source file is reclaimed independently of job outcome
        self.sweeper
            .schedule(&spec.job_id, spec.input_path.clone())
            .await;
    }

    async fn run_pipeline(&self, spec: &JobSpec) -> Result<()> {
        self.notifier
            .publish(
                &spec.job_id,
                JobState::Separating,
                5,
                "Starting AI-powered vocal separation...",
            )
            .await?;

        let used = match self.run_backend(self.primary.as_ref(), spec).await {
            Ok(()) => self.primary.kind(),
            Err(primary_err) => {
                warn!(
                    "Primary backend failed for job {}, falling back: {}",
                    spec.job_id, primary_err
                );
                self.run_backend(self.fallback.as_ref(), spec).await?;
                self.fallback.kind()
            }
        };
        if let Some(record) = self.records.write().await.get_mut(&spec.job_id) {
            record.backend_used = Some(used);
        }

        self.notifier
            .publish(
                &spec.job_id,
                JobState::Converting,
                80,
                "Normalizing separation output...",
            )
            .await?;

        normalize_outputs(&spec.output_dir)?;

        self.notifier
            .publish(
                &spec.job_id,
                JobState::Completed,
                100,
                "Processing completed successfully",
            )
            .await?;

        info!("Job {} completed", spec.job_id);
        Ok(())
    }

    /// Run one backend, forwarding its progress updates as `separating`
    /// documents. Message-only updates keep the last progress value.
    async fn run_backend(&self, backend: &dyn SeparationBackend, spec: &JobSpec) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<ProgressUpdate>();

        let notifier = Arc::clone(&self.notifier);
        let job_id = spec.job_id.clone();
        let forwarder = tokio::spawn(async move {
            let mut last: u8 = 5;
            while let Some(update) = rx.recv().await {
                if let Some(pct) = update.percent {
                    last = last.max(pct);
                }
                let _ = notifier
                    .publish(&job_id, JobState::Separating, last, update.message)
                    .await;
            }
        });

        let result = backend.run(&spec.input_path, &spec.output_dir, tx).await;
        // The sender side is closed once run returns; let the forwarder
        // flush the remaining updates before reporting.
        let _ = forwarder.await;
        result
    }

    /// Which backend produced a job's artifacts (internal record, used
    /// by diagnostics and tests)
    pub async fn backend_used(&self, job_id: &str) -> Option<BackendKind> {
        self.records
            .read()
            .await
            .get(job_id)
            .and_then(|r| r.backend_used)
    }

}
