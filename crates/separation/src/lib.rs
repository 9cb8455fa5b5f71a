//! Audio stem separation backends and output normalization.
//!
//! Two backends implement [`SeparationBackend`]: the demucs subprocess
//! (trained-model separation) and a deterministic ffmpeg filter fallback
//! (channel arithmetic). The orchestrator selects between them at
//! runtime by availability, not static configuration. Whichever backend
//! runs, [`normalize_outputs`] reconciles its layout into the canonical
//! vocal/accompaniment pair at the job output root.

mod demucs;
mod fallback;
mod normalize;
pub mod probe;
pub mod progress;

pub use demucs::DemucsBackend;
pub use fallback::FilterFallback;
pub use normalize::normalize_outputs;

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::mpsc;

use unmixer_common::{BackendKind, Result};

/// One progress report from a running backend. Percent is absolute on
/// the job scale; `None` carries a message-only update (diagnostic
/// output that did not parse as progress).
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub percent: Option<u8>,
    pub message: String,
}

impl ProgressUpdate {
    #[must_use]
    pub fn at(percent: u8, message: impl Into<String>) -> Self {
        Self {
            percent: Some(percent),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            percent: None,
            message: message.into(),
        }
    }
}

/// Channel a backend reports progress through. Unbounded so a slow
/// consumer can never stall the separation process.
pub type ProgressSender = mpsc::UnboundedSender<ProgressUpdate>;

/// A separation backend: consumes one input file, produces stem files
/// under the job output directory, and streams progress while running.
#[async_trait]
pub trait SeparationBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Run separation to completion. Output layout is backend-specific;
    /// callers normalize afterwards with [`normalize_outputs`].
    async fn run(&self, input: &Path, output_dir: &Path, progress: ProgressSender) -> Result<()>;
}
