/// Common types and the error taxonomy for audio stem separation
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Processing errors
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("File too large: {size} bytes (max: {max})")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Separation backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Separation failed: {0}")]
    BackendFailure(String),

    #[error("Output normalization failed: {0}")]
    Normalization(String),

    #[error("Transcode failed: {0}")]
    Transcode(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for separation operations
pub type Result<T> = std::result::Result<T, ProcessingError>;

/// Lifecycle state of a separation job.
///
/// Transitions are forward-only (queued -> separating -> converting ->
/// completed); any non-terminal state may jump directly to failed.
/// Completed and failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Separating,
    Converting,
    Completed,
    Failed,
}

impl JobState {
    /// Position in the forward pipeline. Failed has no rank of its own;
    /// it is reachable from any non-terminal state.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Separating => 1,
            Self::Converting => 2,
            Self::Completed => 3,
            Self::Failed => 4,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// The durable, wire-visible record of a job. Never names the backend
/// that produced the stems.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusDocument {
    /// Current job state
    pub status: JobState,
    /// Progress in percent (0-100)
    pub progress: u8,
    /// Free-text status message
    pub message: String,
    /// Job identifier (opaque capability token)
    pub id: String,
}

impl StatusDocument {
    #[must_use]
    pub fn new(id: impl Into<String>, status: JobState, progress: u8, message: impl Into<String>) -> Self {
        Self {
            status,
            progress: progress.min(100),
            message: message.into(),
            id: id.into(),
        }
    }

    /// Placeholder for a job whose directory exists but whose first
    /// status write has not landed yet.
    #[must_use]
    pub fn placeholder(id: impl Into<String>) -> Self {
        Self::new(id, JobState::Queued, 0, "Waiting for processing to start")
    }
}

/// Which separation backend produced the artifacts. Internal bookkeeping
/// only; the status document never carries this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Trained-model separation via the demucs subprocess
    Demucs,
    /// Deterministic channel-arithmetic fallback (ffmpeg filters)
    ChannelFilter,
}

/// One isolated output track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StemKind {
    Vocals,
    Accompaniment,
}

impl StemKind {
    /// Canonical artifact filename at the job output root
    #[must_use]
    pub fn canonical_filename(self) -> &'static str {
        match self {
            Self::Vocals => "vocals.wav",
            Self::Accompaniment => "accompaniment.wav",
        }
    }

    /// Parse a request path segment. `music` is accepted as an alias for
    /// the accompaniment stem.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "vocals" => Some(Self::Vocals),
            "accompaniment" | "music" => Some(Self::Accompaniment),
            _ => None,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Vocals => "vocals",
            Self::Accompaniment => "accompaniment",
        }
    }
}

/// Delivery encodings derived on demand from the canonical WAV stems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioEncoding {
    Wav,
    Mp3,
    Flac,
    Aac,
}

impl AudioEncoding {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "wav" => Some(Self::Wav),
            "mp3" => Some(Self::Mp3),
            "flac" => Some(Self::Flac),
            "aac" => Some(Self::Aac),
            _ => None,
        }
    }

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Flac => "flac",
            Self::Aac => "aac",
        }
    }

    #[must_use]
    pub fn ffmpeg_codec(self) -> &'static str {
        match self {
            Self::Wav => "pcm_s16le",
            Self::Mp3 => "libmp3lame",
            Self::Flac => "flac",
            Self::Aac => "aac",
        }
    }

    /// Lossy encodings take a bitrate parameter
    #[must_use]
    pub fn is_lossy(self) -> bool {
        matches!(self, Self::Mp3 | Self::Aac)
    }

    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
            Self::Mp3 => "audio/mpeg",
            Self::Flac => "audio/flac",
            Self::Aac => "audio/aac",
        }
    }
}

/// Upload extensions the submit endpoint accepts
pub const ACCEPTED_UPLOAD_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "aac", "ogg", "m4a"];

/// Check an uploaded filename against the accepted extension whitelist
#[must_use]
pub fn is_supported_upload(filename: &str) -> bool {
    std::path::Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            ACCEPTED_UPLOAD_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
