//! Media duration probe via ffprobe.

use std::path::Path;

use tokio::process::Command;

use unmixer_common::{ProcessingError, Result};

/// Duration of a media file in seconds.
pub async fn media_duration(input: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(input)
        .output()
        .await
        .map_err(|e| ProcessingError::Other(format!("Failed to execute ffprobe: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProcessingError::Other(format!(
            "ffprobe failed for {}: {}",
            input.display(),
            stderr.trim()
        )));
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    raw.trim()
        .parse::<f64>()
        .map_err(|e| ProcessingError::Other(format!("Unparseable ffprobe duration '{}': {e}", raw.trim())))
}
