//! On-demand format conversion of canonical stem artifacts.
//!
//! Stems are stored once as WAV. Anything else is produced at download
//! time with ffmpeg and never cached, so repeated requests repeat the
//! work but the storage footprint stays fixed.

pub mod waveform;

pub use waveform::{waveform_summary, WaveformSummary};

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use unmixer_common::{AudioEncoding, ProcessingError, Result};

/// Default bitrate for lossy targets when the client does not ask for one.
pub const DEFAULT_LOSSY_BITRATE: &str = "192k";

/// Convert a canonical WAV stem to `encoding`, writing to `output`.
///
/// `bitrate` only applies to lossy targets and is passed to ffmpeg
/// verbatim (e.g. "256k"). A WAV target is a plain copy of the source
/// bytes since the canonical artifact already is one.
pub async fn transcode(
    input: &Path,
    output: &Path,
    encoding: AudioEncoding,
    bitrate: Option<&str>,
) -> Result<()> {
    if encoding == AudioEncoding::Wav {
        tokio::fs::copy(input, output).await?;
        return Ok(());
    }

    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-nostdin")
        .arg("-hide_banner")
        .arg("-loglevel")
        .arg("error")
        .arg("-y")
        .arg("-i")
        .arg(input)
        .arg("-acodec")
        .arg(encoding.ffmpeg_codec());
    if encoding.is_lossy() {
        cmd.arg("-b:a").arg(bitrate.unwrap_or(DEFAULT_LOSSY_BITRATE));
    }
    cmd.arg(output);
    cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::piped());

    debug!("Transcoding {} -> {} ({:?})", input.display(), output.display(), encoding);

    let child = cmd
        .spawn()
        .map_err(|e| ProcessingError::Transcode(format!("could not spawn ffmpeg: {e}")))?;
    let out = child
        .wait_with_output()
        .await
        .map_err(|e| ProcessingError::Transcode(format!("ffmpeg did not finish: {e}")))?;

    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        return Err(ProcessingError::Transcode(format!(
            "ffmpeg exited with {}: {}",
            out.status,
            stderr.trim()
        )));
    }
    Ok(())
}
