//! Deterministic fallback separation via ffmpeg channel arithmetic.
//!
//! Stage 1 isolates a vocal estimate by subtracting one stereo channel
//! from the other (content panned identically in both channels cancels),
//! boosting gain to compensate for the energy lost to subtraction, and
//! band-limiting to the typical vocal range to suppress subtraction
//! artifacts. Stage 2 derives the complementary estimate by averaging
//! both channels. Stage 2 runs only after stage 1 succeeds; either
//! stage's failure aborts the job.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use unmixer_common::{BackendKind, ProcessingError, Result, StemKind};

use crate::probe::media_duration;
use crate::progress::{map_to_span, parse_ffmpeg_out_time_us};
use crate::{ProgressSender, ProgressUpdate, SeparationBackend};

const VOCAL_FILTER: &str = "pan=mono|c0=c0-c1,volume=4.0,highpass=f=300,lowpass=f=3400";
const ACCOMPANIMENT_FILTER: &str = "pan=stereo|c0=0.5*c0+0.5*c1|c1=0.5*c0+0.5*c1";

/// Progress spans per stage, on the job scale
const VOCAL_SPAN: (u8, u8) = (10, 50);
const ACCOMPANIMENT_SPAN: (u8, u8) = (50, 90);

const STDERR_TAIL_LINES: usize = 8;

/// Channel-arithmetic fallback backend. Writes the canonical artifact
/// pair directly at the job output root.
pub struct FilterFallback;

impl FilterFallback {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for FilterFallback {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SeparationBackend for FilterFallback {
    fn kind(&self) -> BackendKind {
        BackendKind::ChannelFilter
    }

    async fn run(&self, input: &Path, output_dir: &Path, progress: ProgressSender) -> Result<()> {
        info!("Running channel-filter fallback for {}", input.display());

        // One upfront probe; each stage's progress is elapsed/total
        // media time mapped onto its span.
        let duration = media_duration(input)
            .await
            .map_err(|e| ProcessingError::BackendFailure(e.to_string()))?;

        let _ = progress.send(ProgressUpdate::at(
            VOCAL_SPAN.0,
            "Processing with channel-arithmetic separation...",
        ));

        run_stage(
            input,
            &output_dir.join(StemKind::Vocals.canonical_filename()),
            VOCAL_FILTER,
            VOCAL_SPAN,
            duration,
            "Extracting vocals...",
            &progress,
        )
        .await?;

        run_stage(
            input,
            &output_dir.join(StemKind::Accompaniment.canonical_filename()),
            ACCOMPANIMENT_FILTER,
            ACCOMPANIMENT_SPAN,
            duration,
            "Extracting instrumentals...",
            &progress,
        )
        .await?;

        Ok(())
    }
}

async fn run_stage(
    input: &Path,
    output: &Path,
    filter: &str,
    span: (u8, u8),
    duration: f64,
    label: &str,
    progress: &ProgressSender,
) -> Result<()> {
    let mut child = Command::new("ffmpeg")
        .args([
            "-nostdin",
            "-hide_banner",
            "-loglevel",
            "error",
            "-progress",
            "pipe:1",
            "-y",
            "-i",
        ])
        .arg(input)
        .args(["-af", filter, "-acodec", "pcm_s16le", "-f", "wav"])
        .arg(output)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ProcessingError::BackendFailure(format!("failed to launch ffmpeg: {e}")))?;

    let stdout = child.stdout.take().ok_or_else(|| {
        ProcessingError::BackendFailure("ffmpeg stdout not captured".to_string())
    })?;
    let stderr = child.stderr.take().ok_or_else(|| {
        ProcessingError::BackendFailure("ffmpeg stderr not captured".to_string())
    })?;

    let tx = progress.clone();
    let label_owned = label.to_string();
    let stdout_task = tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(us) = parse_ffmpeg_out_time_us(&line) {
                let elapsed = us as f64 / 1_000_000.0;
                let pct = map_to_span(elapsed, duration, span);
                let _ = tx.send(ProgressUpdate::at(pct, label_owned.clone()));
            }
        }
    });

    let stderr_task = tokio::spawn(async move {
        let mut tail: Vec<String> = Vec::with_capacity(STDERR_TAIL_LINES);
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!("ffmpeg stderr: {}", line);
            if tail.len() == STDERR_TAIL_LINES {
                tail.remove(0);
            }
            tail.push(line);
        }
        tail
    });

    let status = child
        .wait()
        .await
        .map_err(|e| ProcessingError::BackendFailure(format!("failed waiting for ffmpeg: {e}")))?;

    let _ = stdout_task.await;
    let tail = stderr_task.await.unwrap_or_default();

    if status.success() {
        let _ = progress.send(ProgressUpdate::at(span.1, label));
        Ok(())
    } else {
        Err(ProcessingError::BackendFailure(format!(
            "ffmpeg exited with {} while writing {}: {}",
            status,
            output.display(),
            tail.join(" | ")
        )))
    }
}
