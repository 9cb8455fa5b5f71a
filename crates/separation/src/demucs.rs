//! Primary separation backend: the demucs model run as a subprocess.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use unmixer_common::{BackendKind, ProcessingError, Result};

use crate::progress::parse_demucs_line;
use crate::{ProgressSender, ProgressUpdate, SeparationBackend};

/// How many trailing stderr lines to keep for the failure message
const STDERR_TAIL_LINES: usize = 8;

/// Runs `python3 -m demucs.separate` in two-stem mode. Output lands in
/// the demucs model-name/track-name nested layout under the job output
/// directory.
pub struct DemucsBackend {
    python: String,
}

impl DemucsBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            python: "python3".to_string(),
        }
    }

    /// Override the interpreter used to launch demucs
    #[must_use]
    pub fn with_python(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }
}

impl Default for DemucsBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SeparationBackend for DemucsBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Demucs
    }

    async fn run(&self, input: &Path, output_dir: &Path, progress: ProgressSender) -> Result<()> {
        info!("Launching demucs for {}", input.display());

        let mut child = Command::new(&self.python)
            .args(["-m", "demucs.separate", "--two-stems=vocals", "-o"])
            .arg(output_dir)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ProcessingError::BackendUnavailable(format!("failed to launch demucs: {e}"))
            })?;

        // Both pipes must be drained while awaiting exit, or a full
        // output buffer deadlocks the child.
        let stdout = child.stdout.take().ok_or_else(|| {
            ProcessingError::BackendUnavailable("demucs stdout not captured".to_string())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            ProcessingError::BackendUnavailable("demucs stderr not captured".to_string())
        })?;

        let tx = progress.clone();
        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("demucs stdout: {}", line);
                let _ = tx.send(ProgressUpdate::message(line));
            }
        });

        // demucs writes its tqdm progress bar to stderr, refreshing it
        // in place with carriage returns. `lines()` would buffer those
        // frames until the bar's final newline, so split on both
        // terminators.
        let tx = progress.clone();
        let stderr_task = tokio::spawn(async move {
            let mut tail: Vec<String> = Vec::with_capacity(STDERR_TAIL_LINES);
            let mut reader = BufReader::new(stderr);
            let mut pending = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => pending.extend_from_slice(&chunk[..n]),
                }
                for line in drain_terminated_lines(&mut pending) {
                    handle_stderr_line(&line, &tx, &mut tail);
                }
            }
            if !pending.is_empty() {
                let line = String::from_utf8_lossy(&pending).into_owned();
                handle_stderr_line(&line, &tx, &mut tail);
            }
            tail
        });

        let status = child.wait().await.map_err(|e| {
            ProcessingError::BackendUnavailable(format!("failed waiting for demucs: {e}"))
        })?;

        let _ = stdout_task.await;
        let tail = stderr_task.await.unwrap_or_default();

        if status.success() {
            info!("demucs finished for {}", input.display());
            Ok(())
        } else {
            Err(ProcessingError::BackendUnavailable(format!(
                "demucs exited with {}: {}",
                status,
                tail.join(" | ")
            )))
        }
    }
}

/// Extract complete lines terminated by `\n` or `\r`, leaving any
/// unterminated remainder buffered.
fn drain_terminated_lines(pending: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = pending.iter().position(|&b| b == b'\n' || b == b'\r') {
        let raw: Vec<u8> = pending.drain(..=pos).collect();
        lines.push(String::from_utf8_lossy(&raw[..raw.len() - 1]).into_owned());
    }
    lines
}

fn handle_stderr_line(line: &str, tx: &ProgressSender, tail: &mut Vec<String>) {
    debug!("demucs stderr: {}", line);
    if let Some(p) = parse_demucs_line(line) {
        let _ = tx.send(ProgressUpdate::at(
            p.percent,
            format!(
                "AI model processing audio... {}% ({:.0}s/{:.0}s)",
                p.percent, p.processed, p.total
            ),
        ));
    } else if !line.trim().is_empty() {
        let _ = tx.send(ProgressUpdate::message(line.to_string()));
    }
    if !line.trim().is_empty() {
        if tail.len() == STDERR_TAIL_LINES {
            tail.remove(0);
        }
        tail.push(line.to_string());
    }
}
