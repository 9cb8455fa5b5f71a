//! HTTP handlers.

use std::path::{Path as FsPath, PathBuf};

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use unmixer_common::{AudioEncoding, JobState, StemKind};
use unmixer_orchestrator::JobSpec;
use unmixer_status::JobQuery;
use unmixer_transcode::waveform_summary;

use crate::types::{ErrorResponse, HealthResponse, UploadResponse};
use crate::ApiState;

/// Envelope resolution for waveform summaries
const WAVEFORM_POINTS_PER_SECOND: u32 = 20;

fn error_json(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(message))).into_response()
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub async fn upload(State(state): State<ApiState>, mut multipart: Multipart) -> Response {
    let mut filename = None;
    let mut payload = None;
    let mut quality = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return error_json(StatusCode::BAD_REQUEST, format!("malformed upload: {e}")),
        };
        match field.name() {
            Some("audio") => {
                filename = field.file_name().map(sanitize_filename);
                payload = match field.bytes().await {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        return error_json(
                            StatusCode::BAD_REQUEST,
                            format!("could not read upload body: {e}"),
                        )
                    }
                };
            }
            Some("quality") => {
                quality = field.text().await.ok();
            }
            _ => {}
        }
    }

    let Some(payload) = payload else {
        return error_json(StatusCode::BAD_REQUEST, "missing 'audio' field");
    };
    let filename = filename.unwrap_or_else(|| "upload.bin".to_string());

    if !unmixer_common::is_supported_upload(&filename) {
        return error_json(
            StatusCode::BAD_REQUEST,
            format!("Unsupported format: {filename}"),
        );
    }

    let job_id = Uuid::new_v4().to_string();
    let input_path = state.config.uploads_dir().join(format!("{job_id}_{filename}"));
    let output_dir = state.config.outputs_dir().join(&job_id);

    if let Err(e) = tokio::fs::write(&input_path, &payload).await {
        error!("Could not persist upload for job {}: {}", job_id, e);
        return error_json(StatusCode::INTERNAL_SERVER_ERROR, "could not store upload");
    }
    if let Err(e) = tokio::fs::create_dir_all(&output_dir).await {
        error!("Could not create output dir for job {}: {}", job_id, e);
        return error_json(StatusCode::INTERNAL_SERVER_ERROR, "could not create job directory");
    }

    // The durable queued document must exist before the client can poll
    if let Err(e) = state
        .notifier
        .publish(&job_id, JobState::Queued, 0, "File uploaded, waiting for processing")
        .await
    {
        error!("Could not record queued state for job {}: {}", job_id, e);
        return error_json(StatusCode::INTERNAL_SERVER_ERROR, "could not record job");
    }

    info!("Accepted upload '{}' as job {}", filename, job_id);
    state.orchestrator.start(JobSpec {
        job_id: job_id.clone(),
        input_path,
        output_dir,
        quality,
    });

    (
        StatusCode::OK,
        Json(UploadResponse {
            processing_id: job_id,
            message: "File uploaded successfully, processing started".to_string(),
            filename,
        }),
    )
        .into_response()
}

pub async fn status(State(state): State<ApiState>, Path(job_id): Path<String>) -> Response {
    match state.notifier.store().get(&job_id).await {
        JobQuery::Found(doc) => Json(doc).into_response(),
        // Unknown ids are an expected client race, not an error
        JobQuery::NotFound => Json(json!({
            "status": "not_found",
            "progress": 0,
            "message": "Job not found",
            "id": job_id,
        }))
        .into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    format: Option<String>,
    bitrate: Option<String>,
}

pub async fn download(
    State(state): State<ApiState>,
    Path((job_id, stem)): Path<(String, String)>,
    Query(query): Query<DownloadQuery>,
) -> Response {
    let Some(stem) = StemKind::parse(&stem) else {
        return error_json(StatusCode::BAD_REQUEST, format!("unknown stem '{stem}'"));
    };
    let encoding = match query.format.as_deref() {
        None => AudioEncoding::Wav,
        Some(raw) => match AudioEncoding::parse(raw) {
            Some(encoding) => encoding,
            None => return error_json(StatusCode::BAD_REQUEST, format!("unknown format '{raw}'")),
        },
    };

    let canonical = stem_path(&state, &job_id, stem);
    if !canonical.exists() {
        return error_json(
            StatusCode::NOT_FOUND,
            format!("{} stem not available for job {job_id}", stem.name()),
        );
    }

    let bytes = if encoding == AudioEncoding::Wav {
        tokio::fs::read(&canonical).await
    } else {
        match transcoded_bytes(&canonical, encoding, query.bitrate.as_deref()).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                warn!("Transcode failed for job {} stem {}: {}", job_id, stem.name(), e);
                return error_json(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
            }
        }
    };
    let bytes = match bytes {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Could not read stem for job {}: {}", job_id, e);
            return error_json(StatusCode::INTERNAL_SERVER_ERROR, "could not read artifact");
        }
    };

    let download_name = format!("{}.{}", stem.name(), encoding.extension());
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, encoding.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{download_name}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}

/// Derived encodings are produced into a scratch directory and never
/// cached next to the canonical artifacts.
async fn transcoded_bytes(
    canonical: &FsPath,
    encoding: AudioEncoding,
    bitrate: Option<&str>,
) -> unmixer_common::Result<Vec<u8>> {
    let scratch = tempfile::tempdir()?;
    let output = scratch.path().join(format!("stem.{}", encoding.extension()));
    unmixer_transcode::transcode(canonical, &output, encoding, bitrate).await?;
    Ok(tokio::fs::read(&output).await?)
}

pub async fn waveform(
    State(state): State<ApiState>,
    Path((job_id, stem)): Path<(String, String)>,
) -> Response {
    let Some(stem) = StemKind::parse(&stem) else {
        return error_json(StatusCode::BAD_REQUEST, format!("unknown stem '{stem}'"));
    };
    let canonical = stem_path(&state, &job_id, stem);
    if !canonical.exists() {
        return error_json(
            StatusCode::NOT_FOUND,
            format!("{} stem not available for job {job_id}", stem.name()),
        );
    }

    // hound reads are blocking
    let summary =
        tokio::task::spawn_blocking(move || waveform_summary(&canonical, WAVEFORM_POINTS_PER_SECOND))
            .await;
    match summary {
        Ok(Ok(summary)) => Json(summary).into_response(),
        Ok(Err(e)) => {
            error!("Waveform extraction failed for job {}: {}", job_id, e);
            error_json(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => {
            error!("Waveform task panicked for job {}: {}", job_id, e);
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "waveform extraction failed")
        }
    }
}

fn stem_path(state: &ApiState, job_id: &str, stem: StemKind) -> PathBuf {
    state
        .config
        .outputs_dir()
        .join(job_id)
        .join(stem.canonical_filename())
}

/// Keep only the last path component and replace anything shell-hostile.
fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("c:\\tmp\\song.mp3"), "song.mp3");
        assert_eq!(sanitize_filename("my song (live).wav"), "my_song__live_.wav");
    }
}
