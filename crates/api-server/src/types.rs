//! Wire types for the HTTP and WebSocket surfaces.

use serde::{Deserialize, Serialize};

use unmixer_common::StatusDocument;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub processing_id: String,
    pub message: String,
    pub filename: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// RFC 3339 timestamp of the response
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Messages a WebSocket client may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsClientMessage {
    /// Subscribe this connection to a job's progress pushes
    Subscribe { job_id: String },
}

/// Messages the server pushes over a WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsServerMessage {
    /// First frame on every connection, carrying its identifier
    Connection { id: String },
    /// A status document push for a subscribed job
    Progress {
        #[serde(flatten)]
        document: StatusDocument,
    },
}
