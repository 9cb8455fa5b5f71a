//! Environment-driven server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use unmixer_common::{ProcessingError, Result};

/// Largest accepted upload, in bytes (100 MB).
pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address (`UNMIXER_ADDR`, default 0.0.0.0:3003)
    pub addr: SocketAddr,
    /// Root of the working tree (`UNMIXER_DATA_DIR`, default ./data);
    /// uploads/ and outputs/ live underneath it
    pub data_dir: PathBuf,
    /// How long uploaded source files are retained
    /// (`UNMIXER_RETENTION_SECS`, default 3600)
    pub retention: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let addr = match std::env::var("UNMIXER_ADDR") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| ProcessingError::Other(format!("invalid UNMIXER_ADDR '{raw}': {e}")))?,
            Err(_) => SocketAddr::from(([0, 0, 0, 0], 3003)),
        };

        let data_dir = std::env::var("UNMIXER_DATA_DIR")
            .map_or_else(|_| PathBuf::from("./data"), PathBuf::from);

        let retention = match std::env::var("UNMIXER_RETENTION_SECS") {
            Ok(raw) => Duration::from_secs(raw.parse().map_err(|e| {
                ProcessingError::Other(format!("invalid UNMIXER_RETENTION_SECS '{raw}': {e}"))
            })?),
            Err(_) => Duration::from_secs(3600),
        };

        Ok(Self {
            addr,
            data_dir,
            retention,
        })
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.data_dir.join("outputs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_layout() {
        let config = ServerConfig {
            addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            data_dir: PathBuf::from("/srv/unmixer"),
            retention: Duration::from_secs(3600),
        };
        assert_eq!(config.uploads_dir(), PathBuf::from("/srv/unmixer/uploads"));
        assert_eq!(config.outputs_dir(), PathBuf::from("/srv/unmixer/outputs"));
    }
}
