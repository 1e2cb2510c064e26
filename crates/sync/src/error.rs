use floorsync_engine::EngineError;
use thiserror::Error;

use crate::config::ConfigError;

/// A failed call to the remote Document API. Every variant is recorded on the
/// queue item and retried up to the ceiling; `Rejected` keeps the status so an
/// operator can tell a validation failure from a dropped connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("undecodable response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
