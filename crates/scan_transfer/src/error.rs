use std::{io, path::PathBuf};

/// Terminal failures of one transfer. None of them is retried internally.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The local scan could not be read before uploading.
    #[error("failed to read scan file {}: {source}", path.display())]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No (complete) response was obtained from the service.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx without a usable `detail`, or a malformed success body.
    #[error("invalid response (HTTP {status}): {reason}")]
    InvalidResponse { status: u16, reason: String },

    /// Non-2xx carrying a `{"detail": "..."}` body; shown to the user verbatim.
    #[error("{detail}")]
    ServerMessage { status: u16, detail: String },

    /// The processed point cloud could not be persisted.
    #[error("failed to store processed scan at {}: {source}", path.display())]
    StorageWriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl TransferError {
    /// HTTP status of the response, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::InvalidResponse { status, .. } | Self::ServerMessage { status, .. } => {
                Some(*status)
            }
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::FileReadFailed { .. } | Self::StorageWriteFailed { .. } => None,
        }
    }
}
