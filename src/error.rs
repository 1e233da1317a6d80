use std::path::PathBuf;
use thiserror::Error;

/// Failure classes surfaced by the archive pipeline. Handlers log these and
/// keep the dispatch loop running; no variant is fatal to the process.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// IAM token could not be obtained; no recognition request was made.
    #[error("auth failure: {message}")]
    Auth { message: String },

    /// The recognition call or its response handling failed.
    #[error("extraction failure: {message}")]
    Extraction {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A disk write under one of the storage roots failed.
    #[error("persistence failure at {}: {}", .path.display(), .source)]
    Persistence {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Downloading a file from Telegram failed or exceeded the size bound.
    #[error("transport failure: {message}")]
    Transport { message: String },
}

impl ArchiveError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn extraction(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Extraction {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}
