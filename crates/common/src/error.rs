//! Error types shared across clipframe crates.

use std::path::PathBuf;

/// Top-level error type for clipframe operations.
#[derive(Debug, thiserror::Error)]
pub enum ClipframeError {
    #[error("Engine error: {message}")]
    Engine { message: String },

    #[error("Profile error: {message}")]
    Profile { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Script error: {message}")]
    Script { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid frame range [{mark_in}, {mark_out}] for length {length}")]
    InvalidRange {
        mark_in: i64,
        mark_out: i64,
        length: i64,
    },

    #[error("No display consumer attached")]
    NotAttached,

    #[error("Consumer is already connected to a running producer; purge or stop it first")]
    ConsumerBusy,

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ClipframeError.
pub type ClipframeResult<T> = Result<T, ClipframeError>;

impl ClipframeError {
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine {
            message: msg.into(),
        }
    }

    pub fn profile(msg: impl Into<String>) -> Self {
        Self::Profile {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn script(msg: impl Into<String>) -> Self {
        Self::Script {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Range validation shared by producer cuts and range exports.
    pub fn invalid_range(mark_in: i64, mark_out: i64, length: i64) -> Self {
        Self::InvalidRange {
            mark_in,
            mark_out,
            length,
        }
    }
}
