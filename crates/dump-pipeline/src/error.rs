//! Pipeline error types.

use std::path::PathBuf;

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Fatal errors that abort a pipeline run.
///
/// Per-page failures (duplicates, transformer failures) never surface here;
/// they are logged and the page is dropped.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to open input {}: {source}", .path.display())]
    OpenInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create output {}: {source}", .path.display())]
    CreateOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed dump at byte {position}: {message}")]
    Decode { position: u64, message: String },

    #[error("failed to serialize page '{title}': {message}")]
    Serialize { title: String, message: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Task failed: {0}")]
    Join(String),
}

impl PipelineError {
    pub(crate) fn decode(position: u64, message: impl std::fmt::Display) -> Self {
        Self::Decode {
            position,
            message: message.to_string(),
        }
    }

    /// Errors that are a consequence of another stage stopping rather than a
    /// root cause of their own.
    pub fn is_secondary(&self) -> bool {
        matches!(self, Self::Cancelled | Self::ChannelClosed(_))
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Join(format!("stage task panicked: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secondary_errors() {
        assert!(PipelineError::Cancelled.is_secondary());
        assert!(PipelineError::ChannelClosed("handoff").is_secondary());
        assert!(!PipelineError::decode(3, "bad tag").is_secondary());
        assert!(!PipelineError::InvalidConfig("workers".into()).is_secondary());
    }

    #[test]
    fn open_input_message_names_path() {
        let err = PipelineError::OpenInput {
            path: PathBuf::from("/tmp/missing.xml"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert_eq!(
            err.to_string(),
            "failed to open input /tmp/missing.xml: not found"
        );
    }
}
