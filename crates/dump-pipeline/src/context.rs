//! Run context shared by every pipeline stage.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Shared context for one pipeline run.
///
/// Carries the run name used in log fields and the cancellation token that
/// the decoder, the workers and the coordinator all observe.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Name of the dump being processed
    pub name: String,
    /// The cancellation token
    pub token: CancellationToken,
}

impl RunContext {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            name: "dump".to_string(),
            token,
        }
    }

    pub fn arc_new(token: CancellationToken) -> Arc<Self> {
        Arc::new(Self::new(token))
    }

    pub fn with_name(name: impl Into<String>, token: CancellationToken) -> Self {
        Self {
            name: name.into(),
            ..Self::new(token)
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}
