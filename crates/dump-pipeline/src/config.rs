//! Pipeline configuration.

use crate::error::{PipelineError, Result};

/// Prefix that marks a page body as a redirect stub.
pub const DEFAULT_REDIRECT_MARKER: &str = "#REDIRECT";

/// Default read buffer for the input dump.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Configuration for a single pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Number of concurrent transform workers.
    pub workers: usize,
    /// Capacity of the decoder -> worker queue. Zero makes it a rendezvous
    /// channel: every push waits for a worker to take the page.
    pub handoff_capacity: usize,
    /// Capacity of the worker -> writer queue.
    pub result_capacity: usize,
    /// Buffer size used when reading the input dump from disk.
    pub read_buffer_size: usize,
    /// Body prefix that routes a page around the transformer.
    pub redirect_marker: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            handoff_capacity: 0,
            result_capacity: 0,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            redirect_marker: DEFAULT_REDIRECT_MARKER.to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set both queue capacities.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.handoff_capacity = capacity;
        self.result_capacity = capacity;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    pub fn with_redirect_marker(mut self, marker: impl Into<String>) -> Self {
        self.redirect_marker = marker.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(PipelineError::InvalidConfig(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "read buffer size must be non-zero".to_string(),
            ));
        }
        if self.redirect_marker.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "redirect marker must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.workers, 1);
        assert_eq!(config.handoff_capacity, 0);
        assert_eq!(config.result_capacity, 0);
        assert_eq!(config.redirect_marker, "#REDIRECT");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let config = PipelineConfig::default()
            .with_workers(8)
            .with_queue_capacity(16)
            .with_redirect_marker("#WEITERLEITUNG");
        assert_eq!(config.workers, 8);
        assert_eq!(config.handoff_capacity, 16);
        assert_eq!(config.result_capacity, 16);
        assert_eq!(config.redirect_marker, "#WEITERLEITUNG");
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = PipelineConfig::default().with_workers(0).validate();
        assert!(matches!(err, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_empty_marker_rejected() {
        let err = PipelineConfig::default().with_redirect_marker("").validate();
        assert!(matches!(err, Err(PipelineError::InvalidConfig(_))));
    }
}
