//! Error types for the image processing pipeline

use thiserror::Error;

/// Result type alias for the pipeline library
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while submitting, processing or shutting down
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Task queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Pipeline is shutting down, submission rejected")]
    ShuttingDown,

    #[error("Identifier already submitted: {0}")]
    DuplicateIdentifier(String),

    #[error("Transform failed: {0}")]
    Transform(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Image preprocessing failed: {0}")]
    Preprocessing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("Shutdown timed out with {unfinished} worker(s) still running")]
    ShutdownTimeout { unfinished: usize },

    #[error("Image decoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn transform<S: Into<String>>(msg: S) -> Self {
        Self::Transform(msg.into())
    }

    pub fn invalid_image<S: Into<String>>(msg: S) -> Self {
        Self::InvalidImage(msg.into())
    }

    pub fn preprocessing<S: Into<String>>(msg: S) -> Self {
        Self::Preprocessing(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// True for rejections surfaced synchronously to a submitter
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::QueueFull { .. } | Self::ShuttingDown | Self::DuplicateIdentifier(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_classification() {
        assert!(PipelineError::QueueFull { capacity: 4 }.is_rejection());
        assert!(PipelineError::ShuttingDown.is_rejection());
        assert!(PipelineError::DuplicateIdentifier("a".into()).is_rejection());
        assert!(!PipelineError::transform("boom").is_rejection());
    }

    #[test]
    fn test_messages() {
        let err = PipelineError::QueueFull { capacity: 8 };
        assert_eq!(err.to_string(), "Task queue full (capacity 8)");

        let err = PipelineError::transform("bad pixel");
        assert_eq!(err.to_string(), "Transform failed: bad pixel");
    }
}
