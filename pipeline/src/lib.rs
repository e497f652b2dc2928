//! Asynchronous Image Processing Pipeline
//!
//! Accepts grayscale images, hands them to a fixed pool of worker threads
//! through a task queue, and publishes derived artifacts (edge map,
//! compressed representation, feature vector) into a result store that
//! callers poll. Live statistics track throughput, errors and queue depth.
//!
//! The numeric work is a pluggable [`Transform`]; [`ClassicalTransform`] is
//! the reference implementation.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod preprocessing;
pub mod result_store;
pub mod stats;
pub mod task_queue;
pub mod transform;
pub mod types;
pub mod worker_pool;

pub use config::{PipelineConfig, QueuePolicy};
pub use error::{PipelineError, Result};
pub use pipeline::ImagePipeline;
pub use preprocessing::ImageNormalizer;
pub use transform::{ClassicalTransform, Transform, TransformOutput};
pub use types::{
    HealthStatus, ProcessingResult, ResultArtifacts, ResultStatus, StatsSnapshot, Task, TaskStatus,
};

/// Get library version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
