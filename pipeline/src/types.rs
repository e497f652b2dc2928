//! Type definitions shared across the processing pipeline

use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize, Serializer};
use std::sync::Arc;

/// One unit of submitted work
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    /// Grayscale image, rows x columns, values nominally in [0, 1]
    pub image: Array2<f64>,
}

impl Task {
    pub fn new(id: impl Into<String>, image: Array2<f64>) -> Self {
        Self {
            id: id.into(),
            image,
        }
    }
}

/// Terminal status of a processed task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Success => "success",
            ResultStatus::Error => "error",
        }
    }
}

/// Derived artifacts and metrics of a successful task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultArtifacts {
    /// Dispersion (population std-dev) of the edge map
    #[serde(rename = "edge_detection_quality")]
    pub edge_quality: f64,
    /// Compressed coefficient count divided by source element count
    pub compression_ratio: f64,
    #[serde(rename = "qubits_used")]
    pub qubits_used_equivalent: u32,
    pub feature_count: usize,
    #[serde(serialize_with = "serialize_rows")]
    pub edge_map: Array2<f64>,
    pub features: Vec<f64>,
}

/// Emit a 2-D array as nested rows, `[[r0c0, r0c1], [r1c0, r1c1]]`
fn serialize_rows<S: Serializer>(array: &Array2<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(array.rows().into_iter().map(|row| row.to_vec()))
}

/// Terminal outcome of one task. Written once by the worker that ran it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingResult {
    #[serde(rename = "image_id")]
    pub identifier: String,
    pub status: ResultStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "processing_time")]
    pub processing_duration_secs: f64,
    /// (rows, columns) of the submitted image
    #[serde(rename = "image_shape")]
    pub source_shape: (usize, usize),
    #[serde(flatten)]
    pub artifacts: Option<ResultArtifacts>,
    #[serde(rename = "error", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ProcessingResult {
    pub fn success(
        identifier: impl Into<String>,
        processing_duration_secs: f64,
        source_shape: (usize, usize),
        artifacts: ResultArtifacts,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            status: ResultStatus::Success,
            timestamp: Utc::now(),
            processing_duration_secs,
            source_shape,
            artifacts: Some(artifacts),
            error_message: None,
        }
    }

    pub fn error(
        identifier: impl Into<String>,
        processing_duration_secs: f64,
        source_shape: (usize, usize),
        message: impl Into<String>,
    ) -> Self {
        let mut message = message.into();
        if message.is_empty() {
            message = "unknown processing error".to_string();
        }
        Self {
            identifier: identifier.into(),
            status: ResultStatus::Error,
            timestamp: Utc::now(),
            processing_duration_secs,
            source_shape,
            artifacts: None,
            error_message: Some(message),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }

    pub fn edge_quality(&self) -> Option<f64> {
        self.artifacts.as_ref().map(|a| a.edge_quality)
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// What a poller sees for an identifier
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    /// Queued, running, or never submitted
    Pending,
    Complete(Arc<ProcessingResult>),
    /// Completed, then dropped by the retention policy
    Evicted,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }

    pub fn result(&self) -> Option<&ProcessingResult> {
        match self {
            TaskStatus::Complete(result) => Some(result),
            TaskStatus::Pending | TaskStatus::Evicted => None,
        }
    }
}

/// Point-in-time copy of the pipeline counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    #[serde(rename = "processed_images")]
    pub processed_count: u64,
    #[serde(rename = "total_processing_time")]
    pub total_processing_secs: f64,
    #[serde(rename = "average_processing_time")]
    pub average_processing_secs: f64,
    #[serde(rename = "queue_size")]
    pub current_queue_depth: usize,
    #[serde(rename = "errors")]
    pub error_count: u64,
    #[serde(rename = "last_processed")]
    pub last_processed: Option<DateTime<Utc>>,
}

/// Liveness report for the hosting process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub workers_alive: usize,
    pub accepting: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifacts() -> ResultArtifacts {
        ResultArtifacts {
            edge_quality: 0.25,
            compression_ratio: 1.0,
            qubits_used_equivalent: 4,
            feature_count: 2,
            edge_map: Array2::zeros((2, 2)),
            features: vec![0.5, 0.1],
        }
    }

    #[test]
    fn test_success_result_json_uses_wire_names() {
        let result = ProcessingResult::success("img_1", 0.01, (2, 2), artifacts());
        let value: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();

        assert_eq!(value["image_id"], "img_1");
        assert_eq!(value["status"], "success");
        assert_eq!(value["qubits_used"], 4);
        assert_eq!(value["feature_count"], 2);
        assert_eq!(value["edge_detection_quality"], 0.25);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_edge_map_serializes_as_nested_rows() {
        let mut artifacts = artifacts();
        artifacts.edge_map = ndarray::array![[0.0, 0.5, 1.0], [0.25, 0.75, 0.0]];
        let result = ProcessingResult::success("img_3", 0.01, (2, 3), artifacts);
        let value: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();

        assert_eq!(
            value["edge_map"],
            serde_json::json!([[0.0, 0.5, 1.0], [0.25, 0.75, 0.0]])
        );
        assert_eq!(value["image_shape"], serde_json::json!([2, 3]));
    }

    #[test]
    fn test_error_result_carries_message() {
        let result = ProcessingResult::error("img_2", 0.0, (4, 4), "");
        assert_eq!(result.status, ResultStatus::Error);
        assert!(!result.error_message.as_deref().unwrap().is_empty());
        assert!(result.edge_quality().is_none());

        let value: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(value["status"], "error");
        assert!(value.get("edge_map").is_none());
    }

    #[test]
    fn test_task_status() {
        assert!(!TaskStatus::Pending.is_terminal());
        let done = TaskStatus::Complete(Arc::new(ProcessingResult::error("x", 0.0, (1, 1), "e")));
        assert!(done.is_terminal());
        assert_eq!(done.result().unwrap().identifier, "x");
        assert!(TaskStatus::Evicted.is_terminal());
        assert!(TaskStatus::Evicted.result().is_none());
    }
}
