//! Pipeline configuration

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backpressure policy of the task queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum QueuePolicy {
    /// Every submission is accepted; memory grows with the backlog
    Unbounded,
    /// Submissions beyond `capacity` queued tasks are rejected with `QueueFull`
    Bounded { capacity: usize },
}

/// Configuration for the processing pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of long-lived worker threads
    pub num_workers: usize,

    pub queue: QueuePolicy,

    /// Grace period for workers to drain and exit on shutdown (milliseconds)
    pub shutdown_timeout_ms: u64,

    /// Maximum number of completed results kept; `None` keeps all of them.
    /// An evicted result leaves a tombstone key behind so pollers read
    /// `Evicted`, so the map still grows by one identifier per task.
    pub result_retention: Option<usize>,

    /// Seed for the transform's random stream; `None` draws from OS entropy
    pub seed: Option<u64>,

    /// Completions between throughput log lines
    pub summary_interval: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            queue: QueuePolicy::Unbounded,
            shutdown_timeout_ms: 5000,
            result_retention: None,
            seed: None,
            summary_interval: 100,
        }
    }
}

impl PipelineConfig {
    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue = QueuePolicy::Bounded { capacity };
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_result_retention(mut self, max_results: usize) -> Self {
        self.result_retention = Some(max_results);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(PipelineError::config("num_workers must be at least 1"));
        }
        if let QueuePolicy::Bounded { capacity: 0 } = self.queue {
            return Err(PipelineError::config("bounded queue capacity must be at least 1"));
        }
        if self.result_retention == Some(0) {
            return Err(PipelineError::config("result_retention must be at least 1"));
        }
        if self.summary_interval == 0 {
            return Err(PipelineError::config("summary_interval must be at least 1"));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with `PIPELINE_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(workers) = parse_var(&lookup, "PIPELINE_WORKERS")? {
            config.num_workers = workers as usize;
        }
        if let Some(capacity) = parse_var(&lookup, "PIPELINE_QUEUE_CAPACITY")? {
            config.queue = QueuePolicy::Bounded {
                capacity: capacity as usize,
            };
        }
        if let Some(timeout) = parse_var(&lookup, "PIPELINE_SHUTDOWN_TIMEOUT_MS")? {
            config.shutdown_timeout_ms = timeout;
        }
        if let Some(retention) = parse_var(&lookup, "PIPELINE_RESULT_RETENTION")? {
            config.result_retention = Some(retention as usize);
        }
        if let Some(seed) = parse_var(&lookup, "PIPELINE_SEED")? {
            config.seed = Some(seed);
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_var<F>(lookup: &F, key: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| PipelineError::config(format!("{key}={raw:?}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_is_valid_and_unbounded() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue, QueuePolicy::Unbounded);
        assert_eq!(config.num_workers, 4);
    }

    #[test]
    fn test_validation_rejects_zero_workers() {
        let config = PipelineConfig::default().with_workers(0);
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));

        let config = PipelineConfig::default().with_queue_capacity(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_partial() {
        let config = PipelineConfig::from_json(
            r#"{"num_workers": 2, "queue": {"policy": "bounded", "capacity": 16}}"#,
        )
        .unwrap();
        assert_eq!(config.num_workers, 2);
        assert_eq!(config.queue, QueuePolicy::Bounded { capacity: 16 });
        assert_eq!(config.shutdown_timeout_ms, 5000);
    }

    #[test]
    fn test_from_lookup_overlays_defaults() {
        let vars: HashMap<&str, &str> = [("PIPELINE_WORKERS", "3"), ("PIPELINE_SEED", "42")]
            .into_iter()
            .collect();
        let config =
            PipelineConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.num_workers, 3);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.queue, QueuePolicy::Unbounded);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = PipelineConfig::from_lookup(|key| {
            (key == "PIPELINE_WORKERS").then(|| "many".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("PIPELINE_WORKERS"));
    }
}
