/// Pipeline controller: owns the queue, worker pool, result store and stats
///
/// `submit` only reserves the identifier and enqueues; processing happens on
/// the worker threads. Callers poll `get_result` until it turns terminal.
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::result_store::ResultStore;
use crate::stats::StatsAggregator;
use crate::task_queue::TaskQueue;
use crate::transform::{ClassicalTransform, Transform};
use crate::types::{HealthStatus, StatsSnapshot, Task, TaskStatus};
use crate::worker_pool::{WorkerContext, WorkerPool};
use chrono::Utc;
use ndarray::Array2;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

pub struct ImagePipeline {
    config: PipelineConfig,
    queue: Arc<TaskQueue>,
    results: Arc<ResultStore>,
    stats: Arc<StatsAggregator>,
    in_flight: Arc<AtomicUsize>,
    pool: Mutex<Option<WorkerPool>>,
    accepting: AtomicBool,
    sequence: AtomicU64,
    transform_name: String,
}

impl ImagePipeline {
    /// Validate the config and start `config.num_workers` workers
    pub fn new(config: PipelineConfig, transform: Arc<dyn Transform>) -> Result<Self> {
        config.validate()?;

        let queue = Arc::new(TaskQueue::new(config.queue));
        let results = Arc::new(ResultStore::new(config.result_retention));
        let stats = Arc::new(StatsAggregator::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let transform_name = transform.name().to_string();

        let context = Arc::new(WorkerContext {
            queue: Arc::clone(&queue),
            results: Arc::clone(&results),
            stats: Arc::clone(&stats),
            transform,
            in_flight: Arc::clone(&in_flight),
            seed: config.seed,
            summary_interval: config.summary_interval,
        });
        let pool = WorkerPool::start(config.num_workers, context)?;

        log::info!(
            "Image pipeline ready: {} workers, {:?} queue, {} transform",
            config.num_workers,
            config.queue,
            transform_name
        );

        Ok(Self {
            config,
            queue,
            results,
            stats,
            in_flight,
            pool: Mutex::new(Some(pool)),
            accepting: AtomicBool::new(true),
            sequence: AtomicU64::new(0),
            transform_name,
        })
    }

    /// Classical transform with the default configuration
    pub fn with_defaults() -> Result<Self> {
        Self::new(PipelineConfig::default(), Arc::new(ClassicalTransform::new()))
    }

    /// Enqueue an image and return its identifier without waiting for processing.
    ///
    /// A caller-supplied identifier that was already used is rejected with
    /// `DuplicateIdentifier`; `None` (or an empty string) gets a generated one.
    pub fn submit(&self, image: Array2<f64>, identifier: Option<String>) -> Result<String> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(PipelineError::ShuttingDown);
        }

        let id = match identifier.filter(|id| !id.is_empty()) {
            Some(id) => {
                if !self.results.reserve(&id) {
                    return Err(PipelineError::DuplicateIdentifier(id));
                }
                id
            }
            None => loop {
                let candidate = self.generate_id();
                if self.results.reserve(&candidate) {
                    break candidate;
                }
            },
        };

        self.in_flight.fetch_add(1, Ordering::AcqRel);
        if let Err(e) = self.queue.enqueue(Task::new(id.clone(), image)) {
            self.results.release(&id);
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            if e.is_rejection() {
                log::warn!("Rejected image {}: {}", id, e);
            } else {
                log::error!("Failed to enqueue image {}: {}", id, e);
            }
            return Err(e);
        }

        log::debug!("Submitted image {} ({} queued)", id, self.queue.len());
        Ok(id)
    }

    /// `img_{unix millis}_{sequence}`
    fn generate_id(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("img_{}_{}", Utc::now().timestamp_millis(), seq)
    }

    pub fn get_result(&self, identifier: &str) -> TaskStatus {
        self.results.get(identifier)
    }

    pub fn get_stats(&self) -> StatsSnapshot {
        self.stats.snapshot(self.queue.len())
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    pub fn health(&self) -> HealthStatus {
        let workers_alive = self
            .pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, WorkerPool::alive);
        let accepting = self.is_accepting();
        let status = if accepting && workers_alive > 0 {
            "healthy"
        } else if accepting {
            "degraded"
        } else {
            "stopped"
        };

        HealthStatus {
            status: status.to_string(),
            timestamp: Utc::now(),
            version: crate::version().to_string(),
            workers_alive,
            accepting,
        }
    }

    /// Poll until every accepted task has a published result and stats update.
    /// Returns false if `timeout` elapsed first.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.in_flight.load(Ordering::Acquire) == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(2));
        }
    }

    /// Stop accepting submissions, let workers drain the queue and wait for
    /// them within the configured timeout. Later calls are no-ops.
    pub fn shutdown(&self) -> Result<()> {
        self.accepting.store(false, Ordering::Release);
        self.queue.close();

        let pool = self
            .pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut pool) = pool else {
            return Ok(());
        };

        log::info!(
            "Shutting down {} pipeline: {} queued, {} in flight",
            self.transform_name,
            self.queue.len(),
            self.in_flight.load(Ordering::Acquire)
        );
        pool.join(self.config.shutdown_timeout())?;
        log::info!("Pipeline stopped");
        Ok(())
    }
}

impl Drop for ImagePipeline {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("Pipeline shutdown on drop failed: {}", e);
        }
    }
}
