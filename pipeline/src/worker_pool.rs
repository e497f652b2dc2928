/// Fixed pool of long-lived worker threads
///
/// Each worker blocks on the task queue, runs the transform, publishes a
/// terminal result and updates the statistics. Transform errors and panics
/// are converted into Error results at the worker boundary, so a worker only
/// exits when the queue is closed and drained.
use crate::error::{PipelineError, Result};
use crate::result_store::ResultStore;
use crate::stats::StatsAggregator;
use crate::task_queue::TaskQueue;
use crate::transform::{qubits_for, std_dev, Transform, TransformOutput};
use crate::types::{ProcessingResult, ResultArtifacts, Task};
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Shared state every worker operates on
pub struct WorkerContext {
    pub queue: Arc<TaskQueue>,
    pub results: Arc<ResultStore>,
    pub stats: Arc<StatsAggregator>,
    pub transform: Arc<dyn Transform>,
    /// Accepted tasks whose result and stats are not yet both published
    pub in_flight: Arc<AtomicUsize>,
    pub seed: Option<u64>,
    pub summary_interval: u64,
}

pub struct WorkerPool {
    workers: Vec<Worker>,
    exit_rx: Receiver<usize>,
    alive: Arc<AtomicUsize>,
}

struct Worker {
    id: usize,
    thread: Option<thread::JoinHandle<()>>,
}

/// Reports a worker's exit, including exit by panic
struct ExitGuard {
    id: usize,
    exit_tx: Sender<usize>,
    alive: Arc<AtomicUsize>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.alive.fetch_sub(1, Ordering::AcqRel);
        let _ = self.exit_tx.send(self.id);
    }
}

impl WorkerPool {
    /// Spawn `num_workers` workers pulling from `context.queue`
    pub fn start(num_workers: usize, context: Arc<WorkerContext>) -> Result<Self> {
        let (exit_tx, exit_rx) = unbounded::<usize>();
        let alive = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkerPool {
            workers: Vec::with_capacity(num_workers),
            exit_rx,
            alive: Arc::clone(&alive),
        };

        for id in 0..num_workers {
            alive.fetch_add(1, Ordering::AcqRel);
            let guard = ExitGuard {
                id,
                exit_tx: exit_tx.clone(),
                alive: Arc::clone(&alive),
            };
            let worker_context = Arc::clone(&context);

            let spawned = thread::Builder::new()
                .name(format!("pipeline-worker-{id}"))
                .spawn(move || {
                    let _guard = guard;
                    worker_loop(id, &worker_context);
                });

            match spawned {
                Ok(handle) => pool.workers.push(Worker {
                    id,
                    thread: Some(handle),
                }),
                Err(e) => {
                    // The guard moved into the failed closure has already been dropped
                    log::error!("Failed to spawn worker {}: {}", id, e);
                    context.queue.close();
                    let _ = pool.join(Duration::from_secs(1));
                    return Err(PipelineError::WorkerSpawn(e));
                }
            }
        }

        log::info!("Started {} processing workers", num_workers);
        Ok(pool)
    }

    /// Workers that have not exited yet
    pub fn alive(&self) -> usize {
        self.alive.load(Ordering::Acquire)
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Wait for every worker to exit. The queue must already be closed.
    /// Workers still running at the deadline are left detached.
    pub fn join(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;

        while self.workers.iter().any(|w| w.thread.is_some()) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.exit_rx.recv_timeout(remaining) {
                Ok(id) => {
                    if let Some(worker) = self.workers.iter_mut().find(|w| w.id == id) {
                        if let Some(handle) = worker.thread.take() {
                            if handle.join().is_err() {
                                log::warn!("Worker {} exited by panic", id);
                            }
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    let unfinished = self.workers.iter().filter(|w| w.thread.is_some()).count();
                    log::warn!(
                        "{} worker(s) still running after {:?}, abandoning them",
                        unfinished,
                        timeout
                    );
                    for worker in &mut self.workers {
                        worker.thread.take();
                    }
                    return Err(PipelineError::ShutdownTimeout { unfinished });
                }
            }
        }

        Ok(())
    }
}

fn worker_loop(id: usize, context: &WorkerContext) {
    log::debug!("Worker {} started", id);

    while let Some(task) = context.queue.dequeue() {
        let start = Instant::now();
        let task_id = task.id.clone();
        let shape = task.image.dim();

        let result = panic::catch_unwind(AssertUnwindSafe(|| process_task(context, task, start)))
            .unwrap_or_else(|payload| {
                ProcessingResult::error(
                    task_id.clone(),
                    start.elapsed().as_secs_f64(),
                    shape,
                    format!("transform panicked: {}", panic_message(payload.as_ref())),
                )
            });
        // Stats must add exactly the duration the result publishes
        let duration_secs = result.processing_duration_secs;

        if result.is_success() {
            log::info!("Processed image {} in {:.3}s", task_id, duration_secs);
        } else {
            log::error!(
                "Error processing image {}: {}",
                task_id,
                result.error_message.as_deref().unwrap_or_default()
            );
        }

        let success = result.is_success();
        context.results.put(result);
        if success {
            let processed = context.stats.record_success(duration_secs);
            if processed % context.summary_interval.max(1) == 0 {
                let snapshot = context.stats.snapshot(context.queue.len());
                log::info!(
                    "Pipeline stats: {} processed, {} errors, avg {:.3}s, {} queued",
                    snapshot.processed_count,
                    snapshot.error_count,
                    snapshot.average_processing_secs,
                    snapshot.current_queue_depth
                );
            }
        } else {
            context.stats.record_error();
        }
        context.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    log::debug!("Worker {} stopped", id);
}

/// Run the transform for one task and derive the published metrics
fn process_task(context: &WorkerContext, task: Task, start: Instant) -> ProcessingResult {
    let shape = task.image.dim();
    let mut rng = task_rng(context.seed, &task.id);

    match context.transform.apply(task.image.view(), &mut rng) {
        Ok(output) => {
            let artifacts = derive_artifacts(output, task.image.len());
            ProcessingResult::success(task.id, start.elapsed().as_secs_f64(), shape, artifacts)
        }
        Err(e) => {
            let message = match e {
                PipelineError::Transform(msg) => msg,
                other => other.to_string(),
            };
            ProcessingResult::error(task.id, start.elapsed().as_secs_f64(), shape, message)
        }
    }
}

fn derive_artifacts(output: TransformOutput, source_len: usize) -> ResultArtifacts {
    let compressed_len = output.compressed.len();
    ResultArtifacts {
        edge_quality: std_dev(output.edge_map.view()),
        compression_ratio: if source_len == 0 {
            0.0
        } else {
            compressed_len as f64 / source_len as f64
        },
        qubits_used_equivalent: qubits_for(compressed_len),
        feature_count: output.features.len(),
        edge_map: output.edge_map,
        features: output.features,
    }
}

/// Seeded pipelines derive each task's stream from the seed and identifier,
/// so output does not depend on which worker picked the task up
fn task_rng(seed: Option<u64>, task_id: &str) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(task_seed(seed, task_id)),
        None => ChaCha8Rng::from_entropy(),
    }
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// `seed` XOR the 64-bit FNV-1a hash of the identifier bytes.
/// Stable across platforms and toolchains.
fn task_seed(seed: u64, task_id: &str) -> u64 {
    let hash = task_id.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    });
    seed ^ hash
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
