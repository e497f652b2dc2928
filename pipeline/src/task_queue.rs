/// Task queue between submitters and workers
///
/// A crossbeam channel, unbounded or bounded depending on the configured
/// backpressure policy. Closing the queue drops the only sender: workers
/// keep receiving until the backlog is drained, then `dequeue` returns `None`.
use crate::config::QueuePolicy;
use crate::error::{PipelineError, Result};
use crate::types::Task;
use crossbeam::channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use std::sync::{PoisonError, RwLock};

pub struct TaskQueue {
    sender: RwLock<Option<Sender<Task>>>,
    receiver: Receiver<Task>,
    capacity: Option<usize>,
}

impl TaskQueue {
    pub fn new(policy: QueuePolicy) -> Self {
        let (sender, receiver, capacity) = match policy {
            QueuePolicy::Unbounded => {
                let (tx, rx) = unbounded();
                (tx, rx, None)
            }
            QueuePolicy::Bounded { capacity } => {
                let (tx, rx) = bounded(capacity);
                (tx, rx, Some(capacity))
            }
        };

        Self {
            sender: RwLock::new(Some(sender)),
            receiver,
            capacity,
        }
    }

    /// Hand a task to the workers without waiting for capacity
    pub fn enqueue(&self, task: Task) -> Result<()> {
        let guard = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        let sender = guard.as_ref().ok_or(PipelineError::ShuttingDown)?;

        match sender.try_send(task) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(PipelineError::QueueFull {
                capacity: self.capacity.unwrap_or(0),
            }),
            Err(TrySendError::Disconnected(_)) => Err(PipelineError::ShuttingDown),
        }
    }

    /// Block until a task is available; `None` once closed and drained
    pub fn dequeue(&self) -> Option<Task> {
        self.receiver.recv().ok()
    }

    /// Stop accepting tasks and wake idle workers once the backlog is empty
    pub fn close(&self) {
        let mut guard = self.sender.write().unwrap_or_else(PoisonError::into_inner);
        guard.take();
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Current number of queued tasks
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
