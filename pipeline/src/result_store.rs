/// Concurrent store of task results keyed by identifier
///
/// Backed by a sharded `DashMap`, so reads and writes for different
/// identifiers do not contend on a single lock. Results are published as
/// `Arc<ProcessingResult>`: a reader either sees nothing or the complete value.
///
/// Identifiers are reserved at submission time. The reservation turns into a
/// result exactly once; a second write for the same identifier is refused.
/// With a retention cap, the oldest results are evicted and leave a tombstone
/// so pollers learn the outcome is gone instead of waiting forever.
/// Tombstones are never dropped: the cap bounds result payloads, while the
/// key set keeps one identifier per task ever submitted.
use crate::types::{ProcessingResult, TaskStatus};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone)]
enum Slot {
    Reserved,
    Ready(Arc<ProcessingResult>),
    Evicted,
}

pub struct ResultStore {
    entries: DashMap<String, Slot>,
    /// Completed identifiers, oldest first (only tracked with a retention cap)
    completion_order: Mutex<VecDeque<String>>,
    retention: Option<usize>,
    reserved: AtomicUsize,
    completed: AtomicUsize,
}

impl ResultStore {
    pub fn new(retention: Option<usize>) -> Self {
        Self {
            entries: DashMap::new(),
            completion_order: Mutex::new(VecDeque::new()),
            retention,
            reserved: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    /// Claim an identifier for a new task. False if it was ever used.
    pub fn reserve(&self, id: &str) -> bool {
        match self.entries.entry(id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::Reserved);
                self.reserved.fetch_add(1, Ordering::AcqRel);
                true
            }
        }
    }

    /// Drop a reservation whose task never entered the queue
    pub fn release(&self, id: &str) {
        if self
            .entries
            .remove_if(id, |_, slot| matches!(slot, Slot::Reserved))
            .is_some()
        {
            self.reserved.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Publish the result for an identifier. Returns false, leaving the
    /// stored value untouched, if a result was already written.
    pub fn put(&self, result: ProcessingResult) -> bool {
        let id = result.identifier.clone();
        let published = match self.entries.entry(id.clone()) {
            Entry::Occupied(mut occupied) => {
                let reserved = matches!(occupied.get(), Slot::Reserved);
                if reserved {
                    occupied.insert(Slot::Ready(Arc::new(result)));
                    self.reserved.fetch_sub(1, Ordering::AcqRel);
                }
                reserved
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::Ready(Arc::new(result)));
                true
            }
        };

        if !published {
            log::warn!("Refusing second result for {}", id);
            return false;
        }

        self.completed.fetch_add(1, Ordering::AcqRel);
        if let Some(limit) = self.retention {
            self.evict_beyond(id, limit);
        }
        true
    }

    fn evict_beyond(&self, newest: String, limit: usize) {
        let mut order = self
            .completion_order
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        order.push_back(newest);
        while order.len() > limit {
            let Some(oldest) = order.pop_front() else {
                break;
            };
            if let Some(mut slot) = self.entries.get_mut(&oldest) {
                *slot = Slot::Evicted;
                log::debug!("Evicted result {}", oldest);
            }
        }
    }

    pub fn get(&self, id: &str) -> TaskStatus {
        match self.entries.get(id).map(|slot| slot.value().clone()) {
            Some(Slot::Ready(result)) => TaskStatus::Complete(result),
            Some(Slot::Evicted) => TaskStatus::Evicted,
            Some(Slot::Reserved) | None => TaskStatus::Pending,
        }
    }

    /// Identifiers reserved but not yet completed
    pub fn outstanding(&self) -> usize {
        self.reserved.load(Ordering::Acquire)
    }

    /// Results published since creation, including evicted ones
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }
}
