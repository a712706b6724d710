//! Recycling cache for task records.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::task::TaskRecord;

/// Thread-safe free list of [`TaskRecord`] allocations.
///
/// Records are reset before they are stored, and a record handed out by
/// [`TaskPool::acquire`] is always in its default state.
#[derive(Debug)]
pub struct TaskPool {
    idle: Mutex<Vec<Box<TaskRecord>>>,
    max_idle: usize,
}

impl TaskPool {
    /// Keep at most `max_idle` released records around.
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle,
        }
    }

    fn idle_list(&self) -> MutexGuard<'_, Vec<Box<TaskRecord>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a cleared record, allocating when the cache is empty.
    pub fn acquire(&self) -> Box<TaskRecord> {
        self.idle_list().pop().unwrap_or_default()
    }

    /// Reset `record` and return it to the cache.
    pub fn release(&self, mut record: Box<TaskRecord>) {
        record.reset();
        let mut idle = self.idle_list();
        if idle.len() < self.max_idle {
            idle.push(record);
        }
    }

    /// Number of cached records ready for reuse.
    pub fn idle(&self) -> usize {
        self.idle_list().len()
    }
}
