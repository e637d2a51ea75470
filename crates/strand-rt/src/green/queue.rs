// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Ready queues for the bounded pool.
//!
//! Each worker owns a bounded FIFO that holds units it re-admitted itself
//! (yields, stolen batches). Everything else, fresh launches and timer
//! wake-ups, lands in the shared injector. Idle workers steal half of a
//! peer's queue.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::task::RawTask;

/// Max tasks in a single worker's local queue before overflow.
pub(crate) const LOCAL_CAPACITY: usize = 256;

/// Per-worker queue. Owner pops the front, stealers take the back.
///
/// One mutex for both ends. Contention is limited to steals, which
/// only happen when a worker has run dry.
pub(crate) struct LocalQueue {
    deque: Mutex<VecDeque<Arc<RawTask>>>,
}

impl LocalQueue {
    pub fn new() -> Self {
        Self {
            deque: Mutex::new(VecDeque::with_capacity(LOCAL_CAPACITY)),
        }
    }

    /// Push to the back. Hands the task back if the queue is full.
    pub fn push(&self, task: Arc<RawTask>) -> Result<(), Arc<RawTask>> {
        let mut q = self.deque.lock().unwrap();
        if q.len() >= LOCAL_CAPACITY {
            return Err(task);
        }
        q.push_back(task);
        Ok(())
    }

    pub fn pop(&self) -> Option<Arc<RawTask>> {
        self.deque.lock().unwrap().pop_front()
    }

    /// Take half the queue (at least one task if any) from the back.
    pub fn steal_half(&self) -> Vec<Arc<RawTask>> {
        let mut q = self.deque.lock().unwrap();
        let count = q.len().div_ceil(2);
        let keep = q.len() - count;
        q.split_off(keep).into_iter().collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.deque.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.deque.lock().unwrap().is_empty()
    }
}

/// Shared FIFO for launches, wake-ups and local overflow.
pub(crate) struct Injector {
    queue: Mutex<VecDeque<Arc<RawTask>>>,
}

impl Injector {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, task: Arc<RawTask>) {
        self.queue.lock().unwrap().push_back(task);
    }

    pub fn pop(&self) -> Option<Arc<RawTask>> {
        self.queue.lock().unwrap().pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}
