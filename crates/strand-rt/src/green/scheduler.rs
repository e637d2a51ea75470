// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Bounded M:N work-stealing pool.
//!
//! N worker threads each own a local queue. When idle, workers steal
//! from peers or the shared injector, then park. A unit that suspends
//! gives its worker back immediately; its waker pushes it onto the
//! injector when it is ready again.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use super::queue::{Injector, LocalQueue};
use super::task::{Occupancy, RawTask, RunOutcome};

/// Prefix of worker thread names; workers are `strand-worker-{id}`.
pub const WORKER_THREAD_PREFIX: &str = "strand-worker";

/// How long an idle worker parks before re-checking for steals.
const IDLE_PARK: Duration = Duration::from_millis(5);

/// Worker pool owned by one task group.
///
/// Shuts down when the group exits (waits for every scheduled task).
pub struct Scheduler {
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    shared: Arc<SharedState>,
}

/// State shared between workers and external spawners.
pub(crate) struct SharedState {
    /// Per-worker local queues. Index = worker id.
    local_queues: Vec<LocalQueue>,
    injector: Injector,
    /// Scheduled tasks not yet complete.
    active_tasks: AtomicUsize,
    all_done: (Mutex<()>, Condvar),
    shutdown: AtomicBool,
    work_available: (Mutex<bool>, Condvar),
    occupancy: Arc<Occupancy>,
}

impl Scheduler {
    /// Start `workers` threads. Callers validate `workers >= 1`.
    pub(crate) fn new(workers: usize, occupancy: Arc<Occupancy>) -> Self {
        let worker_count = workers.max(1);

        let shared = Arc::new(SharedState {
            local_queues: (0..worker_count).map(|_| LocalQueue::new()).collect(),
            injector: Injector::new(),
            active_tasks: AtomicUsize::new(0),
            all_done: (Mutex::new(()), Condvar::new()),
            shutdown: AtomicBool::new(false),
            work_available: (Mutex::new(false), Condvar::new()),
            occupancy,
        });

        let handles = (0..worker_count)
            .map(|id| {
                let shared = shared.clone();
                thread::Builder::new()
                    .name(format!("{}-{}", WORKER_THREAD_PREFIX, id))
                    .spawn(move || worker_loop(id, &shared))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        tracing::debug!(workers = worker_count, "scheduler started");

        Self {
            workers: Mutex::new(handles),
            shared,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.shared.local_queues.len()
    }

    /// Admit a new task. Installs the waker's re-admission path.
    pub(crate) fn schedule(&self, task: Arc<RawTask>) {
        self.shared.active_tasks.fetch_add(1, Ordering::AcqRel);

        let shared = self.shared.clone();
        task.set_schedule_fn(Arc::new(move |t: Arc<RawTask>| {
            shared.inject(t);
        }));

        self.shared.inject(task);
    }

    /// Wait for all scheduled tasks, then stop and join the workers.
    pub fn shutdown(&self) {
        {
            let (lock, cvar) = &self.shared.all_done;
            let mut guard = lock.lock().unwrap();
            while self.shared.active_tasks.load(Ordering::Acquire) > 0 {
                guard = cvar.wait(guard).unwrap();
            }
        }

        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.notify_all();

        let mut workers = self.workers.lock().unwrap();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
        tracing::debug!("scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if !self.shared.shutdown.load(Ordering::Acquire) {
            self.shutdown();
        }
    }
}

impl SharedState {
    fn inject(&self, task: Arc<RawTask>) {
        self.injector.push(task);
        self.notify_one();
    }

    fn notify_one(&self) {
        let (lock, cvar) = &self.work_available;
        let mut ready = lock.lock().unwrap();
        *ready = true;
        cvar.notify_one();
    }

    fn notify_all(&self) {
        let (lock, cvar) = &self.work_available;
        let mut ready = lock.lock().unwrap();
        *ready = true;
        cvar.notify_all();
    }

    fn task_finished(&self) {
        let prev = self.active_tasks.fetch_sub(1, Ordering::AcqRel);
        if prev == 1 {
            let (lock, cvar) = &self.all_done;
            let _guard = lock.lock().unwrap();
            cvar.notify_all();
        }
    }

    fn has_queued_work(&self, id: usize) -> bool {
        !self.injector.is_empty() || !self.local_queues[id].is_empty()
    }
}

/// Simple xorshift64 for random victim selection.
fn xorshift64(state: &mut u64) -> u64 {
    let mut x = *state;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    *state = x;
    x
}

fn next_task(id: usize, shared: &SharedState, rng: &mut u64) -> Option<Arc<RawTask>> {
    let local = &shared.local_queues[id];
    if let Some(task) = local.pop() {
        return Some(task);
    }

    let workers = shared.local_queues.len();
    if workers > 1 {
        let victim = (xorshift64(rng) as usize) % workers;
        if victim != id {
            let mut stolen = shared.local_queues[victim].steal_half().into_iter();
            if let Some(first) = stolen.next() {
                tracing::trace!(worker = id, victim, "stole work");
                for task in stolen {
                    if let Err(task) = local.push(task) {
                        shared.injector.push(task);
                    }
                }
                return Some(first);
            }
        }
    }

    shared.injector.pop()
}

fn worker_loop(id: usize, shared: &SharedState) {
    let mut rng = (id as u64).wrapping_add(0x9E3779B97F4A7C15);

    loop {
        if let Some(task) = next_task(id, shared, &mut rng) {
            run_task(id, task, shared);
            continue;
        }

        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }

        let (lock, cvar) = &shared.work_available;
        let mut ready = lock.lock().unwrap();
        // Work may have arrived between the queue checks and locking.
        if *ready || shared.has_queued_work(id) {
            *ready = false;
            continue;
        }
        ready = cvar.wait_timeout(ready, IDLE_PARK).unwrap().0;
        *ready = false;
    }
}

fn run_task(id: usize, task: Arc<RawTask>, shared: &SharedState) {
    tracing::trace!(worker = id, unit = task.index(), "polling unit");
    match task.run(&shared.occupancy) {
        RunOutcome::Complete => shared.task_finished(),
        RunOutcome::Parked => {}
        RunOutcome::Requeue => {
            // Yielded: keep it on this worker unless the queue is full.
            if let Err(task) = shared.local_queues[id].push(task) {
                shared.injector.push(task);
            }
            shared.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::green::task::tests::test_context;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn runs_every_task_before_shutdown() {
        let sched = Scheduler::new(2, Arc::default());
        let counter = Arc::new(AtomicI32::new(0));

        for i in 0..10 {
            let c = counter.clone();
            sched.schedule(RawTask::new(
                Box::pin(async move {
                    c.fetch_add(1, Ordering::Relaxed);
                }),
                test_context(i),
            ));
        }

        sched.shutdown();
        assert_eq!(counter.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn workers_are_named() {
        let sched = Scheduler::new(3, Arc::default());
        let names = Arc::new(Mutex::new(HashSet::new()));
        for i in 0..30 {
            let names = names.clone();
            sched.schedule(RawTask::new(
                Box::pin(async move {
                    let name = thread::current().name().unwrap_or("").to_string();
                    names.lock().unwrap().insert(name);
                }),
                test_context(i),
            ));
        }
        sched.shutdown();
        let names = names.lock().unwrap();
        assert!(!names.is_empty());
        assert!(names.iter().all(|n| n.starts_with(WORKER_THREAD_PREFIX)));
        assert_eq!(sched.worker_count(), 3);
    }

    #[test]
    fn yielding_tasks_finish() {
        let sched = Scheduler::new(1, Arc::default());
        let counter = Arc::new(AtomicI32::new(0));
        for i in 0..4 {
            let c = counter.clone();
            sched.schedule(RawTask::new(
                Box::pin(async move {
                    for _ in 0..3 {
                        crate::suspend::yield_now().await;
                        c.fetch_add(1, Ordering::Relaxed);
                    }
                }),
                test_context(i),
            ));
        }
        sched.shutdown();
        assert_eq!(counter.load(Ordering::Relaxed), 12);
    }

    #[test]
    fn occupancy_bounded_by_workers() {
        let occupancy = Arc::new(Occupancy::default());
        let sched = Scheduler::new(2, occupancy.clone());
        for i in 0..8 {
            sched.schedule(RawTask::new(
                Box::pin(async {
                    thread::sleep(Duration::from_millis(2));
                }),
                test_context(i),
            ));
        }
        sched.shutdown();
        assert!(occupancy.peak() >= 1);
        assert!(occupancy.peak() <= 2);
    }
}
