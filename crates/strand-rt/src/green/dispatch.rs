// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Execution contexts a task group schedules onto.
//!
//! - `Pool`: the bounded work-stealing scheduler.
//! - `Inline`: polls on the launching thread; resumes on the waker's thread.
//! - `Threads`: one dedicated OS thread per unit, parked while suspended.

use std::sync::{Arc, Mutex};
use std::thread;

use crate::config::Policy;

use super::scheduler::Scheduler;
use super::task::{Occupancy, RawTask, RunOutcome, TaskState};

/// Prefix of dedicated unit threads; threads are `strand-thread-{index}`.
pub const UNIT_THREAD_PREFIX: &str = "strand-thread";

pub(crate) enum Dispatcher {
    Pool(Scheduler),
    Inline(Arc<Occupancy>),
    Threads(ThreadSet),
}

impl Dispatcher {
    pub fn for_policy(policy: Policy, occupancy: Arc<Occupancy>) -> Self {
        match policy {
            Policy::BoundedPool(n) => Dispatcher::Pool(Scheduler::new(n, occupancy)),
            Policy::Unconfined => Dispatcher::Inline(occupancy),
            Policy::ThreadPerUnit => Dispatcher::Threads(ThreadSet::new(occupancy)),
        }
    }

    /// Hand a freshly created task to the executor.
    ///
    /// `Inline` runs the task on this thread before returning.
    pub fn spawn(&self, task: Arc<RawTask>) {
        match self {
            Dispatcher::Pool(scheduler) => scheduler.schedule(task),
            Dispatcher::Inline(occupancy) => {
                let occ = occupancy.clone();
                task.set_schedule_fn(Arc::new(move |t: Arc<RawTask>| run_inline(&t, &occ)));
                run_inline(&task, occupancy);
            }
            Dispatcher::Threads(threads) => threads.spawn(task),
        }
    }

    /// Join every thread this dispatcher started.
    pub fn shutdown(&self) {
        match self {
            Dispatcher::Pool(scheduler) => scheduler.shutdown(),
            Dispatcher::Inline(_) => {}
            Dispatcher::Threads(threads) => threads.join_all(),
        }
    }
}

/// Poll until the task parks or completes, on the current thread.
fn run_inline(task: &Arc<RawTask>, occupancy: &Occupancy) {
    while task.run(occupancy) == RunOutcome::Requeue {}
}

pub(crate) struct ThreadSet {
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
    occupancy: Arc<Occupancy>,
}

impl ThreadSet {
    fn new(occupancy: Arc<Occupancy>) -> Self {
        Self {
            handles: Mutex::new(Vec::new()),
            occupancy,
        }
    }

    fn spawn(&self, task: Arc<RawTask>) {
        let occupancy = self.occupancy.clone();
        let name = format!("{}-{}", UNIT_THREAD_PREFIX, task.index());
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || {
                let me = thread::current();
                task.set_schedule_fn(Arc::new(move |_| me.unpark()));
                loop {
                    match task.run(&occupancy) {
                        RunOutcome::Complete => break,
                        RunOutcome::Requeue => continue,
                        RunOutcome::Parked => {
                            // The waker flips Waiting -> Ready before unparking.
                            while task.state() == TaskState::Waiting {
                                thread::park();
                            }
                        }
                    }
                }
            })
            .expect("failed to spawn unit thread");
        self.handles.lock().unwrap().push(handle);
    }

    fn join_all(&self) {
        let handles: Vec<_> = self.handles.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
    }
}
