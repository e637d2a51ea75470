// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Structured task groups.
//!
//! A `TaskGroup` launches a batch of units onto one dispatcher and does
//! not return until every unit has completed, failed or been cancelled.
//! All threads it started (workers, timer) are joined before `run`
//! returns, so nothing launched by a group outlives it.
//!
//! The first failure moves the group to `Failed` and cancels every unit
//! that has not finished. Units that were never started are not started.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use serde::Serialize;

use crate::cancel::CancelToken;
use crate::config::{GroupConfig, Policy};
use crate::error::{ConfigError, GroupError};
use crate::green::dispatch::Dispatcher;
use crate::green::task::{BoxFuture, Occupancy, RawTask, TaskContext};
use crate::green::timer::Timer;
use crate::suspend::current_worker;

/// Lifecycle of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleState {
    /// Created, not yet polled.
    Pending,
    /// Polled at least once, not finished.
    Running,
    Completed,
    Failed,
    /// Dropped at a suspension point or before it ever started.
    Cancelled,
}

impl HandleState {
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            HandleState::Completed | HandleState::Failed | HandleState::Cancelled
        )
    }
}

/// Aggregate state of a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupState {
    Running,
    Completed,
    Failed(GroupError),
}

/// Record of one launched unit.
#[derive(Debug, Clone)]
pub struct TaskHandle<T> {
    index: usize,
    state: HandleState,
    value: Option<T>,
    cause: Option<String>,
    worker: Option<String>,
    completion: Option<usize>,
}

impl<T> TaskHandle<T> {
    fn new(index: usize) -> Self {
        Self {
            index,
            state: HandleState::Pending,
            value: None,
            cause: None,
            worker: None,
            completion: None,
        }
    }

    /// Position of the unit in the launch sequence.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }

    /// Failure message, for `Failed` units.
    pub fn cause(&self) -> Option<&str> {
        self.cause.as_deref()
    }

    /// Thread that finished the unit. `None` for cancelled units.
    pub fn worker(&self) -> Option<&str> {
        self.worker.as_deref()
    }

    /// 0-based position among units that completed or failed.
    pub fn completion(&self) -> Option<usize> {
        self.completion
    }

    /// The unit's own outcome, as its caller would see it.
    pub fn outcome(&self) -> Result<&T, GroupError> {
        match (self.state, &self.value) {
            (HandleState::Completed, Some(value)) => Ok(value),
            (HandleState::Failed, _) => Err(GroupError::UnitFailure {
                index: self.index,
                cause: self.cause.clone().unwrap_or_default(),
            }),
            _ => Err(GroupError::CancelledByPeer),
        }
    }
}

/// How a unit ended, as reported by its wrapper.
enum Settlement<T> {
    Completed { value: T, worker: String },
    Failed { cause: String, worker: String },
    Cancelled,
}

struct Table<T> {
    handles: Vec<TaskHandle<T>>,
    /// Admitted tasks, for cancellation fan-out.
    tasks: Vec<Arc<RawTask>>,
    unsettled: usize,
    state: GroupState,
    next_completion: usize,
}

impl<T> Table<T> {
    /// Move to `Failed` if still running. Returns the tasks to cancel.
    fn fail(&mut self, error: GroupError) -> Option<Vec<Arc<RawTask>>> {
        if self.state != GroupState::Running {
            return None;
        }
        self.state = GroupState::Failed(error);
        Some(self.tasks.clone())
    }
}

struct GroupShared<T> {
    table: Mutex<Table<T>>,
    settled: Condvar,
    cancel: Arc<CancelToken>,
}

impl<T> GroupShared<T> {
    fn new(units: usize, cancel: Arc<CancelToken>) -> Self {
        Self {
            table: Mutex::new(Table {
                handles: (0..units).map(TaskHandle::new).collect(),
                tasks: Vec::with_capacity(units),
                unsettled: units,
                state: GroupState::Running,
                next_completion: 0,
            }),
            settled: Condvar::new(),
            cancel,
        }
    }

    /// Register a task for launch. Refused once the group has failed;
    /// dropping the refused task settles its unit as cancelled.
    fn admit(&self, task: &Arc<RawTask>) -> bool {
        let mut table = self.table.lock().unwrap();
        if table.state != GroupState::Running {
            return false;
        }
        table.tasks.push(task.clone());
        true
    }

    fn start(&self, index: usize) {
        let mut table = self.table.lock().unwrap();
        if table.handles[index].state == HandleState::Pending {
            table.handles[index].state = HandleState::Running;
        }
    }

    fn settle(&self, index: usize, settlement: Settlement<T>) {
        let to_cancel = {
            let mut table = self.table.lock().unwrap();
            if table.handles[index].state.is_settled() {
                return;
            }

            let mut failure = None;
            let seq = table.next_completion;
            let handle = &mut table.handles[index];
            match settlement {
                Settlement::Completed { value, worker } => {
                    handle.state = HandleState::Completed;
                    handle.value = Some(value);
                    handle.worker = Some(worker);
                    handle.completion = Some(seq);
                }
                Settlement::Failed { cause, worker } => {
                    handle.state = HandleState::Failed;
                    handle.cause = Some(cause.clone());
                    handle.worker = Some(worker);
                    handle.completion = Some(seq);
                    failure = Some(cause);
                }
                Settlement::Cancelled => {
                    handle.state = HandleState::Cancelled;
                }
            }
            if handle.completion.is_some() {
                table.next_completion += 1;
            }

            table.unsettled -= 1;
            let to_cancel = failure.and_then(|cause| {
                tracing::warn!(unit = index, %cause, "unit failed");
                table.fail(GroupError::UnitFailure { index, cause })
            });
            if table.unsettled == 0 && table.state == GroupState::Running {
                table.state = GroupState::Completed;
            }
            self.settled.notify_all();
            to_cancel
        };

        if let Some(tasks) = to_cancel {
            self.cancel_all(tasks);
        }
    }

    fn expire(&self, after: Duration) {
        let to_cancel = self.table.lock().unwrap().fail(GroupError::Timeout { after });
        if let Some(tasks) = to_cancel {
            tracing::warn!(?after, "group deadline passed");
            self.cancel_all(tasks);
        }
    }

    /// Flag every unit and wake the parked ones so they observe it.
    /// Must be called without the table lock: inline executors poll the
    /// woken unit on this thread.
    fn cancel_all(&self, tasks: Vec<Arc<RawTask>>) {
        if self.cancel.cancel() {
            tracing::debug!(units = tasks.len(), "cancelling unfinished units");
        }
        for task in tasks {
            task.wake();
        }
    }

    /// Block until every unit has settled, enforcing the deadline.
    fn wait(&self, deadline: Option<(Instant, Duration)>) {
        let mut table = self.table.lock().unwrap();
        while table.unsettled > 0 {
            match deadline {
                Some((at, after)) if table.state == GroupState::Running => {
                    let now = Instant::now();
                    if now >= at {
                        drop(table);
                        self.expire(after);
                        table = self.table.lock().unwrap();
                        continue;
                    }
                    table = self.settled.wait_timeout(table, at - now).unwrap().0;
                }
                _ => table = self.settled.wait(table).unwrap(),
            }
        }
    }

    /// Final handles and outcome. The surfaced failure is the one that
    /// moved the group out of `Running`; later failures were absorbed.
    fn finish(&self) -> (Vec<TaskHandle<T>>, GroupState) {
        let mut table = self.table.lock().unwrap();
        let handles = std::mem::take(&mut table.handles);
        let state = match &table.state {
            GroupState::Running => GroupState::Completed,
            other => other.clone(),
        };
        (handles, state)
    }
}

/// Settles the unit as cancelled if its future is dropped unfinished.
struct SlotGuard<T> {
    shared: Arc<GroupShared<T>>,
    index: usize,
    settled: bool,
}

impl<T> Drop for SlotGuard<T> {
    fn drop(&mut self) {
        if !self.settled {
            self.shared.settle(self.index, Settlement::Cancelled);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

/// Wrap a unit so it records its own outcome in the table.
fn wrap_unit<T, E, F>(shared: Arc<GroupShared<T>>, index: usize, unit: F) -> BoxFuture
where
    T: Send + 'static,
    E: Display + 'static,
    F: Future<Output = Result<T, E>> + Send + 'static,
{
    // Built outside the async block so an unpolled future still owns it.
    let mut guard = SlotGuard {
        shared,
        index,
        settled: false,
    };
    Box::pin(async move {
        guard.shared.start(guard.index);
        let outcome = AssertUnwindSafe(unit).catch_unwind().await;
        let worker = current_worker();
        let settlement = match outcome {
            Ok(Ok(value)) => Settlement::Completed { value, worker },
            Ok(Err(err)) => Settlement::Failed {
                cause: err.to_string(),
                worker,
            },
            Err(payload) => Settlement::Failed {
                cause: panic_message(payload.as_ref()),
                worker,
            },
        };
        guard.settled = true;
        guard.shared.settle(guard.index, settlement);
    })
}

/// Turn a synchronous closure into a unit with no suspension point.
pub fn unit_fn<T, E, G>(work: G) -> impl Future<Output = Result<T, E>> + Send + 'static
where
    T: Send + 'static,
    E: Send + 'static,
    G: FnOnce() -> Result<T, E> + Send + 'static,
{
    async move { work() }
}

/// Scope that runs a batch of units to completion.
#[derive(Debug, Clone)]
pub struct TaskGroup {
    config: GroupConfig,
}

impl TaskGroup {
    pub fn new(config: GroupConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn with_policy(policy: Policy) -> Result<Self, ConfigError> {
        Self::new(GroupConfig::new(policy))
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    /// Run every unit; results are index-aligned with `units`.
    pub fn run<T, E, F, I>(self, units: I) -> Result<Vec<T>, GroupError>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + 'static,
    {
        self.run_report(units).into_result()
    }

    /// `run` for synchronous closures.
    pub fn run_fn<T, E, G, I>(self, units: I) -> Result<Vec<T>, GroupError>
    where
        I: IntoIterator<Item = G>,
        G: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        self.run(units.into_iter().map(unit_fn))
    }

    /// Run every unit and return the full per-unit record.
    pub fn run_report<T, E, F, I>(self, units: I) -> GroupReport<T>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + 'static,
    {
        let units: Vec<F> = units.into_iter().collect();
        let policy = self.config.policy;
        let started = Instant::now();
        let deadline = self.config.deadline.map(|after| (started + after, after));

        let cancel = Arc::new(CancelToken::new());
        let shared = Arc::new(GroupShared::new(units.len(), cancel.clone()));
        let timer = Timer::start();
        let occupancy = Arc::new(Occupancy::default());
        let dispatcher = Dispatcher::for_policy(policy, occupancy.clone());

        tracing::debug!(%policy, units = units.len(), "group started");

        for (index, unit) in units.into_iter().enumerate() {
            if let Some((at, after)) = deadline {
                if Instant::now() >= at {
                    shared.expire(after);
                }
            }

            let context = TaskContext {
                index,
                cancel: cancel.clone(),
                timer: timer.clone(),
            };
            let task = RawTask::new(wrap_unit(shared.clone(), index, unit), context);
            if shared.admit(&task) {
                dispatcher.spawn(task);
            } else {
                tracing::trace!(unit = index, "not started, group already failed");
            }
        }

        shared.wait(deadline);
        dispatcher.shutdown();
        tracing::trace!(unfired = timer.pending(), "stopping timer");
        timer.shutdown();

        let (handles, state) = shared.finish();
        let report = GroupReport {
            policy,
            state,
            handles,
            elapsed: started.elapsed(),
            peak_concurrency: occupancy.peak(),
        };
        tracing::debug!(
            %policy,
            elapsed_ms = report.elapsed.as_millis() as u64,
            peak = report.peak_concurrency,
            completed = report.is_completed(),
            "group finished"
        );
        report
    }
}

/// Everything a finished group knows about its run.
#[derive(Debug, Clone)]
pub struct GroupReport<T> {
    pub policy: Policy,
    pub state: GroupState,
    /// One per unit, in launch order.
    pub handles: Vec<TaskHandle<T>>,
    pub elapsed: Duration,
    /// Most units observed being polled at the same instant.
    pub peak_concurrency: usize,
}

impl<T> GroupReport<T> {
    pub fn is_completed(&self) -> bool {
        self.state == GroupState::Completed
    }

    pub fn error(&self) -> Option<&GroupError> {
        match &self.state {
            GroupState::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Unit indices in the order they finished.
    pub fn completion_order(&self) -> Vec<usize> {
        let mut finished: Vec<&TaskHandle<T>> = self
            .handles
            .iter()
            .filter(|h| h.completion.is_some())
            .collect();
        finished.sort_by_key(|h| h.completion);
        finished.iter().map(|h| h.index).collect()
    }

    /// Distinct threads that finished at least one unit.
    pub fn workers(&self) -> BTreeSet<&str> {
        self.handles.iter().filter_map(|h| h.worker()).collect()
    }

    pub fn into_result(self) -> Result<Vec<T>, GroupError> {
        if let GroupState::Failed(err) = self.state {
            return Err(err);
        }
        self.handles
            .into_iter()
            .map(|h| h.into_value().ok_or(GroupError::CancelledByPeer))
            .collect()
    }

    /// Serializable view without the unit values.
    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            policy: self.policy.to_string(),
            completed: self.is_completed(),
            error: self.error().map(|e| e.to_string()),
            elapsed_ms: self.elapsed.as_secs_f64() * 1000.0,
            peak_concurrency: self.peak_concurrency,
            workers: self.workers().len(),
            units: self
                .handles
                .iter()
                .map(|h| UnitSummary {
                    index: h.index,
                    state: h.state,
                    worker: h.worker.clone(),
                    completion: h.completion,
                    cause: h.cause.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub policy: String,
    pub completed: bool,
    pub error: Option<String>,
    pub elapsed_ms: f64,
    pub peak_concurrency: usize,
    pub workers: usize,
    pub units: Vec<UnitSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitSummary {
    pub index: usize,
    pub state: HandleState,
    pub worker: Option<String>,
    pub completion: Option<usize>,
    pub cause: Option<String>,
}
