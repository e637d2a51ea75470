// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Green task representation.
//!
//! Stackless coroutine tasks: a boxed future plus a small header. State
//! machine driven by `run()`. Whoever owns the polling loop (pool worker,
//! calling thread, dedicated thread) decides where the task runs; the
//! task only knows how to get itself re-admitted through `schedule_fn`.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Wake, Waker};

use crate::cancel::CancelToken;

use super::timer::Timer;

/// Task lifecycle states.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Queued, waiting to be polled.
    Ready = 0,
    /// Currently being polled by a worker.
    Running = 1,
    /// Parked at a suspension point, waiting for its waker.
    Waiting = 2,
    /// Woken while still being polled. Re-admitted once the poll returns.
    Notified = 3,
    /// Finished or dropped.
    Complete = 4,
}

impl TaskState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Ready,
            1 => Self::Running,
            2 => Self::Waiting,
            3 => Self::Notified,
            _ => Self::Complete,
        }
    }
}

/// Type-erased future for the executors. The typed result is written to
/// the group's table by the future itself.
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Re-admission callback installed by whichever executor owns the task.
pub(crate) type ScheduleFn = Arc<dyn Fn(Arc<RawTask>) + Send + Sync>;

/// What a unit can see about itself while it is being polled.
#[derive(Clone)]
pub(crate) struct TaskContext {
    pub index: usize,
    pub cancel: Arc<CancelToken>,
    pub timer: Arc<Timer>,
}

thread_local! {
    static CURRENT: RefCell<Option<TaskContext>> = const { RefCell::new(None) };
}

/// Run `f` with the context of the unit currently polled on this thread.
pub(crate) fn with_current<R>(f: impl FnOnce(Option<&TaskContext>) -> R) -> R {
    CURRENT.with(|cell| f(cell.borrow().as_ref()))
}

/// Restores the previous context when a poll returns. Inline executors
/// can nest polls on one thread.
struct EnterGuard {
    prev: Option<TaskContext>,
}

impl EnterGuard {
    fn enter(ctx: TaskContext) -> Self {
        let prev = CURRENT.with(|cell| cell.borrow_mut().replace(ctx));
        Self { prev }
    }
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        CURRENT.with(|cell| *cell.borrow_mut() = prev);
    }
}

/// Header shared between executors and wakers.
pub(crate) struct TaskHeader {
    pub state: AtomicU8,
    pub context: TaskContext,
    pub schedule_fn: Mutex<Option<ScheduleFn>>,
}

/// The task object shared by the executor, wakers and the group.
pub(crate) struct RawTask {
    pub header: TaskHeader,
    pub future: Mutex<Option<BoxFuture>>,
}

impl std::fmt::Debug for RawTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawTask")
            .field("index", &self.header.context.index)
            .field("state", &self.state())
            .finish()
    }
}

/// Result of one trip through `RawTask::run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    /// Future finished or was dropped. Never polled again.
    Complete,
    /// Parked at a suspension point; its waker will re-admit it.
    Parked,
    /// Woken during the poll. The executor must re-admit it now.
    Requeue,
}

impl RawTask {
    pub fn new(future: BoxFuture, context: TaskContext) -> Arc<Self> {
        Arc::new(Self {
            header: TaskHeader {
                state: AtomicU8::new(TaskState::Ready as u8),
                context,
                schedule_fn: Mutex::new(None),
            },
            future: Mutex::new(Some(future)),
        })
    }

    pub fn index(&self) -> usize {
        self.header.context.index
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.header.state.load(Ordering::Acquire))
    }

    pub fn set_schedule_fn(&self, f: ScheduleFn) {
        *self.header.schedule_fn.lock().unwrap() = Some(f);
    }

    /// Poll once and settle the state machine.
    ///
    /// The caller must own the task: it was just spawned, popped from a
    /// queue, or returned `Requeue` last time.
    pub fn run(self: &Arc<Self>, occupancy: &Occupancy) -> RunOutcome {
        if self.state() == TaskState::Complete {
            return RunOutcome::Complete;
        }

        self.header
            .state
            .store(TaskState::Running as u8, Ordering::Release);

        let completed = {
            let _slot = occupancy.enter();
            self.poll()
        };

        if completed {
            self.mark_complete();
            return RunOutcome::Complete;
        }

        // Running -> Waiting. If a waker fired mid-poll the state is now
        // Notified and the CAS fails; hand the task straight back.
        match self.header.state.compare_exchange(
            TaskState::Running as u8,
            TaskState::Waiting as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => RunOutcome::Parked,
            Err(_) => {
                self.header
                    .state
                    .store(TaskState::Ready as u8, Ordering::Release);
                RunOutcome::Requeue
            }
        }
    }

    pub fn mark_complete(&self) {
        self.header
            .state
            .store(TaskState::Complete as u8, Ordering::Release);
    }

    /// Poll the future once. Returns true if the task is done.
    ///
    /// A cancelled task is never resumed: its future is dropped here,
    /// which is the only place cancellation takes effect.
    fn poll(self: &Arc<Self>) -> bool {
        let mut fut_slot = self.future.lock().unwrap();
        let Some(fut) = fut_slot.as_mut() else {
            return true;
        };

        if self.header.context.cancel.is_cancelled() {
            tracing::trace!(unit = self.index(), "dropping cancelled unit");
            *fut_slot = None;
            return true;
        }

        let waker = task_waker(self.clone());
        let mut cx = Context::from_waker(&waker);
        let _enter = EnterGuard::enter(self.header.context.clone());

        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(()) => {
                *fut_slot = None;
                true
            }
            Poll::Pending => false,
        }
    }

    /// Re-admit the task if it is parked; flag it if it is mid-poll.
    pub fn wake(self: &Arc<Self>) {
        loop {
            let current = self.header.state.load(Ordering::Acquire);
            let (to, reschedule) = match TaskState::from_u8(current) {
                TaskState::Waiting => (TaskState::Ready, true),
                TaskState::Running => (TaskState::Notified, false),
                _ => return,
            };
            if self
                .header
                .state
                .compare_exchange(current, to as u8, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                if reschedule {
                    let sched = self.header.schedule_fn.lock().unwrap().clone();
                    if let Some(f) = sched {
                        f(self.clone());
                    }
                }
                return;
            }
        }
    }
}

/// Waker that re-admits a task through its executor.
struct TaskWaker {
    task: Arc<RawTask>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.task.wake();
    }
}

fn task_waker(task: Arc<RawTask>) -> Waker {
    Waker::from(Arc::new(TaskWaker { task }))
}

/// Counts polls in progress and remembers the highest count seen.
#[derive(Debug, Default)]
pub(crate) struct Occupancy {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Occupancy {
    pub fn enter(&self) -> OccupancyGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(now, Ordering::AcqRel);
        OccupancyGuard { occupancy: self }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }
}

pub(crate) struct OccupancyGuard<'a> {
    occupancy: &'a Occupancy,
}

impl Drop for OccupancyGuard<'_> {
    fn drop(&mut self) {
        self.occupancy.current.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    /// Context with a fresh token and a timer shared by all unit tests.
    pub(crate) fn test_context(index: usize) -> TaskContext {
        static TIMER: std::sync::OnceLock<Arc<Timer>> = std::sync::OnceLock::new();
        TaskContext {
            index,
            cancel: Arc::new(CancelToken::new()),
            timer: TIMER.get_or_init(Timer::start).clone(),
        }
    }

    #[test]
    fn ready_future_completes_in_one_run() {
        let task = RawTask::new(Box::pin(async {}), test_context(0));
        let occ = Occupancy::default();
        assert_eq!(task.run(&occ), RunOutcome::Complete);
        assert_eq!(task.state(), TaskState::Complete);
        assert_eq!(occ.peak(), 1);
    }

    #[test]
    fn cancelled_task_is_dropped_unpolled() {
        let polled = Arc::new(AtomicBool::new(false));
        let p = polled.clone();
        let ctx = test_context(0);
        ctx.cancel.cancel();
        let task = RawTask::new(
            Box::pin(async move {
                p.store(true, Ordering::SeqCst);
            }),
            ctx,
        );
        assert_eq!(task.run(&Occupancy::default()), RunOutcome::Complete);
        assert!(!polled.load(Ordering::SeqCst));
        assert!(task.future.lock().unwrap().is_none());
    }

    #[test]
    fn self_wake_during_poll_requeues() {
        let task = RawTask::new(Box::pin(crate::suspend::yield_now()), test_context(0));
        let occ = Occupancy::default();
        assert_eq!(task.run(&occ), RunOutcome::Requeue);
        assert_eq!(task.state(), TaskState::Ready);
        assert_eq!(task.run(&occ), RunOutcome::Complete);
    }

    #[test]
    fn wake_parked_task_calls_schedule_fn() {
        let task = RawTask::new(Box::pin(std::future::pending::<()>()), test_context(0));
        let scheduled = Arc::new(AtomicUsize::new(0));
        let s = scheduled.clone();
        task.set_schedule_fn(Arc::new(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(task.run(&Occupancy::default()), RunOutcome::Parked);
        task.wake();
        task.wake();
        assert_eq!(scheduled.load(Ordering::SeqCst), 1);
        assert_eq!(task.state(), TaskState::Ready);
    }

    #[test]
    fn wake_after_complete_is_ignored() {
        let task = RawTask::new(Box::pin(async {}), test_context(0));
        let scheduled = Arc::new(AtomicUsize::new(0));
        let s = scheduled.clone();
        task.set_schedule_fn(Arc::new(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        }));
        task.run(&Occupancy::default());
        task.wake();
        assert_eq!(scheduled.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn context_visible_only_during_poll() {
        let seen = Arc::new(AtomicUsize::new(usize::MAX));
        let s = seen.clone();
        let task = RawTask::new(
            Box::pin(async move {
                let idx = with_current(|ctx| ctx.map(|c| c.index));
                s.store(idx.unwrap_or(usize::MAX - 1), Ordering::SeqCst);
            }),
            test_context(7),
        );
        task.run(&Occupancy::default());
        assert_eq!(seen.load(Ordering::SeqCst), 7);
        assert!(with_current(|ctx| ctx.is_none()));
    }
}
