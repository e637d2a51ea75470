// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Suspension points.
//!
//! The only places a unit gives up its worker. Each one is a plain future:
//! it registers how it wants to be woken and returns `Pending`; the
//! executor re-admits the unit through its waker. Cancellation is
//! observed here, never in the middle of ordinary code.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::thread;
use std::time::{Duration, Instant};

use crate::green::task::with_current;

/// Suspend the current unit for `duration`.
///
/// Panics when polled outside a task group.
pub fn suspend(duration: Duration) -> Sleep {
    Sleep {
        deadline: Instant::now() + duration,
    }
}

/// Suspend the current unit until `deadline`.
pub fn suspend_until(deadline: Instant) -> Sleep {
    Sleep { deadline }
}

/// Let every other ready unit run before this one continues.
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

/// Whether the current unit has been asked to cancel.
///
/// Always false outside a task group.
pub fn cancelled() -> bool {
    with_current(|ctx| ctx.is_some_and(|c| c.cancel.is_cancelled()))
}

/// Index of the unit being polled on this thread, if any.
pub fn current_unit() -> Option<usize> {
    with_current(|ctx| ctx.map(|c| c.index))
}

/// Name of the thread running the current code.
pub fn current_worker() -> String {
    thread::current()
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{:?}", thread::current().id()))
}

/// Future returned by `suspend` / `suspend_until`.
#[must_use = "suspension points do nothing unless awaited"]
#[derive(Debug)]
pub struct Sleep {
    deadline: Instant,
}

impl Sleep {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if Instant::now() >= self.deadline {
            return Poll::Ready(());
        }

        let deadline = self.deadline;
        with_current(|ctx| {
            let ctx = ctx.expect("suspend() awaited outside a task group");
            if ctx.cancel.is_cancelled() {
                // Re-admit right away so the poller can drop the unit.
                cx.waker().wake_by_ref();
            } else {
                ctx.timer.register(deadline, cx.waker().clone());
            }
        });
        Poll::Pending
    }
}

/// Future returned by `yield_now`.
#[must_use = "suspension points do nothing unless awaited"]
#[derive(Debug)]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outside_group_nothing_is_current() {
        assert!(!cancelled());
        assert_eq!(current_unit(), None);
    }

    #[test]
    fn current_worker_uses_thread_name() {
        let name = thread::Builder::new()
            .name("probe".to_string())
            .spawn(current_worker)
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(name, "probe");
    }

    #[test]
    fn elapsed_sleep_is_ready_without_context() {
        let sleep = suspend(Duration::ZERO);
        let mut cx = Context::from_waker(futures_util::task::noop_waker_ref());
        let mut sleep = std::pin::pin!(sleep);
        assert_eq!(sleep.as_mut().poll(&mut cx), Poll::Ready(()));
    }
}
