// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Timer driver: one thread, one deadline heap.
//!
//! Suspended units register a deadline and a waker. The driver thread
//! sleeps until the earliest deadline, then wakes every task that is due.
//! Wakers are invoked outside the heap lock so inline executors can run
//! the resumed unit right here on `strand-timer`.

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex};
use std::task::Waker;
use std::thread;
use std::time::Instant;

/// Name of the timer driver thread.
pub const TIMER_THREAD_NAME: &str = "strand-timer";

struct Entry {
    deadline: Instant,
    seq: u64,
    waker: Waker,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

struct TimerState {
    entries: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
    shutdown: bool,
}

struct TimerInner {
    state: Mutex<TimerState>,
    changed: Condvar,
}

/// Owns the driver thread. Shuts down on drop.
pub struct Timer {
    inner: Arc<TimerInner>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Timer {
    /// Start the driver thread.
    pub fn start() -> Arc<Self> {
        let inner = Arc::new(TimerInner {
            state: Mutex::new(TimerState {
                entries: BinaryHeap::new(),
                next_seq: 0,
                shutdown: false,
            }),
            changed: Condvar::new(),
        });

        let driver = inner.clone();
        let handle = thread::Builder::new()
            .name(TIMER_THREAD_NAME.to_string())
            .spawn(move || timer_loop(&driver))
            .expect("failed to spawn timer thread");

        Arc::new(Self {
            inner,
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Wake `waker` once `deadline` has passed.
    pub fn register(&self, deadline: Instant, waker: Waker) {
        let mut state = self.inner.state.lock().unwrap();
        if state.shutdown {
            drop(state);
            waker.wake();
            return;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        let earliest = state
            .entries
            .peek()
            .map_or(true, |Reverse(top)| deadline < top.deadline);
        state.entries.push(Reverse(Entry {
            deadline,
            seq,
            waker,
        }));
        if earliest {
            self.inner.changed.notify_one();
        }
    }

    /// Number of registered, not yet fired deadlines.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().unwrap().entries.len()
    }

    /// Stop the driver and drop every pending waker unfired.
    pub fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.shutdown = true;
            state.entries.clear();
            self.inner.changed.notify_all();
        }

        let handle = self.thread.lock().unwrap().take();
        if let Some(handle) = handle {
            // The last task reference can be released on the driver itself.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn timer_loop(inner: &TimerInner) {
    let mut state = inner.state.lock().unwrap();
    loop {
        if state.shutdown {
            break;
        }

        let now = Instant::now();
        let mut due = Vec::new();
        while state
            .entries
            .peek()
            .is_some_and(|Reverse(top)| top.deadline <= now)
        {
            if let Some(Reverse(entry)) = state.entries.pop() {
                due.push(entry.waker);
            }
        }

        if !due.is_empty() {
            drop(state);
            for waker in due {
                waker.wake();
            }
            state = inner.state.lock().unwrap();
            continue;
        }

        let next = state.entries.peek().map(|Reverse(top)| top.deadline);
        state = match next {
            Some(deadline) => {
                let wait = deadline.saturating_duration_since(now);
                inner.changed.wait_timeout(state, wait).unwrap().0
            }
            None => inner.changed.wait(state).unwrap(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::task::Wake;
    use std::time::Duration;

    struct ChannelWaker {
        id: usize,
        tx: Mutex<mpsc::Sender<usize>>,
    }

    impl Wake for ChannelWaker {
        fn wake(self: Arc<Self>) {
            let _ = self.tx.lock().unwrap().send(self.id);
        }
    }

    fn waker(id: usize, tx: &mpsc::Sender<usize>) -> Waker {
        Waker::from(Arc::new(ChannelWaker {
            id,
            tx: Mutex::new(tx.clone()),
        }))
    }

    #[test]
    fn fires_in_deadline_order() {
        let timer = Timer::start();
        let (tx, rx) = mpsc::channel();
        let now = Instant::now();
        timer.register(now + Duration::from_millis(30), waker(2, &tx));
        timer.register(now + Duration::from_millis(10), waker(1, &tx));
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 1);
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 2);
        assert!(now.elapsed() >= Duration::from_millis(30));
        timer.shutdown();
    }

    #[test]
    fn past_deadline_fires_promptly() {
        let timer = Timer::start();
        let (tx, rx) = mpsc::channel();
        timer.register(Instant::now(), waker(9, &tx));
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 9);
    }

    #[test]
    fn shutdown_drops_pending_entries() {
        let timer = Timer::start();
        let (tx, rx) = mpsc::channel();
        timer.register(Instant::now() + Duration::from_secs(60), waker(1, &tx));
        assert_eq!(timer.pending(), 1);
        timer.shutdown();
        assert_eq!(timer.pending(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn register_after_shutdown_wakes_immediately() {
        let timer = Timer::start();
        timer.shutdown();
        let (tx, rx) = mpsc::channel();
        timer.register(Instant::now() + Duration::from_secs(60), waker(3, &tx));
        assert_eq!(rx.try_recv().unwrap(), 3);
    }

    #[test]
    fn wakes_run_on_timer_thread() {
        struct NameWaker(Mutex<mpsc::Sender<String>>, AtomicUsize);
        impl Wake for NameWaker {
            fn wake(self: Arc<Self>) {
                self.1.fetch_add(1, Ordering::SeqCst);
                let name = thread::current().name().unwrap_or("").to_string();
                let _ = self.0.lock().unwrap().send(name);
            }
        }
        let timer = Timer::start();
        let (tx, rx) = mpsc::channel();
        let w = Waker::from(Arc::new(NameWaker(Mutex::new(tx), AtomicUsize::new(0))));
        timer.register(Instant::now() + Duration::from_millis(1), w);
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(1)).unwrap(),
            TIMER_THREAD_NAME
        );
    }
}
