// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Green tasks runtime.
//!
//! Stackless coroutine tasks. A suspension point parks the task and frees
//! whatever thread was polling it; the waker re-admits it later.
//!
//! Components:
//! - `task`: RawTask, state machine, waker, per-poll unit context
//! - `queue`: work-stealing local queues + shared injector
//! - `scheduler`: bounded worker pool
//! - `timer`: deadline heap and driver thread
//! - `dispatch`: pool / inline / thread-per-unit executors

pub mod dispatch;
pub(crate) mod queue;
pub mod scheduler;
pub(crate) mod task;
pub mod timer;

pub use dispatch::UNIT_THREAD_PREFIX;
pub use scheduler::WORKER_THREAD_PREFIX;
pub use timer::TIMER_THREAD_NAME;
