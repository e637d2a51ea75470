// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Strand runtime library.
//!
//! Structured task groups over three execution contexts: a bounded M:N
//! green-task pool, an unconfined inline executor and a thread-per-unit
//! baseline. Same group API on all three, so the difference between
//! releasing a worker at a suspension point and blocking an OS thread
//! there is directly observable.
//!
//! Components:
//! - group: TaskGroup, per-unit handles, reports
//! - suspend: suspension points (suspend, yield_now) and unit queries
//! - config: Policy, GroupConfig, layered loading
//! - error: GroupError, ConfigError
//! - cancel: cooperative cancellation token
//! - green: task state machine, queues, scheduler, timer, dispatchers
//! - greeting: the fixed greeting

pub mod cancel;
pub mod config;
pub mod error;
pub mod green;
pub mod greeting;
pub mod group;
pub mod suspend;

pub use config::{ConfigOverrides, GroupConfig, Policy};
pub use error::{ConfigError, GroupError};
pub use greeting::HelloWorld;
pub use group::{
    unit_fn, GroupReport, GroupState, HandleState, ReportSummary, TaskGroup, TaskHandle,
    UnitSummary,
};
pub use suspend::{cancelled, current_unit, current_worker, suspend, suspend_until, yield_now};
