// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Single-policy demos: each launches a batch of units and prints which
//! thread ran them.

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use colored::Colorize;
use strand_rt::{current_worker, suspend, GroupConfig, HelloWorld, ReportSummary, TaskGroup};

use super::{finish, CommandResult};
use crate::args::Options;
use crate::output;

pub fn cmd_hello() {
    println!("{}", HelloWorld::new().hello());
}

/// Units on a bounded pool. Threads get reused; output order is not
/// launch order.
pub fn cmd_pool(opts: &Options) -> CommandResult {
    let config = opts.group_config(Some("pool"))?;
    counted("pool", config, opts, opts.units_or(14), opts.delay_or(10))
}

/// Same batch with a fresh OS thread for every unit.
pub fn cmd_threads(opts: &Options) -> CommandResult {
    let config = opts.group_config(Some("threads"))?;
    counted("threads", config, opts, opts.units_or(14), opts.delay_or(0))
}

/// Units run on this thread, in launch order.
pub fn cmd_unconfined(opts: &Options) -> CommandResult {
    let config = opts.group_config(Some("unconfined"))?;
    counted("unconfined", config, opts, opts.units_or(10), opts.delay_or(0))
}

/// Each unit suspends and resumes, usually on a different worker.
pub fn cmd_resume(opts: &Options) -> CommandResult {
    let config = opts.group_config(Some("pool"))?;
    let delay = opts.delay_or(10);
    let verbose = !opts.json;

    let units = (0..opts.units_or(10)).map(|i| async move {
        if verbose {
            println!("Before delay {}: {}", i, output::worker(&current_worker()));
        }
        suspend(delay).await;
        if verbose {
            println!("After delay {}: {}", i, output::worker(&current_worker()));
        }
        Ok::<_, Infallible>(())
    });

    let report = TaskGroup::new(config)?.run_report(units);
    finish("resume", &report, opts)
}

/// Two units returning values after different delays; the caller gets
/// both once the slower one is done.
pub fn cmd_values(opts: &Options) -> CommandResult {
    let config = opts.group_config(Some("pool"))?;
    let first = opts.delay_or(1000);
    let jobs = [(first, "Returned value"), (first * 2, "Returned value 2")];

    let units = jobs.into_iter().map(|(delay, text)| async move {
        suspend(delay).await;
        Ok::<_, Infallible>(text.to_string())
    });

    let report = TaskGroup::new(config)?.run_report(units);
    if !opts.json && report.is_completed() {
        let values: Vec<&str> = report
            .handles
            .iter()
            .filter_map(|h| h.value().map(String::as_str))
            .collect();
        println!("{}", values.join(" and "));
    }
    finish("values", &report, opts)
}

/// A fresh single-unit group per iteration. Each group joins before the
/// next one starts, so the total is the sum of the delays.
pub fn cmd_scoped(opts: &Options) -> CommandResult {
    let config = opts.group_config(Some("pool"))?;
    let delay = opts.delay_or(100);
    let counter = Arc::new(AtomicUsize::new(0));
    let started = Instant::now();
    let mut summaries: Vec<ReportSummary> = Vec::new();

    for _ in 0..opts.units_or(20) {
        let units = [print_after(delay, counter.clone(), !opts.json)];
        let report = TaskGroup::new(config.clone())?.run_report(units);
        summaries.push(report.summary());
        if let Some(err) = report.error() {
            if !opts.json {
                println!("{}", output::banner_fail("scoped", &err.to_string()));
            }
            return Err(err.clone().into());
        }
    }

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        println!();
        println!("{}", output::banner_ok("scoped"));
        println!(
            "  groups {}  elapsed {}",
            summaries.len(),
            format!("{:.1}ms", started.elapsed().as_secs_f64() * 1000.0).bold()
        );
    }
    Ok(())
}

fn counted(
    what: &str,
    config: GroupConfig,
    opts: &Options,
    count: usize,
    delay: Duration,
) -> CommandResult {
    let counter = Arc::new(AtomicUsize::new(0));
    let verbose = !opts.json;
    let units = (0..count).map(|_| print_after(delay, counter.clone(), verbose));
    let report = TaskGroup::new(config)?.run_report(units);
    finish(what, &report, opts)
}

/// Suspend, then take a ticket from `counter` and print it with the
/// current thread.
async fn print_after(
    delay: Duration,
    counter: Arc<AtomicUsize>,
    verbose: bool,
) -> Result<usize, Infallible> {
    suspend(delay).await;
    let n = counter.fetch_add(1, Ordering::SeqCst);
    if verbose {
        println!("{}: {}", output::counter(n), output::worker(&current_worker()));
    }
    Ok(n)
}
