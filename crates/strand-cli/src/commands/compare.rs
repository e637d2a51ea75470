// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! `strand compare`: one workload on every policy, side by side.

use std::convert::Infallible;
use std::time::Duration;

use colored::Colorize;
use strand_rt::{suspend, GroupReport, ReportSummary, TaskGroup};

use super::CommandResult;
use crate::args::Options;
use crate::output;

const POLICIES: [&str; 3] = ["pool", "unconfined", "threads"];

pub fn cmd_compare(opts: &Options) -> CommandResult {
    let count = opts.units_or(14);
    let delay = opts.delay_or(10);

    let mut reports = Vec::with_capacity(POLICIES.len());
    for name in POLICIES {
        let config = opts.group_config(Some(name))?;
        tracing::debug!(policy = %config.policy, units = count, "comparing");
        reports.push(TaskGroup::new(config)?.run_report(workload(count, delay)));
    }

    if opts.json {
        let summaries: Vec<ReportSummary> = reports.iter().map(GroupReport::summary).collect();
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    println!(
        "{} units, {}ms suspension each",
        count.to_string().bold(),
        delay.as_millis()
    );
    println!();
    println!(
        "{:<12} {:>10} {:>6} {:>8}  {}",
        "policy", "elapsed", "peak", "threads", "result"
    );
    println!("{}", output::separator(48));
    for report in &reports {
        let result = match report.error() {
            None => "ok".green(),
            Some(err) => err.to_string().red(),
        };
        println!(
            "{:<12} {:>8.1}ms {:>6} {:>8}  {}",
            report.policy.to_string(),
            report.elapsed.as_secs_f64() * 1000.0,
            report.peak_concurrency,
            report.workers().len(),
            result
        );
    }
    Ok(())
}

fn workload(
    count: usize,
    delay: Duration,
) -> impl Iterator<Item = impl std::future::Future<Output = Result<usize, Infallible>> + Send + 'static> {
    (0..count).map(move |i| async move {
        suspend(delay).await;
        Ok(i)
    })
}
