// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! CLI output formatting with colors and styling.
//!
//! Respects NO_COLOR and FORCE_COLOR environment variables.
//! Colors are automatically disabled when output is piped.

use colored::{ColoredString, Colorize};
use strand_rt::{GroupReport, HandleState};

/// Initialize color support based on environment.
/// Call once at startup.
pub fn init() {
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    } else if std::env::var("FORCE_COLOR").is_ok() {
        colored::control::set_override(true);
    }
}

// === Error Output ===

pub fn error_label() -> ColoredString {
    "error".red().bold()
}

pub fn hint_label() -> ColoredString {
    "hint".cyan()
}

// === Banners ===

pub fn banner_ok(what: &str) -> String {
    format!(
        "{} {} {}",
        "===".dimmed(),
        format!("{} OK", what).green().bold(),
        "===".dimmed()
    )
}

pub fn banner_fail(what: &str, reason: &str) -> String {
    format!(
        "{} {} {}",
        "===".dimmed(),
        format!("{} FAILED: {}", what, reason).red().bold(),
        "===".dimmed()
    )
}

// === Help Output ===

pub fn title(name: &str) -> ColoredString {
    name.bold()
}

pub fn version(v: &str) -> ColoredString {
    v.dimmed()
}

pub fn section_header(header: &str) -> ColoredString {
    header.yellow().bold()
}

pub fn command(name: &str) -> ColoredString {
    name.green()
}

pub fn arg(name: &str) -> ColoredString {
    name.cyan()
}

// === Units ===

/// Thread name as printed next to a unit's output.
pub fn worker(name: &str) -> ColoredString {
    name.cyan()
}

pub fn counter(n: usize) -> ColoredString {
    format!("{:>3}", n).blue().bold()
}

pub fn unit_state(state: HandleState) -> ColoredString {
    let text = format!("{:?}", state).to_lowercase();
    match state {
        HandleState::Completed => text.green(),
        HandleState::Failed => text.red(),
        HandleState::Cancelled => text.yellow(),
        HandleState::Pending | HandleState::Running => text.dimmed(),
    }
}

pub fn separator(width: usize) -> ColoredString {
    "─".repeat(width).dimmed()
}

/// Closing line for a demo: banner plus timing and thread usage.
pub fn print_summary<T>(what: &str, report: &GroupReport<T>) {
    println!();
    match report.error() {
        None => println!("{}", banner_ok(what)),
        Some(err) => println!("{}", banner_fail(what, &err.to_string())),
    }
    println!(
        "  policy {}  elapsed {:.1}ms  peak {}  threads {}",
        report.policy,
        report.elapsed.as_secs_f64() * 1000.0,
        report.peak_concurrency,
        report.workers().len()
    );
    if report.error().is_some() {
        for handle in &report.handles {
            let cause = handle.cause().unwrap_or("");
            println!(
                "  unit {:>3} {} {}",
                handle.index(),
                unit_state(handle.state()),
                cause.dimmed()
            );
        }
    }
}

/// `--json` output: the serializable summary on stdout.
pub fn print_json<T>(report: &GroupReport<T>) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(&report.summary())?);
    Ok(())
}
