// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Help text for CLI commands.

use crate::output;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn print_usage() {
    println!(
        "{} {} - Task groups on pools, threads and the caller",
        output::title("Strand"),
        output::version(VERSION)
    );
    println!();
    println!(
        "{}: {} {} {}",
        output::section_header("Usage"),
        output::command("strand"),
        output::arg("<command>"),
        output::arg("[options]")
    );
    println!();
    println!("{}", output::section_header("Demos:"));
    println!("  {}         Print the greeting", output::command("hello"));
    println!("  {}          Units on a bounded worker pool (14 x 10ms)", output::command("pool"));
    println!("  {}       One OS thread per unit (14)", output::command("threads"));
    println!("  {}    Units on the calling thread (10)", output::command("unconfined"));
    println!("  {}        Worker before and after a suspension (10 x 10ms)", output::command("resume"));
    println!("  {}        Two units returning values (1s and 2s)", output::command("values"));
    println!("  {}        Sequential single-unit groups (20 x 100ms)", output::command("scoped"));
    println!("  {}       Same workload on every policy", output::command("compare"));
    println!("  {}          Show this help", output::command("help"));
    println!("  {}       Show version", output::command("version"));
    println!();
    println!("{}", output::section_header("Options:"));
    println!("  {} {}        Number of units", output::arg("--units"), output::arg("<n>"));
    println!("  {} {}      Pool size for pool demos", output::arg("--workers"), output::arg("<n>"));
    println!("  {} {}     Suspension length per unit", output::arg("--delay-ms"), output::arg("<ms>"));
    println!("  {} {}  Fail the group after this long (0 = none)", output::arg("--deadline-ms"), output::arg("<ms>"));
    println!("  {} {}     JSON file with policy, pool_size, deadline_ms", output::arg("--config"), output::arg("<file>"));
    println!("  {}               Print the group report as JSON", output::arg("--json"));
    println!();
    println!("{}", output::section_header("Environment:"));
    println!("  {}  Default policy (pool, unconfined, threads)", output::arg("STRAND_POLICY"));
    println!("  {}  Default pool size", output::arg("STRAND_POOL_SIZE"));
    println!("  {}  Default deadline", output::arg("STRAND_DEADLINE_MS"));
    println!("  {}  Log filter, e.g. strand_rt=debug", output::arg("RUST_LOG"));
}
