// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Strand CLI - task group demonstrations.

mod args;
mod commands;
mod help;
mod output;

use std::env;
use std::process;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use args::Options;
use commands::{compare, demos, CommandResult};
use help::{print_usage, VERSION};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // Unit output goes to stdout; logs stay on stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn main() {
    output::init();
    init_tracing();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    let command = args[1].as_str();
    let result: CommandResult = match command {
        "hello" => {
            demos::cmd_hello();
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            println!("strand {}", VERSION);
            Ok(())
        }
        "pool" | "threads" | "unconfined" | "resume" | "values" | "scoped" | "compare" => {
            let opts = match Options::parse(&args[2..]) {
                Ok(opts) => opts,
                Err(msg) => {
                    eprintln!("{}: {}", output::error_label(), msg);
                    eprintln!(
                        "{}: run `strand help` for the list of options",
                        output::hint_label()
                    );
                    process::exit(2);
                }
            };
            tracing::debug!(command, ?opts, "running demo");
            match command {
                "pool" => demos::cmd_pool(&opts),
                "threads" => demos::cmd_threads(&opts),
                "unconfined" => demos::cmd_unconfined(&opts),
                "resume" => demos::cmd_resume(&opts),
                "values" => demos::cmd_values(&opts),
                "scoped" => demos::cmd_scoped(&opts),
                _ => compare::cmd_compare(&opts),
            }
        }
        other => {
            eprintln!("{}: unknown command: {}", output::error_label(), other);
            print_usage();
            process::exit(2);
        }
    };

    if let Err(err) = result {
        eprintln!("{}: {}", output::error_label(), err);
        process::exit(1);
    }
}
