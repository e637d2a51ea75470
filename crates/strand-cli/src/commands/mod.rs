// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! CLI command implementations.

pub mod compare;
pub mod demos;

use strand_rt::{ConfigError, GroupError, GroupReport};
use thiserror::Error;

use crate::args::Options;
use crate::output;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Group(#[from] GroupError),
    #[error("encoding report: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CommandResult = Result<(), CommandError>;

/// Print the report the way `opts` asks for and surface the group's error.
pub(crate) fn finish<T>(what: &str, report: &GroupReport<T>, opts: &Options) -> CommandResult {
    if opts.json {
        output::print_json(report)?;
    } else {
        output::print_summary(what, report);
    }
    match report.error() {
        Some(err) => Err(err.clone().into()),
        None => Ok(()),
    }
}
