// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Command-line options shared by every demo command.

use std::path::PathBuf;
use std::time::Duration;

use strand_rt::{ConfigError, ConfigOverrides, GroupConfig};

/// Parsed flags. Unset fields fall back to the command's own defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    pub units: Option<usize>,
    pub workers: Option<usize>,
    pub delay_ms: Option<u64>,
    pub deadline_ms: Option<u64>,
    pub config: Option<PathBuf>,
    pub json: bool,
}

impl Options {
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let mut opts = Options::default();
        let mut iter = args.iter();
        while let Some(flag) = iter.next() {
            match flag.as_str() {
                "--json" => opts.json = true,
                "--units" | "-n" => opts.units = Some(number(flag, iter.next())?),
                "--workers" | "-w" => opts.workers = Some(number(flag, iter.next())?),
                "--delay-ms" => opts.delay_ms = Some(number(flag, iter.next())?),
                "--deadline-ms" => opts.deadline_ms = Some(number(flag, iter.next())?),
                "--config" | "-c" => match iter.next() {
                    Some(path) => opts.config = Some(PathBuf::from(path)),
                    None => return Err(format!("{} expects a file path", flag)),
                },
                other => return Err(format!("unknown option: {}", other)),
            }
        }
        Ok(opts)
    }

    pub fn units_or(&self, default: usize) -> usize {
        self.units.unwrap_or(default)
    }

    pub fn delay_or(&self, default_ms: u64) -> Duration {
        Duration::from_millis(self.delay_ms.unwrap_or(default_ms))
    }

    /// Layer defaults, the config file, `STRAND_*` variables and flags.
    ///
    /// `policy` forces the policy family the command demonstrates; the
    /// pool size still comes from whichever layer set it last.
    pub fn group_config(&self, policy: Option<&str>) -> Result<GroupConfig, ConfigError> {
        self.group_config_with(policy, |key| std::env::var(key).ok())
    }

    fn group_config_with<F>(&self, policy: Option<&str>, lookup: F) -> Result<GroupConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = GroupConfig::default();
        if let Some(path) = &self.config {
            config.load_file(path)?;
        }
        config.apply_vars(lookup)?;
        config.apply(&ConfigOverrides {
            policy: policy.map(str::to_string),
            pool_size: self.workers,
            deadline_ms: self.deadline_ms,
        })?;
        Ok(config)
    }
}

fn number<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> Result<T, String> {
    let value = value.ok_or_else(|| format!("{} expects a number", flag))?;
    value
        .parse()
        .map_err(|_| format!("{} expects a number, got '{}'", flag, value))
}
