// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Group configuration.
//!
//! One policy (with its pool size) and one optional deadline. Values are
//! layered: defaults, then a JSON file, then `STRAND_*` environment
//! variables, then whatever the caller sets explicitly.

use std::fmt;
use std::path::Path;
use std::thread;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Pool size used when the machine won't tell us its parallelism.
const FALLBACK_POOL_SIZE: usize = 4;

/// Where a group's units execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// `n` worker threads shared by all units. Suspended units release
    /// their worker.
    BoundedPool(usize),
    /// Units start on the calling thread and resume on whichever thread
    /// wakes them.
    Unconfined,
    /// One OS thread per unit. Suspension parks the thread.
    ThreadPerUnit,
}

impl Policy {
    /// Bounded pool sized to the available CPU parallelism.
    pub fn default_pool() -> Self {
        let n = thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(FALLBACK_POOL_SIZE);
        Policy::BoundedPool(n)
    }

    /// Short name used on the command line and in config files.
    pub fn name(&self) -> &'static str {
        match self {
            Policy::BoundedPool(_) => "pool",
            Policy::Unconfined => "unconfined",
            Policy::ThreadPerUnit => "threads",
        }
    }

    /// Parse a policy name. `pool_size` only matters for `pool`; when it
    /// is absent the pool is sized from available parallelism.
    pub fn parse(name: &str, pool_size: Option<usize>) -> Result<Self, ConfigError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "pool" | "bounded" | "bounded_pool" => Ok(match pool_size {
                Some(n) => Policy::BoundedPool(n),
                None => Policy::default_pool(),
            }),
            "unconfined" => Ok(Policy::Unconfined),
            "threads" | "thread_per_unit" => Ok(Policy::ThreadPerUnit),
            other => Err(ConfigError::UnknownPolicy(other.to_string())),
        }
    }

    pub fn pool_size(&self) -> Option<usize> {
        match self {
            Policy::BoundedPool(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::BoundedPool(n) => write!(f, "pool({})", n),
            Policy::Unconfined => write!(f, "unconfined"),
            Policy::ThreadPerUnit => write!(f, "threads"),
        }
    }
}

/// Configuration for one `TaskGroup`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupConfig {
    pub policy: Policy,
    /// After this long the group fails with `Timeout` and cancels its units.
    pub deadline: Option<Duration>,
}

impl GroupConfig {
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.policy == Policy::BoundedPool(0) {
            return Err(ConfigError::ZeroPoolSize);
        }
        Ok(())
    }

    /// Layer a JSON config file over this configuration.
    pub fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let overrides: ConfigOverrides =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        self.apply(&overrides)
    }

    /// Layer `STRAND_POLICY`, `STRAND_POOL_SIZE` and `STRAND_DEADLINE_MS`.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Same as `apply_env`, reading variables through `lookup`.
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let overrides = ConfigOverrides {
            policy: lookup("STRAND_POLICY"),
            pool_size: parse_var(&lookup, "STRAND_POOL_SIZE")?,
            deadline_ms: parse_var(&lookup, "STRAND_DEADLINE_MS")?,
        };
        self.apply(&overrides)
    }

    /// Apply a set of overrides. Unset fields leave the current value.
    pub fn apply(&mut self, overrides: &ConfigOverrides) -> Result<(), ConfigError> {
        if let Some(name) = &overrides.policy {
            let size = overrides.pool_size.or(self.policy.pool_size());
            self.policy = Policy::parse(name, size)?;
        } else if let (Some(n), Policy::BoundedPool(_)) = (overrides.pool_size, self.policy) {
            self.policy = Policy::BoundedPool(n);
        }
        if let Some(ms) = overrides.deadline_ms {
            self.deadline = if ms == 0 {
                None
            } else {
                Some(Duration::from_millis(ms))
            };
        }
        self.validate()
    }
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self::new(Policy::default_pool())
    }
}

/// Partial configuration, as read from a file, the environment or flags.
/// A `deadline_ms` of 0 clears the deadline.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverrides {
    pub policy: Option<String>,
    pub pool_size: Option<usize>,
    pub deadline_ms: Option<u64>,
}

fn parse_var<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_pool_is_nonempty() {
        match Policy::default_pool() {
            Policy::BoundedPool(n) => assert!(n >= 1),
            other => panic!("expected pool, got {:?}", other),
        }
    }

    #[test]
    fn parse_policy_names() {
        assert_eq!(Policy::parse("pool", Some(3)).unwrap(), Policy::BoundedPool(3));
        assert_eq!(Policy::parse("Unconfined", None).unwrap(), Policy::Unconfined);
        assert_eq!(Policy::parse("threads", None).unwrap(), Policy::ThreadPerUnit);
        assert!(matches!(
            Policy::parse("fibers", None),
            Err(ConfigError::UnknownPolicy(_))
        ));
    }

    #[test]
    fn zero_pool_rejected() {
        let cfg = GroupConfig::new(Policy::BoundedPool(0));
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroPoolSize)));
    }

    #[test]
    fn env_layer_overrides_policy_and_deadline() {
        let mut cfg = GroupConfig::new(Policy::BoundedPool(2));
        cfg.apply_vars(vars(&[
            ("STRAND_POLICY", "unconfined"),
            ("STRAND_DEADLINE_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(cfg.policy, Policy::Unconfined);
        assert_eq!(cfg.deadline, Some(Duration::from_millis(250)));
    }

    #[test]
    fn pool_size_alone_resizes_pool() {
        let mut cfg = GroupConfig::new(Policy::BoundedPool(2));
        cfg.apply_vars(vars(&[("STRAND_POOL_SIZE", "8")])).unwrap();
        assert_eq!(cfg.policy, Policy::BoundedPool(8));
    }

    #[test]
    fn pool_size_ignored_for_other_policies() {
        let mut cfg = GroupConfig::new(Policy::Unconfined);
        cfg.apply_vars(vars(&[("STRAND_POOL_SIZE", "8")])).unwrap();
        assert_eq!(cfg.policy, Policy::Unconfined);
    }

    #[test]
    fn bad_env_value_is_reported() {
        let mut cfg = GroupConfig::default();
        let err = cfg
            .apply_vars(vars(&[("STRAND_POOL_SIZE", "lots")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key: "STRAND_POOL_SIZE", .. }
        ));
    }

    #[test]
    fn zero_deadline_clears() {
        let mut cfg = GroupConfig::default().with_deadline(Duration::from_secs(1));
        cfg.apply(&ConfigOverrides {
            deadline_ms: Some(0),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(cfg.deadline, None);
    }

    #[test]
    fn json_overrides_parse() {
        let ov: ConfigOverrides =
            serde_json::from_str(r#"{"policy": "pool", "pool_size": 4, "deadline_ms": 100}"#)
                .unwrap();
        let mut cfg = GroupConfig::new(Policy::Unconfined);
        cfg.apply(&ov).unwrap();
        assert_eq!(cfg.policy, Policy::BoundedPool(4));
        assert_eq!(cfg.deadline, Some(Duration::from_millis(100)));
    }

    #[test]
    fn json_rejects_unknown_keys() {
        let parsed = serde_json::from_str::<ConfigOverrides>(r#"{"workers": 4}"#);
        assert!(parsed.is_err());
    }
}
