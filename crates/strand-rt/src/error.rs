// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Group and configuration errors.

use std::time::Duration;

use thiserror::Error;

/// Why a `TaskGroup::run` call failed. Exactly one is surfaced per run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupError {
    /// Unit at `index` returned an error or panicked.
    #[error("unit {index} failed: {cause}")]
    UnitFailure { index: usize, cause: String },

    /// The group deadline passed before every unit finished.
    #[error("group timed out after {after:?}")]
    Timeout { after: Duration },

    /// The unit was cancelled because a peer failed or the group timed out.
    #[error("cancelled because a peer unit failed")]
    CancelledByPeer,
}

impl GroupError {
    /// Index of the failing unit, if the failure came from a unit.
    pub fn unit_index(&self) -> Option<usize> {
        match self {
            GroupError::UnitFailure { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Invalid or unreadable group configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("pool size must be at least 1")]
    ZeroPoolSize,

    #[error("unknown policy `{0}` (expected `pool`, `unconfined` or `threads`)")]
    UnknownPolicy(String),

    #[error("invalid value `{value}` for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_failure_message_names_index() {
        let err = GroupError::UnitFailure {
            index: 2,
            cause: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "unit 2 failed: boom");
        assert_eq!(err.unit_index(), Some(2));
    }

    #[test]
    fn timeout_has_no_index() {
        let err = GroupError::Timeout {
            after: Duration::from_millis(5),
        };
        assert_eq!(err.unit_index(), None);
        assert!(err.to_string().contains("timed out"));
    }
}
