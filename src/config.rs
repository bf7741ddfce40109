//! Process-wide configuration.
//!
//! Kept deliberately small: everything here can also be set directly on the
//! types it configures (`LoadTable::new`, `Group::new`, ...). This module
//! exists for the common case of wiring those constructors up from the
//! process environment once, at startup, the way the demo binary does.

use std::env;
use std::path::PathBuf;

use crate::error::{Result, WaycaError};

const ENV_MANAGED_THREADS: &str = "WAYCA_MANAGED_THREADS";
const ENV_LOG_LEVEL: &str = "WAYCA_LOG";
const ENV_DRY_RUN: &str = "WAYCA_DRY_RUN";
const ENV_SYNTHETIC_TOPOLOGY: &str = "WAYCA_SYNTHETIC_TOPOLOGY";

/// Process-wide configuration read from the environment at startup.
#[derive(Debug, Clone, Default)]
pub struct WaycaConfig {
    /// Raw `WAYCA_MANAGED_THREADS` map string, if set; see [`crate::managed`].
    pub managed_threads: Option<String>,
    /// `env_logger` filter string, if `WAYCA_LOG` was set. Falls back to
    /// `env_logger`'s own default (`RUST_LOG`) when absent.
    pub log_filter: Option<String>,
    /// When `true`, the demo binary records placements with
    /// [`crate::binder::NullBinder`] instead of touching the OS.
    pub dry_run: bool,
    /// Path to a synthetic-topology descriptor, if `WAYCA_SYNTHETIC_TOPOLOGY`
    /// was set. Demo binary and integration tests only -- the core allocator
    /// never reads this field. See
    /// [`crate::topology::SyntheticTopology::from_descriptor`] for the
    /// descriptor's `cores_per_ccl,ccls_per_node,nodes_per_package,packages`
    /// format.
    pub synthetic_topology_path: Option<PathBuf>,
}

impl WaycaConfig {
    /// Reads configuration from the process environment.
    ///
    /// Never fails on missing variables -- every field has a sensible
    /// default. The only failure mode is a malformed `WAYCA_DRY_RUN` value.
    pub fn from_env() -> Result<Self> {
        let dry_run = match env::var(ENV_DRY_RUN) {
            Ok(value) => parse_bool(&value)?,
            Err(_) => false,
        };

        Ok(Self {
            managed_threads: env::var(ENV_MANAGED_THREADS).ok(),
            log_filter: env::var(ENV_LOG_LEVEL).ok(),
            dry_run,
            synthetic_topology_path: env::var(ENV_SYNTHETIC_TOPOLOGY).ok().map(PathBuf::from),
        })
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(WaycaError::Parse {
            reason: format!("{ENV_DRY_RUN}={other:?} is not a recognised boolean"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("true").unwrap());
        assert!(parse_bool("1").unwrap());
        assert!(parse_bool("YES").unwrap());
        assert!(!parse_bool("false").unwrap());
        assert!(!parse_bool("").unwrap());
        assert!(parse_bool("maybe").is_err());
    }
}
