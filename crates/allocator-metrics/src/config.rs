//! Allocator metrics service configuration.
//!
//! Configuration is loaded from environment variables. Every variable has a
//! default; a value that is present but malformed is rejected rather than
//! replaced by the default.

use crate::actors::{AllocatorOptions, DEFAULT_MAILBOX_CAPACITY};
use crate::catalog::ViolationPolicy;
use crate::registry::{RegistryOptions, DEFAULT_READ_TIMEOUT, DEFAULT_STATS_WINDOW};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default allocator instance ID.
pub const DEFAULT_ALLOCATOR_ID: &str = "allocator";

/// Default resource kinds with cluster-wide gauges.
pub const DEFAULT_RESOURCE_KINDS: &str = "cpus,mem,disk";

/// Default interval between snapshot log lines in the binary.
pub const DEFAULT_SNAPSHOT_INTERVAL_SECONDS: u64 = 60;

/// Allocator metrics service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Instance ID used in logs.
    pub allocator_id: String,

    /// Resource kinds with `total`/`offered_or_allocated` gauges. Fixed for
    /// the lifetime of the process.
    pub resource_kinds: Vec<String>,

    /// Bound on every pull-gauge read (default: 5000 ms).
    pub read_timeout: Duration,

    /// Window kept by allocation-run timers (default: 3600 s).
    pub stats_window: Duration,

    /// Reaction to metrics lifecycle violations (default: abort).
    pub violation_policy: ViolationPolicy,

    /// Allocator mailbox bound (default: 1000).
    pub mailbox_capacity: usize,

    /// Interval between catalog snapshots logged by the binary (default: 60 s).
    pub snapshot_interval: Duration,

    /// Emit logs as JSON (default: false).
    pub json_logs: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allocator_id: DEFAULT_ALLOCATOR_ID.to_string(),
            resource_kinds: split_list(DEFAULT_RESOURCE_KINDS),
            read_timeout: DEFAULT_READ_TIMEOUT,
            stats_window: DEFAULT_STATS_WINDOW,
            violation_policy: ViolationPolicy::default(),
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            snapshot_interval: Duration::from_secs(DEFAULT_SNAPSHOT_INTERVAL_SECONDS),
            json_logs: false,
        }
    }
}

impl FromStr for ViolationPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(ViolationPolicy::Abort),
            "report" => Ok(ViolationPolicy::Report),
            other => Err(ConfigError::InvalidValue(format!(
                "ALLOCATOR_METRICS_VIOLATION_POLICY must be 'abort' or 'report', got '{other}'"
            ))),
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Parse a positive integer variable, falling back to `default` when unset.
fn positive<T>(vars: &HashMap<String, String>, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialEq + Default,
    T::Err: std::fmt::Display,
{
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: T = value_str.trim().parse().map_err(|e| {
        ConfigError::InvalidValue(format!(
            "{name} must be a valid positive integer, got '{value_str}': {e}"
        ))
    })?;

    if value == T::default() {
        return Err(ConfigError::InvalidValue(format!(
            "{name} must be greater than 0"
        )));
    }

    Ok(value)
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a malformed value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a malformed value.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let allocator_id = vars
            .get("ALLOCATOR_ID")
            .cloned()
            .unwrap_or_else(|| DEFAULT_ALLOCATOR_ID.to_string());

        let resource_kinds = split_list(
            vars.get("ALLOCATOR_RESOURCE_KINDS")
                .map_or(DEFAULT_RESOURCE_KINDS, String::as_str),
        );
        if resource_kinds.is_empty() {
            return Err(ConfigError::InvalidValue(
                "ALLOCATOR_RESOURCE_KINDS must name at least one resource".to_string(),
            ));
        }

        #[allow(clippy::cast_possible_truncation)]
        let read_timeout_ms = positive(
            vars,
            "ALLOCATOR_METRICS_READ_TIMEOUT_MS",
            DEFAULT_READ_TIMEOUT.as_millis() as u64,
        )?;

        let stats_window_seconds = positive(
            vars,
            "ALLOCATOR_STATS_WINDOW_SECONDS",
            DEFAULT_STATS_WINDOW.as_secs(),
        )?;

        let violation_policy = match vars.get("ALLOCATOR_METRICS_VIOLATION_POLICY") {
            Some(value) => value.parse::<ViolationPolicy>()?,
            None => ViolationPolicy::default(),
        };

        let mailbox_capacity = positive(
            vars,
            "ALLOCATOR_MAILBOX_CAPACITY",
            DEFAULT_MAILBOX_CAPACITY,
        )?;

        let snapshot_interval_seconds = positive(
            vars,
            "ALLOCATOR_SNAPSHOT_INTERVAL_SECONDS",
            DEFAULT_SNAPSHOT_INTERVAL_SECONDS,
        )?;

        let json_logs = match vars.get("ALLOCATOR_JSON_LOGS").map(|v| v.trim().to_ascii_lowercase()) {
            None => false,
            Some(v) if v == "true" || v == "1" => true,
            Some(v) if v == "false" || v == "0" => false,
            Some(v) => {
                return Err(ConfigError::InvalidValue(format!(
                    "ALLOCATOR_JSON_LOGS must be 'true' or 'false', got '{v}'"
                )))
            }
        };

        Ok(Config {
            allocator_id,
            resource_kinds,
            read_timeout: Duration::from_millis(read_timeout_ms),
            stats_window: Duration::from_secs(stats_window_seconds),
            violation_policy,
            mailbox_capacity,
            snapshot_interval: Duration::from_secs(snapshot_interval_seconds),
            json_logs,
        })
    }

    /// Options for spawning the allocator actor.
    #[must_use]
    pub fn allocator_options(&self) -> AllocatorOptions {
        AllocatorOptions {
            allocator_id: self.allocator_id.clone(),
            resource_kinds: self.resource_kinds.clone(),
            registry: RegistryOptions {
                policy: self.violation_policy,
                read_timeout: self.read_timeout,
                stats_window: self.stats_window,
            },
            mailbox_capacity: self.mailbox_capacity,
        }
    }
}
