//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services. Request
//! handling never reads process-wide environment variables.

use crate::constants::{
    DEFAULT_AVERAGE_CONSULTATION_MINUTES, DEFAULT_MAX_CONFLICT_RETRIES, DEFAULT_STORE_TIMEOUT_MS,
};
use crate::{QueueError, QueueResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// How many patients a department may have in `serving` at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServingPolicy {
    /// One clinician per department: call-next is refused while someone is being served.
    #[default]
    Single,
    /// Several clinicians draw from one queue; each patient is still claimed exactly once.
    Multiple,
}

impl fmt::Display for ServingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServingPolicy::Single => write!(f, "single"),
            ServingPolicy::Multiple => write!(f, "multiple"),
        }
    }
}

impl FromStr for ServingPolicy {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(ServingPolicy::Single),
            "multiple" => Ok(ServingPolicy::Multiple),
            other => Err(QueueError::InvalidInput(format!(
                "unknown serving policy '{}' (expected 'single' or 'multiple')",
                other
            ))),
        }
    }
}

/// Which datastore backs the services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    Memory,
    #[default]
    File,
}

impl FromStr for StoreKind {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "file" => Ok(StoreKind::File),
            other => Err(QueueError::InvalidInput(format!(
                "unknown store kind '{}' (expected 'memory' or 'file')",
                other
            ))),
        }
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    average_consultation_minutes: u32,
    serving_policy: ServingPolicy,
    max_conflict_retries: u32,
    store_timeout: Duration,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::InvalidInput` if any numeric setting is zero.
    pub fn new(
        data_dir: PathBuf,
        average_consultation_minutes: u32,
        serving_policy: ServingPolicy,
        max_conflict_retries: u32,
        store_timeout: Duration,
    ) -> QueueResult<Self> {
        if average_consultation_minutes == 0 {
            return Err(QueueError::InvalidInput(
                "average_consultation_minutes must be greater than zero".into(),
            ));
        }
        if max_conflict_retries == 0 {
            return Err(QueueError::InvalidInput(
                "max_conflict_retries must be greater than zero".into(),
            ));
        }
        if store_timeout.is_zero() {
            return Err(QueueError::InvalidInput(
                "store_timeout must be greater than zero".into(),
            ));
        }

        Ok(Self {
            data_dir,
            average_consultation_minutes,
            serving_policy,
            max_conflict_retries,
            store_timeout,
        })
    }

    /// Configuration with every default applied, rooted at `data_dir`.
    pub fn with_defaults(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            average_consultation_minutes: DEFAULT_AVERAGE_CONSULTATION_MINUTES,
            serving_policy: ServingPolicy::default(),
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
        }
    }

    /// Returns a copy of this configuration using a different serving policy.
    pub fn with_serving_policy(mut self, serving_policy: ServingPolicy) -> Self {
        self.serving_policy = serving_policy;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn average_consultation_minutes(&self) -> u32 {
        self.average_consultation_minutes
    }

    pub fn serving_policy(&self) -> ServingPolicy {
        self.serving_policy
    }

    pub fn max_conflict_retries(&self) -> u32 {
        self.max_conflict_retries
    }

    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_positive<T>(name: &str, value: Option<String>, default: T) -> QueueResult<T>
where
    T: FromStr + PartialOrd + Default,
{
    match non_blank(value) {
        None => Ok(default),
        Some(v) => match v.parse::<T>() {
            Ok(parsed) if parsed > T::default() => Ok(parsed),
            _ => Err(QueueError::InvalidInput(format!(
                "{} must be a positive integer, got '{}'",
                name, v
            ))),
        },
    }
}

/// Parse the average consultation length from an optional string value.
///
/// If `value` is `None` or blank, returns the default of 10 minutes.
pub fn consultation_minutes_from_env_value(value: Option<String>) -> QueueResult<u32> {
    parse_positive(
        "average consultation minutes",
        value,
        DEFAULT_AVERAGE_CONSULTATION_MINUTES,
    )
}

/// Parse the maximum number of retries for contended claims from an optional string value.
pub fn max_conflict_retries_from_env_value(value: Option<String>) -> QueueResult<u32> {
    parse_positive("max conflict retries", value, DEFAULT_MAX_CONFLICT_RETRIES)
}

/// Parse the per-call datastore timeout (milliseconds) from an optional string value.
pub fn store_timeout_from_env_value(value: Option<String>) -> QueueResult<Duration> {
    parse_positive("store timeout", value, DEFAULT_STORE_TIMEOUT_MS).map(Duration::from_millis)
}

/// Parse the serving policy from an optional string value. Defaults to `single`.
pub fn serving_policy_from_env_value(value: Option<String>) -> QueueResult<ServingPolicy> {
    non_blank(value)
        .map(|v| v.parse::<ServingPolicy>())
        .transpose()
        .map(Option::unwrap_or_default)
}

/// Parse the datastore kind from an optional string value. Defaults to `file`.
pub fn store_kind_from_env_value(value: Option<String>) -> QueueResult<StoreKind> {
    non_blank(value)
        .map(|v| v.parse::<StoreKind>())
        .transpose()
        .map(Option::unwrap_or_default)
}
