//! Pool configuration options

use crate::errors::{PoolError, PoolResult};
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What `acquire` does when the factory fails to create a resource on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CreationErrorPolicy {
    /// Treat the failure like exhaustion: wait (if configured) or report
    /// `ResourceUnavailable`
    #[default]
    Swallow,

    /// Report `CreationFailed` to the caller immediately
    Surface,
}

/// Configuration for resource pool behavior
///
/// # Examples
///
/// ```
/// use respool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_capacity(8)
///     .with_overflow(2)
///     .with_wait_timeout(Duration::from_millis(250));
///
/// assert_eq!(config.capacity, 8);
/// assert_eq!(config.ceiling(), 10);
/// assert_eq!(config.wait_timeout, Some(Duration::from_millis(250)));
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolConfiguration {
    /// Name used in log fields and metric labels
    pub name: String,

    /// Number of resources the pool pre-creates and retains while idle
    pub capacity: usize,

    /// Extra resources that may be created beyond `capacity` to absorb bursts.
    /// These are destroyed on release instead of being kept idle.
    pub overflow: usize,

    /// How long `acquire` blocks at the ceiling; `None` or zero fails at once
    pub wait_timeout: Option<Duration>,

    /// Whether checked-out resources are tracked so `release` can reject
    /// leases that are not in use by this pool
    pub track_in_use: bool,

    /// Behavior when an on-demand creation fails inside `acquire`
    pub creation_error_policy: CreationErrorPolicy,

    /// Whether to create `capacity` resources during construction
    pub warmup: bool,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            name: "pool".to_string(),
            capacity: 10,
            overflow: 0,
            wait_timeout: None,
            track_in_use: true,
            creation_error_policy: CreationErrorPolicy::Swallow,
            warmup: true,
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pool name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the base capacity
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the overflow allowance
    pub fn with_overflow(mut self, overflow: usize) -> Self {
        self.overflow = overflow;
        self
    }

    /// Block up to `timeout` in `acquire` when the pool is exhausted
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    /// Enable or disable in-use tracking
    pub fn with_tracking(mut self, enabled: bool) -> Self {
        self.track_in_use = enabled;
        self
    }

    /// Choose how on-demand creation failures are reported
    pub fn with_creation_error_policy(mut self, policy: CreationErrorPolicy) -> Self {
        self.creation_error_policy = policy;
        self
    }

    /// Enable or disable pre-warming at construction
    pub fn with_warmup(mut self, enabled: bool) -> Self {
        self.warmup = enabled;
        self
    }

    /// Hard upper bound on live resources
    pub fn ceiling(&self) -> usize {
        self.capacity.saturating_add(self.overflow)
    }

    /// The wait deadline, if waiting is enabled at all
    pub(crate) fn effective_wait(&self) -> Option<Duration> {
        self.wait_timeout.filter(|timeout| !timeout.is_zero())
    }

    /// Check the configuration before a pool is built from it
    ///
    /// ```
    /// use respool::{PoolConfiguration, PoolError};
    ///
    /// let err = PoolConfiguration::new().with_capacity(0).validate().unwrap_err();
    /// assert!(matches!(err, PoolError::InvalidConfiguration(_)));
    /// ```
    pub fn validate(&self) -> PoolResult<()> {
        if self.capacity == 0 {
            return Err(PoolError::InvalidConfiguration(
                "capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
