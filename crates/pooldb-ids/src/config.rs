//! Allocator configuration.

use std::time::Duration;

use crate::error::ConfigError;

/// Configuration for an [`IdAllocator`](crate::IdAllocator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// How many free ids to keep buffered.
    pub stack_size: usize,

    /// Refill as soon as fewer than this many ids remain. Zero refills only
    /// when the stack is found empty. `None` uses a tenth of `stack_size`,
    /// rounded down.
    pub critical_size: Option<usize>,

    /// How long [`get_next`](crate::IdAllocator::get_next) waits for a
    /// refill before giving up.
    pub wait_timeout: Duration,

    /// Upper bound between checks of the stack while waiting.
    pub poll_interval: Duration,

    /// How long an issued id stays reserved against rescans while it is
    /// neither freed nor seen in the column. Callers must persist or free
    /// an id within this time; after it the id may be issued again.
    pub outstanding_lease: Duration,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            stack_size: 100,
            critical_size: None,
            wait_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(1),
            outstanding_lease: Duration::from_secs(60),
        }
    }
}

impl AllocatorConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of ids to keep buffered.
    ///
    /// Unless [`critical_size`](Self::critical_size) is set, the refill
    /// threshold follows at a tenth of this.
    #[must_use]
    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    /// Set the refill threshold.
    #[must_use]
    pub fn critical_size(mut self, size: usize) -> Self {
        self.critical_size = Some(size);
        self
    }

    /// Set the bound on waiting for an id.
    #[must_use]
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Set the interval between checks while waiting.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set how long an issued id stays reserved.
    #[must_use]
    pub fn outstanding_lease(mut self, lease: Duration) -> Self {
        self.outstanding_lease = lease;
        self
    }

    /// The refill threshold in effect.
    #[must_use]
    pub fn critical_threshold(&self) -> usize {
        self.critical_size.unwrap_or(self.stack_size / 10)
    }

    /// Check the configuration for contradictions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stack_size == 0 {
            return Err(ConfigError::ZeroStackSize);
        }
        let critical_size = self.critical_threshold();
        if critical_size >= self.stack_size {
            return Err(ConfigError::CriticalNotBelowStack {
                critical_size,
                stack_size: self.stack_size,
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.outstanding_lease.is_zero() {
            return Err(ConfigError::ZeroOutstandingLease);
        }
        Ok(())
    }
}
