//! Pool configuration.

use std::time::Duration;

use crate::error::ConfigError;

/// Configuration for a [`Pool`](crate::Pool).
///
/// The default pool grows without bound: a new item is created whenever an
/// acquire finds no idle item. Setting [`max_size`](Self::max_size) caps the
/// number of items and makes acquires wait for a release instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Items created at build time and parked idle.
    pub min_idle: usize,

    /// Upper bound on items, or `None` for unbounded growth.
    pub max_size: Option<usize>,

    /// How long an acquire may wait for capacity when `max_size` is set.
    /// `None` waits indefinitely.
    pub wait_timeout: Option<Duration>,

    /// How long constructing a new item may take. `None` waits indefinitely.
    pub create_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_idle: 0,
            max_size: None,
            wait_timeout: Some(Duration::from_secs(30)),
            create_timeout: None,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of items created at build time.
    #[must_use]
    pub fn min_idle(mut self, count: usize) -> Self {
        self.min_idle = count;
        self
    }

    /// Cap the number of items.
    #[must_use]
    pub fn max_size(mut self, max: usize) -> Self {
        self.max_size = Some(max);
        self
    }

    /// Remove the cap on the number of items.
    #[must_use]
    pub fn unbounded(mut self) -> Self {
        self.max_size = None;
        self
    }

    /// Set the capacity wait bound.
    #[must_use]
    pub fn wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Set the item construction bound.
    #[must_use]
    pub fn create_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.create_timeout = timeout;
        self
    }

    /// Check the configuration for contradictions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(max_size) = self.max_size {
            if max_size == 0 {
                return Err(ConfigError::ZeroMaxSize);
            }
            if self.min_idle > max_size {
                return Err(ConfigError::MinIdleAboveMax {
                    min_idle: self.min_idle,
                    max_size,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unbounded() {
        let config = PoolConfig::default();
        assert_eq!(config.max_size, None);
        assert_eq!(config.min_idle, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        assert_eq!(
            PoolConfig::new().max_size(0).validate(),
            Err(ConfigError::ZeroMaxSize)
        );
        assert_eq!(
            PoolConfig::new().min_idle(5).max_size(2).validate(),
            Err(ConfigError::MinIdleAboveMax {
                min_idle: 5,
                max_size: 2
            })
        );
        assert!(PoolConfig::new().min_idle(5).validate().is_ok());
        assert!(PoolConfig::new().min_idle(2).max_size(2).validate().is_ok());
    }
}
