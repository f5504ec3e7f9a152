use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_CHECK_INTERVAL_MINUTES: u64 = 5;
pub const DEFAULT_DELIVERY_PACING_MS: u64 = 1000;
pub const DEFAULT_MAX_CONCURRENT_TENANTS: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("check interval must be at least one minute")]
    ZeroInterval,
    #[error("at least one tenant must be allowed to run at a time")]
    ZeroConcurrency,
}

/// Runtime knobs for the cycle, the scheduler and the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub check_interval: Duration,
    /// Minimum gap between two messages to the same tenant.
    pub delivery_pacing: Duration,
    pub max_concurrent_tenants: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(DEFAULT_CHECK_INTERVAL_MINUTES * 60),
            delivery_pacing: Duration::from_millis(DEFAULT_DELIVERY_PACING_MS),
            max_concurrent_tenants: DEFAULT_MAX_CONCURRENT_TENANTS,
        }
    }
}

impl EngineSettings {
    /// Builds settings from the raw units used in configuration files.
    ///
    /// # Errors
    /// Rejects a zero interval or a zero concurrency cap. Zero pacing is
    /// allowed and disables the delay between messages.
    pub fn from_parts(
        check_interval_minutes: u64,
        delivery_pacing_ms: u64,
        max_concurrent_tenants: usize,
    ) -> Result<Self, ConfigError> {
        if check_interval_minutes == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        let settings = Self {
            check_interval: Duration::from_secs(check_interval_minutes.saturating_mul(60)),
            delivery_pacing: Duration::from_millis(delivery_pacing_ms),
            max_concurrent_tenants,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.check_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.max_concurrent_tenants == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = EngineSettings::default();
        assert_eq!(settings.check_interval, Duration::from_secs(300));
        assert_eq!(settings.delivery_pacing, Duration::from_secs(1));
        assert_eq!(settings.max_concurrent_tenants, 4);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn zero_values_are_rejected() {
        assert_eq!(EngineSettings::from_parts(0, 1000, 4), Err(ConfigError::ZeroInterval));
        assert_eq!(EngineSettings::from_parts(5, 1000, 0), Err(ConfigError::ZeroConcurrency));
        assert!(EngineSettings::from_parts(1, 0, 1).is_ok());
    }
}
