//! Engine configuration.
//!
//! Strongly-typed configuration loaded via the `config` crate from
//! environment variables (prefix `CASEFLOW`, `__` separator), e.g.
//! `CASEFLOW__FORM_LEASE_MINUTES=30`.

use serde::Deserialize;

/// Tunable engine parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Form-lock lease duration in minutes.
    #[serde(default = "default_form_lease_minutes")]
    pub form_lease_minutes: i64,

    /// Interval between due-timer sweeps, in seconds.
    #[serde(default = "default_timer_sweep_interval_seconds")]
    pub timer_sweep_interval_seconds: u64,

    /// Interval between expired-lock sweeps, in seconds.
    #[serde(default = "default_lock_sweep_interval_seconds")]
    pub lock_sweep_interval_seconds: u64,
}

fn default_form_lease_minutes() -> i64 {
    caseflow_task::DEFAULT_LEASE_MINUTES
}

fn default_timer_sweep_interval_seconds() -> u64 {
    30
}

fn default_lock_sweep_interval_seconds() -> u64 {
    300
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            form_lease_minutes: default_form_lease_minutes(),
            timer_sweep_interval_seconds: default_timer_sweep_interval_seconds(),
            lock_sweep_interval_seconds: default_lock_sweep_interval_seconds(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if present configuration values are invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("CASEFLOW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Returns the form lease as a duration.
    #[must_use]
    pub fn form_lease(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.form_lease_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_has_correct_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.form_lease_minutes, 15);
        assert_eq!(config.timer_sweep_interval_seconds, 30);
        assert_eq!(config.form_lease(), chrono::Duration::minutes(15));
    }
}
