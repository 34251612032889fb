//! Authority configuration.
//!
//! Configuration is loaded from environment variables with sensible defaults.
//! All lifetimes are expressed in seconds, the registry timeout in milliseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error raised when an environment variable holds an unparsable value.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The variable is set but could not be parsed.
    #[error("invalid value for {name}: {value:?}")]
    Invalid {
        /// Environment variable name.
        name: &'static str,
        /// Raw value found in the environment.
        value: String,
    },
}

/// Configuration for ticket lifetimes, the registry and the eviction sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsoConfig {
    /// Absolute lifetime of a ticket-granting ticket, in seconds.
    pub tgt_max_time_to_live: u64,
    /// Idle timeout of a ticket-granting ticket, in seconds.
    pub tgt_time_to_idle: u64,
    /// Absolute lifetime of a "remember me" session, in seconds.
    pub tgt_remember_me_time_to_live: u64,

    /// Lifetime of a service ticket, in seconds.
    pub st_time_to_live: u64,
    /// Number of times a service ticket may be used.
    pub st_number_of_uses: u32,

    /// Absolute lifetime of a proxy-granting ticket, in seconds.
    pub pgt_max_time_to_live: u64,
    /// Idle timeout of a proxy-granting ticket, in seconds.
    pub pgt_time_to_idle: u64,

    /// Lifetime of a proxy ticket, in seconds.
    pub pt_time_to_live: u64,
    /// Number of times a proxy ticket may be used.
    pub pt_number_of_uses: u32,

    /// Absolute lifetime of a surrogate (impersonation) session, in seconds.
    pub surrogate_time_to_live: u64,
    /// Idle timeout of a surrogate session, in seconds.
    pub surrogate_time_to_idle: u64,

    /// Upper bound on any single storage call, in milliseconds.
    pub registry_operation_timeout_ms: u64,
    /// Compare-and-swap attempts before an update gives up.
    pub registry_update_retries: u32,

    /// Whether the background eviction sweep runs.
    pub cleaner_enabled: bool,
    /// Interval between sweeps, in seconds.
    pub cleaner_interval: u64,
    /// Delay before the first sweep, in seconds.
    pub cleaner_start_delay: u64,

    /// Optional node suffix appended to generated ticket ids.
    pub ticket_id_suffix: Option<String>,
}

impl SsoConfig {
    /// Loads configuration from environment variables.
    ///
    /// A `.env` file in the working directory is honored when present.
    ///
    /// ## Errors
    ///
    /// Returns an error if a variable is set to a value that cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Ok(Self {
            tgt_max_time_to_live: env_or("SSO_TGT_MAX_TTL", defaults.tgt_max_time_to_live)?,
            tgt_time_to_idle: env_or("SSO_TGT_TTI", defaults.tgt_time_to_idle)?,
            tgt_remember_me_time_to_live: env_or(
                "SSO_TGT_REMEMBER_ME_TTL",
                defaults.tgt_remember_me_time_to_live,
            )?,
            st_time_to_live: env_or("SSO_ST_TTL", defaults.st_time_to_live)?,
            st_number_of_uses: env_or("SSO_ST_USES", defaults.st_number_of_uses)?,
            pgt_max_time_to_live: env_or("SSO_PGT_MAX_TTL", defaults.pgt_max_time_to_live)?,
            pgt_time_to_idle: env_or("SSO_PGT_TTI", defaults.pgt_time_to_idle)?,
            pt_time_to_live: env_or("SSO_PT_TTL", defaults.pt_time_to_live)?,
            pt_number_of_uses: env_or("SSO_PT_USES", defaults.pt_number_of_uses)?,
            surrogate_time_to_live: env_or("SSO_SURROGATE_TTL", defaults.surrogate_time_to_live)?,
            surrogate_time_to_idle: env_or("SSO_SURROGATE_TTI", defaults.surrogate_time_to_idle)?,
            registry_operation_timeout_ms: env_or(
                "SSO_REGISTRY_TIMEOUT_MS",
                defaults.registry_operation_timeout_ms,
            )?,
            registry_update_retries: env_or(
                "SSO_REGISTRY_UPDATE_RETRIES",
                defaults.registry_update_retries,
            )?,
            cleaner_enabled: env_or("SSO_CLEANER_ENABLED", defaults.cleaner_enabled)?,
            cleaner_interval: env_or("SSO_CLEANER_INTERVAL", defaults.cleaner_interval)?,
            cleaner_start_delay: env_or("SSO_CLEANER_START_DELAY", defaults.cleaner_start_delay)?,
            ticket_id_suffix: std::env::var("SSO_TICKET_SUFFIX")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        })
    }

    /// Returns the storage call timeout.
    #[must_use]
    pub const fn registry_operation_timeout(&self) -> Duration {
        Duration::from_millis(self.registry_operation_timeout_ms)
    }

    /// Returns the interval between eviction sweeps.
    #[must_use]
    pub const fn cleaner_interval_duration(&self) -> Duration {
        Duration::from_secs(self.cleaner_interval)
    }

    /// Returns the delay before the first eviction sweep.
    #[must_use]
    pub const fn cleaner_start_delay_duration(&self) -> Duration {
        Duration::from_secs(self.cleaner_start_delay)
    }
}

impl Default for SsoConfig {
    fn default() -> Self {
        Self {
            tgt_max_time_to_live: 28_800, // 8 hours
            tgt_time_to_idle: 7_200,      // 2 hours
            tgt_remember_me_time_to_live: 1_209_600, // 14 days
            st_time_to_live: 10,
            st_number_of_uses: 1,
            pgt_max_time_to_live: 28_800,
            pgt_time_to_idle: 7_200,
            pt_time_to_live: 10,
            pt_number_of_uses: 1,
            surrogate_time_to_live: 1_800,
            surrogate_time_to_idle: 300,
            registry_operation_timeout_ms: 2_000,
            registry_update_retries: 8,
            cleaner_enabled: true,
            cleaner_interval: 120,
            cleaner_start_delay: 20,
            ticket_id_suffix: None,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}
