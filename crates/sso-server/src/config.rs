//! Server configuration.
//!
//! Configuration is loaded from environment variables with sensible defaults.
//! Ticket lifetimes and registry settings come from [`SsoConfig`]; this module
//! adds the service registry and user table the process is seeded with.

use sso_core::SsoConfig;

/// A service registration: an identifier or `prefix*` pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    /// Service identifier or pattern.
    pub pattern: String,
    /// Whether the service may use proxy authentication.
    pub proxy: bool,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Ticket lifetimes, registry and sweep settings.
    pub sso: SsoConfig,

    /// Services allowed to receive tickets (`SSO_SERVICES`).
    ///
    /// Comma-separated; prefix an entry with `proxy:` to allow proxying.
    pub services: Vec<ServiceEntry>,

    /// Users accepted by the in-memory verifier (`SSO_USERS`, `id:secret` pairs).
    pub users: Vec<(String, String)>,

    /// Log filter.
    pub log_level: String,
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// ## Errors
    ///
    /// Returns an error if a variable holds an unparseable value.
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let sso = SsoConfig::from_env()?;
        let services = std::env::var("SSO_SERVICES")
            .map(|v| parse_services(&v))
            .unwrap_or_default();
        let users = std::env::var("SSO_USERS")
            .map(|v| parse_users(&v))
            .unwrap_or_else(|_| Ok(Vec::new()))?;
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            sso,
            services,
            users,
            log_level,
        })
    }

    /// Creates a configuration for testing.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            sso: SsoConfig {
                cleaner_start_delay: 0,
                cleaner_interval: 1,
                ..SsoConfig::default()
            },
            services: vec![ServiceEntry {
                pattern: "*".to_string(),
                proxy: true,
            }],
            users: vec![("alice".to_string(), "wonderland".to_string())],
            log_level: "debug".to_string(),
        }
    }
}

fn parse_services(value: &str) -> Vec<ServiceEntry> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.strip_prefix("proxy:") {
            Some(pattern) => ServiceEntry {
                pattern: pattern.trim().to_string(),
                proxy: true,
            },
            None => ServiceEntry {
                pattern: entry.to_string(),
                proxy: false,
            },
        })
        .collect()
}

fn parse_users(value: &str) -> anyhow::Result<Vec<(String, String)>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .split_once(':')
                .filter(|(id, _)| !id.is_empty())
                .map(|(id, secret)| (id.to_string(), secret.to_string()))
                .ok_or_else(|| anyhow::anyhow!("SSO_USERS entries must be `id:secret` pairs"))
        })
        .collect()
}
