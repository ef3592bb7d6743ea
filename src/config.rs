use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::crypto::cipher::CipherSuite;
use crate::middleware_layer::auto_login::{DEFAULT_EXCLUDED_PREFIXES, DEFAULT_SIGN_IN_PAGE};
use crate::repositories::directory::OutagePolicy;

/// The longest accepted directory session lifetime: ten years.
pub const MAX_SESSION_MAX_AGE_MS: i64 = 10 * 366 * 24 * 60 * 60 * 1000;

/// The longest accepted container login session.
pub const MAX_SESSION_DURATION_DAYS: i64 = 3660;

/// The application's configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// The address the server listens on.
    pub bind_addr: SocketAddr,
    /// Whether `APP_ENV` is `production`.
    pub is_production: bool,
    /// The session directory host. `None` runs an in-process directory.
    pub sso_host: Option<String>,
    /// Connect and read timeout for directory calls.
    pub sso_timeout: Duration,
    /// The domain shared by every application behind the SSO cookie.
    pub sso_cookie_domain: Option<String>,
    /// Where anonymous browsers are redirected.
    pub sign_in_page: String,
    /// The role portal pages require. `None` admits any signed-in user.
    pub required_role: Option<String>,
    /// How session passwords are encrypted.
    pub cipher: CipherSuite,
    /// What API routes do when the directory is unreachable.
    pub outage_policy: OutagePolicy,
    /// The lifetime of a new directory session.
    pub session_max_age: chrono::Duration,
    /// Path prefixes served without a login check.
    pub excluded_prefixes: Vec<String>,
    /// The JSON file listing the container's users.
    pub realm_file: PathBuf,
    /// The URL of the Redis server. `None` keeps login sessions in memory.
    pub redis_url: Option<String>,
    /// The duration of a container login session in days.
    pub session_duration_days: i64,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Creates a new `Config` from a variable lookup.
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| var(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let cipher_name = non_empty("SSO_CIPHER").unwrap_or_else(|| "sealed".to_string());
        let cipher = CipherSuite::parse(&cipher_name)
            .with_context(|| format!("Invalid SSO_CIPHER: {} (expected sealed or legacy)", cipher_name))?;

        let policy_name = non_empty("SSO_API_OUTAGE_POLICY").unwrap_or_else(|| "fail-open".to_string());
        let outage_policy = OutagePolicy::parse(&policy_name).with_context(|| {
            format!(
                "Invalid SSO_API_OUTAGE_POLICY: {} (expected fail-open or fail-closed)",
                policy_name
            )
        })?;

        let session_max_age_ms: i64 = var("SSO_SESSION_MAX_AGE_MS")
            .unwrap_or_else(|| i32::MAX.to_string())
            .parse()
            .context("Invalid SSO_SESSION_MAX_AGE_MS")?;
        if !(1..=MAX_SESSION_MAX_AGE_MS).contains(&session_max_age_ms) {
            anyhow::bail!(
                "Invalid SSO_SESSION_MAX_AGE_MS: {} (expected 1 to {})",
                session_max_age_ms,
                MAX_SESSION_MAX_AGE_MS
            );
        }

        let timeout_ms: u64 = var("SSO_TIMEOUT_MS")
            .unwrap_or_else(|| "1000".to_string())
            .parse()
            .context("Invalid SSO_TIMEOUT_MS")?;

        let session_duration_days: i64 = var("SESSION_DURATION_DAYS")
            .unwrap_or_else(|| "7".to_string())
            .parse()
            .context("Invalid SESSION_DURATION_DAYS")?;
        if !(1..=MAX_SESSION_DURATION_DAYS).contains(&session_duration_days) {
            anyhow::bail!(
                "Invalid SESSION_DURATION_DAYS: {} (expected 1 to {})",
                session_duration_days,
                MAX_SESSION_DURATION_DAYS
            );
        }

        let excluded_prefixes = match var("SSO_EXCLUDED_PREFIXES") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|prefix| !prefix.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_EXCLUDED_PREFIXES
                .iter()
                .map(|prefix| prefix.to_string())
                .collect(),
        };

        // An explicitly empty role disables the check.
        let required_role = match var("SSO_REQUIRED_ROLE") {
            Some(role) => Some(role.trim().to_string()).filter(|r| !r.is_empty()),
            None => Some("PORTAL".to_string()),
        };

        Ok(Self {
            bind_addr: var("BIND_ADDR")
                .unwrap_or_else(|| "127.0.0.1:3000".to_string())
                .parse()
                .context("Invalid BIND_ADDR")?,
            is_production: var("APP_ENV").unwrap_or_else(|| "development".to_string()) == "production",
            sso_host: non_empty("SSO_HOST"),
            sso_timeout: Duration::from_millis(timeout_ms),
            sso_cookie_domain: non_empty("SSO_COOKIE_DOMAIN"),
            sign_in_page: non_empty("SSO_SIGN_IN_PAGE").unwrap_or_else(|| DEFAULT_SIGN_IN_PAGE.to_string()),
            required_role,
            cipher,
            outage_policy,
            session_max_age: chrono::Duration::milliseconds(session_max_age_ms),
            excluded_prefixes,
            realm_file: PathBuf::from(var("REALM_FILE").unwrap_or_else(|| "realm.json".to_string())),
            redis_url: non_empty("REDIS_URL"),
            session_duration_days,
        })
    }

    /// The SSO cookie domain. Only set in production.
    pub fn cookie_domain(&self) -> Option<&str> {
        if self.is_production {
            self.sso_cookie_domain.as_deref()
        } else {
            None
        }
    }
}
