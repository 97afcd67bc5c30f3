//! Configuration for the GDC automation runner.

use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use gdc_core::PriorityPolicy;
use gdc_delivery::{retry::BackoffStrategy, DispatchConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::service::AutomationSettings;

/// Default configuration file, relative to the working directory.
pub const CONFIG_FILE: &str = "gdc.toml";

/// Environment variable naming an alternative configuration file.
pub const CONFIG_FILE_ENV: &str = "GDC_CONFIG";

const ENV_PREFIX: &str = "GDC_";

/// Runner configuration with defaults, file, and environment overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables prefixed `GDC_`, plus raw `DATABASE_URL` and
///    `RUST_LOG` (highest priority)
/// 2. Configuration file (`gdc.toml`, or the path in `GDC_CONFIG`)
/// 3. Built-in defaults (lowest priority)
///
/// An empty webhook secret loads fine. Delivery then fails per run with a
/// configuration error recorded in the ledger, which is what operators see
/// in the health summary.
///
/// # Example
///
/// ```no_run
/// use gdc_automations::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
///
/// println!("Delivering to {}", config.webhook_base_url);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    // Database
    /// PostgreSQL connection URL.
    ///
    /// Environment variable: `DATABASE_URL`
    #[serde(default = "default_database_url", alias = "DATABASE_URL")]
    pub database_url: String,
    /// Maximum number of database connections in the pool.
    ///
    /// Environment variable: `GDC_DATABASE_MAX_CONNECTIONS`
    #[serde(default = "default_max_connections", alias = "DATABASE_MAX_CONNECTIONS")]
    pub database_max_connections: u32,

    // Webhook
    /// Base URL the per-event path suffix is appended to.
    ///
    /// Environment variable: `GDC_WEBHOOK_BASE_URL`
    #[serde(default = "default_webhook_base_url", alias = "WEBHOOK_BASE_URL")]
    pub webhook_base_url: String,
    /// Shared HMAC signing secret.
    ///
    /// Environment variable: `GDC_WEBHOOK_SECRET`
    #[serde(default, alias = "WEBHOOK_SECRET")]
    pub webhook_secret: String,
    /// Per-attempt HTTP timeout in seconds.
    ///
    /// Environment variable: `GDC_WEBHOOK_TIMEOUT`
    #[serde(default = "default_webhook_timeout", alias = "WEBHOOK_TIMEOUT")]
    pub webhook_timeout: u64,

    // Retry
    /// Maximum delivery attempts per run, including the first.
    ///
    /// Environment variable: `GDC_AUTOMATIONS_RETRY_MAX`
    #[serde(default = "default_retry_max", alias = "AUTOMATIONS_RETRY_MAX")]
    pub automations_retry_max: u32,
    /// Base delay between attempts in milliseconds. Zero retries at once.
    ///
    /// Environment variable: `GDC_AUTOMATIONS_RETRY_BASE_DELAY_MS`
    #[serde(default, alias = "AUTOMATIONS_RETRY_BASE_DELAY_MS")]
    pub automations_retry_base_delay_ms: u64,
    /// Upper bound on the delay between attempts in milliseconds.
    ///
    /// Environment variable: `GDC_AUTOMATIONS_RETRY_MAX_DELAY_MS`
    #[serde(default = "default_retry_max_delay_ms", alias = "AUTOMATIONS_RETRY_MAX_DELAY_MS")]
    pub automations_retry_max_delay_ms: u64,

    // Automations
    /// Master switch. When off, no trigger delivers anything.
    ///
    /// Environment variable: `GDC_AUTOMATIONS_ENABLED`
    #[serde(default = "default_enabled", alias = "AUTOMATIONS_ENABLED")]
    pub automations_enabled: bool,
    /// Days without contact after which a lead counts as stale.
    ///
    /// Environment variable: `GDC_STALE_DAYS`
    #[serde(default = "default_stale_days", alias = "STALE_DAYS")]
    pub stale_days: u32,
    /// Number of leads listed in the daily summary.
    ///
    /// Environment variable: `GDC_PRIORITY_LIMIT`
    #[serde(default = "default_priority_limit", alias = "PRIORITY_LIMIT")]
    pub priority_limit: usize,

    // Logging
    /// Log filter directive.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level", alias = "RUST_LOG")]
    pub rust_log: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &self.database_url_masked())
            .field("database_max_connections", &self.database_max_connections)
            .field("webhook_base_url", &self.webhook_base_url)
            .field("webhook_secret", &if self.has_secret() { "<redacted>" } else { "<empty>" })
            .field("webhook_timeout", &self.webhook_timeout)
            .field("automations_retry_max", &self.automations_retry_max)
            .field("automations_retry_base_delay_ms", &self.automations_retry_base_delay_ms)
            .field("automations_retry_max_delay_ms", &self.automations_retry_max_delay_ms)
            .field("automations_enabled", &self.automations_enabled)
            .field("stale_days", &self.stale_days)
            .field("priority_limit", &self.priority_limit)
            .field("rust_log", &self.rust_log)
            .finish()
    }
}

impl Config {
    /// Load configuration from defaults, the config file, and environment
    /// variable overrides.
    ///
    /// # Errors
    ///
    /// Fails when a source cannot be parsed or a value is out of range.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| CONFIG_FILE.to_string());
        Self::load_from(path)
    }

    /// Like [`Self::load`], reading the given file instead of `gdc.toml`.
    ///
    /// A missing file is not an error; defaults and environment still
    /// apply.
    ///
    /// # Errors
    ///
    /// Fails when a source cannot be parsed or a value is out of range.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self =
            Self::figment(path.as_ref()).extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::raw().only(&["DATABASE_URL", "RUST_LOG"]))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Whether a signing secret is configured.
    pub fn has_secret(&self) -> bool {
        !self.webhook_secret.is_empty()
    }

    /// Convert to the dispatcher's configuration.
    pub fn to_dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            base_url: self.webhook_base_url.clone(),
            secret: self.webhook_secret.clone(),
            timeout: Duration::from_secs(self.webhook_timeout),
            retry_policy: self.to_retry_policy(),
        }
    }

    /// Convert to retry policy.
    ///
    /// A zero base delay gives the immediate sequential retry; anything
    /// else backs off exponentially up to the configured ceiling.
    pub fn to_retry_policy(&self) -> RetryPolicy {
        if self.automations_retry_base_delay_ms == 0 {
            return RetryPolicy::immediate(self.automations_retry_max);
        }

        RetryPolicy {
            max_attempts: self.automations_retry_max,
            base_delay: Duration::from_millis(self.automations_retry_base_delay_ms),
            max_delay: Duration::from_millis(self.automations_retry_max_delay_ms),
            jitter_factor: 0.1,
            backoff_strategy: BackoffStrategy::Exponential,
        }
    }

    /// Ranking policy for summaries.
    pub fn priority_policy(&self) -> PriorityPolicy {
        PriorityPolicy::from_stale_days(self.stale_days)
    }

    /// Trigger-layer settings.
    pub fn automation_settings(&self) -> AutomationSettings {
        AutomationSettings {
            enabled: self.automations_enabled,
            priority_policy: self.priority_policy(),
            priority_limit: self.priority_limit,
        }
    }

    /// Get database URL with password masked for logging.
    pub fn database_url_masked(&self) -> String {
        if let Some(at_pos) = self.database_url.find('@') {
            if let Some(colon_pos) = self.database_url[..at_pos].rfind(':') {
                // Only a colon after the scheme separates user and password.
                if self.database_url[..colon_pos].contains("//") {
                    let mut masked = self.database_url.clone();
                    masked.replace_range(colon_pos + 1..at_pos, "***");
                    return masked;
                }
            }
        }
        self.database_url.clone()
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.database_max_connections == 0 {
            anyhow::bail!("database_max_connections must be greater than 0");
        }

        if self.webhook_timeout == 0 {
            anyhow::bail!("webhook_timeout must be greater than 0");
        }

        if self.automations_retry_max == 0 {
            anyhow::bail!("automations_retry_max must be greater than 0");
        }

        if self.automations_retry_base_delay_ms > self.automations_retry_max_delay_ms {
            anyhow::bail!("automations_retry_base_delay_ms cannot exceed the max delay");
        }

        if self.stale_days == 0 {
            anyhow::bail!("stale_days must be greater than 0");
        }

        if self.priority_limit == 0 {
            anyhow::bail!("priority_limit must be greater than 0");
        }

        let base = Url::parse(&self.webhook_base_url).with_context(|| {
            format!("webhook_base_url is not a valid URL: {}", self.webhook_base_url)
        })?;
        if !matches!(base.scheme(), "http" | "https") || !base.has_host() {
            anyhow::bail!("webhook_base_url must be an absolute http(s) URL");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            database_max_connections: default_max_connections(),
            webhook_base_url: default_webhook_base_url(),
            webhook_secret: String::new(),
            webhook_timeout: default_webhook_timeout(),
            automations_retry_max: default_retry_max(),
            automations_retry_base_delay_ms: 0,
            automations_retry_max_delay_ms: default_retry_max_delay_ms(),
            automations_enabled: default_enabled(),
            stale_days: default_stale_days(),
            priority_limit: default_priority_limit(),
            rust_log: default_log_level(),
        }
    }
}

fn default_database_url() -> String {
    "postgresql://localhost/gdc".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_webhook_base_url() -> String {
    gdc_delivery::DEFAULT_BASE_URL.to_string()
}

fn default_webhook_timeout() -> u64 {
    gdc_delivery::DEFAULT_TIMEOUT_SECONDS
}

fn default_retry_max() -> u32 {
    gdc_delivery::retry::DEFAULT_MAX_ATTEMPTS
}

fn default_retry_max_delay_ms() -> u64 {
    60_000
}

fn default_enabled() -> bool {
    true
}

fn default_stale_days() -> u32 {
    gdc_core::priority::DEFAULT_STALE_DAYS
}

fn default_priority_limit() -> usize {
    gdc_core::summary::DEFAULT_PRIORITY_LIMIT
}

fn default_log_level() -> String {
    "info,gdc=debug".to_string()
}
