use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::types::SearchQuery;
use crate::{DEFAULT_API_BASE, DEFAULT_FOOTER, DEFAULT_PRIMING_URL, WEBHOOK_URL_ENV};

/// Default config file path.
pub const CONFIG_PATH: &str = "config.toml";

/// Upper bound for any configured webhook delay (one day).
pub const MAX_CONFIGURED_WAIT_SECS: f64 = 86_400.0;

/// Top-level application config deserialized from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub marketplace: MarketplaceConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Saved searches, run in order once per cycle.
    #[serde(default)]
    pub search_queries: Vec<SearchQuery>,
}

/// Marketplace endpoints and HTTP session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceConfig {
    /// Site root POSTed once to obtain session cookies.
    #[serde(default = "default_priming_url")]
    pub priming_url: String,
    /// Base of the REST API (`{api_base}/catalog/items`, `{api_base}/users/{login}`).
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
    /// Timeout for the session-priming request.
    #[serde(default = "default_prime_timeout")]
    pub prime_timeout_secs: u64,
    /// Optional timeout for catalog and profile requests. Unset means no timeout.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

/// Chat webhook delivery settings. The URL itself normally comes from `WEBHOOK_URL`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Fallback when `WEBHOOK_URL` is not set.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_footer")]
    pub footer: String,
    /// Rate-limited (429) retries before a message is given up on.
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,
    /// Ceiling applied to server-supplied `retry_after` delays.
    #[serde(default = "default_max_retry_after")]
    pub max_retry_after_secs: f64,
    /// Delay used when a 429 response carries no `retry_after`.
    #[serde(default = "default_retry_after")]
    pub default_retry_after_secs: f64,
}

/// Seen-item store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// One-id-per-line text file imported into the store on open.
    #[serde(default)]
    pub legacy_ids: Option<PathBuf>,
}

/// Which listings get notified and when they count as processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Sellers below this many positive reviews are skipped.
    #[serde(default = "default_min_positive_feedback")]
    pub min_positive_feedback: u64,
    /// Record a listing as seen even when its notification could not be delivered.
    #[serde(default = "default_record_failed_dispatches")]
    pub record_failed_dispatches: bool,
}

fn default_priming_url() -> String {
    DEFAULT_PRIMING_URL.to_string()
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:128.0) Gecko/20100101 Firefox/128.0"
        .to_string()
}

fn default_accept_language() -> String {
    "en-US,en;q=0.5".to_string()
}

fn default_prime_timeout() -> u64 {
    30
}

fn default_footer() -> String {
    DEFAULT_FOOTER.to_string()
}

fn default_max_rate_limit_retries() -> u32 {
    10
}

fn default_max_retry_after() -> f64 {
    60.0
}

fn default_retry_after() -> f64 {
    1.5
}

fn default_store_path() -> PathBuf {
    PathBuf::from("processed_items.db")
}

fn default_min_positive_feedback() -> u64 {
    1
}

fn default_record_failed_dispatches() -> bool {
    true
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            priming_url: default_priming_url(),
            api_base: default_api_base(),
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
            prime_timeout_secs: default_prime_timeout(),
            request_timeout_secs: None,
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            footer: default_footer(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
            max_retry_after_secs: default_max_retry_after(),
            default_retry_after_secs: default_retry_after(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            legacy_ids: None,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            min_positive_feedback: default_min_positive_feedback(),
            record_failed_dispatches: default_record_failed_dispatches(),
        }
    }
}

impl AppConfig {
    /// Load and validate config from the given TOML file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&contents).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Parse and validate config from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).context("failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.search_queries.is_empty() {
            bail!("no [[search_queries]] configured");
        }
        if self.policy.min_positive_feedback == 0 {
            bail!("policy.min_positive_feedback must be at least 1");
        }
        let max_wait = self.webhook.max_retry_after_secs;
        if !(max_wait > 0.0 && max_wait <= MAX_CONFIGURED_WAIT_SECS) {
            bail!("webhook.max_retry_after_secs must be in (0, {MAX_CONFIGURED_WAIT_SECS}]");
        }
        let default_wait = self.webhook.default_retry_after_secs;
        if !(0.0..=MAX_CONFIGURED_WAIT_SECS).contains(&default_wait) {
            bail!("webhook.default_retry_after_secs must be in [0, {MAX_CONFIGURED_WAIT_SECS}]");
        }
        Ok(())
    }

    /// Resolve the webhook URL: the environment value wins over `webhook.url`.
    pub fn webhook_url(&self, env_value: Option<String>) -> Result<String> {
        env_value
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.webhook.url.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("{WEBHOOK_URL_ENV} is not set and webhook.url is missing from config")
            })
    }
}
