//! Fetcher configuration and environment resolution.

use std::time::Duration;

use reqwest::header::HeaderValue;

use crate::types::{DEFAULT_RETRIES, DEFAULT_TIMEOUT_MS};

pub const ENV_RETRIES: &str = "SITE_OPTIMIZER_RETRIES";
pub const ENV_TIMEOUT_MS: &str = "SITE_OPTIMIZER_TIMEOUT_MS";
pub const ENV_USER_AGENT: &str = "SITE_OPTIMIZER_USER_AGENT";

const DEFAULT_USER_AGENT: &str = concat!("site-optimizer/", env!("CARGO_PKG_VERSION"));

/// Defaults applied by [`crate::RetryingFetcher`] when a call leaves them out.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub retries: u32,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetchConfig {
    /// Build a config from `SITE_OPTIMIZER_*` variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let retries = lookup(ENV_RETRIES)
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(defaults.retries);
        let timeout_ms = lookup(ENV_TIMEOUT_MS)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_MS)
            .max(1);
        let user_agent = lookup(ENV_USER_AGENT)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .filter(|v| {
                let valid = HeaderValue::from_str(v).is_ok();
                if !valid {
                    tracing::warn!("ignoring {ENV_USER_AGENT}: not a valid header value");
                }
                valid
            })
            .unwrap_or(defaults.user_agent);

        Self {
            retries,
            timeout: Duration::from_millis(timeout_ms),
            user_agent,
        }
    }

    /// Apply explicit overrides (e.g. CLI flags) on top of this config.
    pub fn with_overrides(mut self, retries: Option<u32>, timeout_ms: Option<u64>) -> Self {
        if let Some(r) = retries {
            self.retries = r;
        }
        if let Some(ms) = timeout_ms {
            self.timeout = Duration::from_millis(ms.max(1));
        }
        self
    }
}
