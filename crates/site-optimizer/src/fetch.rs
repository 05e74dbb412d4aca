//! Retrying JSON fetches over reqwest.
//!
//! Each attempt races the request against a fresh timer. A network error,
//! timeout, unsuccessful status, or malformed body fails the attempt; failed
//! attempts are retried immediately (no backoff, no jitter) until the retry
//! budget is spent, after which the call degrades to [`FetchOutcome::Absent`].
//! Nothing is ever raised to the caller.

use std::time::{Duration, Instant};

use serde_json::Value;

use crate::config::FetchConfig;
use crate::types::{AttemptError, FetchOptions, FetchOutcome, FetchReport, FetchRequest};

/// HTTP client that retries failed attempts and never returns an error.
#[derive(Clone)]
pub struct RetryingFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl RetryingFetcher {
    /// Create a fetcher with the given defaults.
    ///
    /// Idle connections are not kept, so every attempt is an independent
    /// request.
    pub fn new(config: FetchConfig) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .pool_max_idle_per_host(0)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("falling back to a default HTTP client: {e}");
                reqwest::Client::default()
            });

        Self { client, config }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch `url` with explicit options, retry count and per-attempt timeout.
    pub async fn fetch(
        &self,
        url: &str,
        options: FetchOptions,
        retries: u32,
        timeout_ms: u64,
    ) -> FetchOutcome {
        let request = FetchRequest::new(url)
            .with_options(options)
            .with_retries(retries)
            .with_timeout(Duration::from_millis(timeout_ms));
        self.execute(&request).await
    }

    /// Fetch `url` with a plain GET and this fetcher's configured defaults.
    pub async fn fetch_data(&self, url: &str) -> FetchOutcome {
        let request = FetchRequest::new(url)
            .with_retries(self.config.retries)
            .with_timeout(self.config.timeout);
        self.execute(&request).await
    }

    /// Run a prepared request and return only its outcome.
    pub async fn execute(&self, request: &FetchRequest) -> FetchOutcome {
        self.run(request).await.outcome
    }

    /// Run a prepared request and report how it went.
    pub async fn run(&self, request: &FetchRequest) -> FetchReport {
        let started = Instant::now();

        if let Err(e) = url::Url::parse(&request.url) {
            tracing::error!("Fetch error: invalid URL '{}': {e}", request.url);
            return FetchReport {
                outcome: FetchOutcome::Absent,
                attempts: 0,
                elapsed: started.elapsed(),
                last_error: None,
            };
        }

        let mut remaining = request.retries;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.attempt(request).await {
                Ok(value) => {
                    tracing::debug!("fetched {} in {attempts} attempt(s)", request.url);
                    return FetchReport {
                        outcome: FetchOutcome::Parsed(value),
                        attempts,
                        elapsed: started.elapsed(),
                        last_error: None,
                    };
                }
                Err(e) if remaining > 0 => {
                    tracing::warn!(
                        "Retrying {}... {remaining} attempts left ({e})",
                        request.url
                    );
                    remaining -= 1;
                }
                Err(e) => {
                    tracing::error!(
                        "Fetch error: {} failed after {attempts} attempt(s): {e}",
                        request.url
                    );
                    return FetchReport {
                        outcome: FetchOutcome::Absent,
                        attempts,
                        elapsed: started.elapsed(),
                        last_error: Some(e),
                    };
                }
            }
        }
    }

    /// One attempt: send, check status, decode. The timer covers all three;
    /// when it fires the in-flight request is dropped.
    async fn attempt(&self, request: &FetchRequest) -> Result<Value, AttemptError> {
        let exchange = async {
            let response = self.build(request).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(AttemptError::Status(status.as_u16()));
            }
            let bytes = response.bytes().await?;
            serde_json::from_slice::<Value>(&bytes).map_err(|e| AttemptError::Parse(e.to_string()))
        };

        match tokio::time::timeout(request.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(AttemptError::Timeout(request.timeout)),
        }
    }

    fn build(&self, request: &FetchRequest) -> reqwest::RequestBuilder {
        let opts = &request.options;
        let mut builder = self.client.request(opts.method.clone(), &request.url);

        for (name, value) in &opts.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = &opts.body {
            builder = builder.body(body.clone());
        }

        builder
    }
}

impl Default for RetryingFetcher {
    fn default() -> Self {
        Self::new(FetchConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetcher_creation() {
        let fetcher = RetryingFetcher::new(FetchConfig::default());
        assert_eq!(fetcher.config().retries, 3);
        assert_eq!(fetcher.config().timeout, Duration::from_millis(5000));
    }

    #[test]
    fn test_invalid_user_agent_still_builds() {
        let config = FetchConfig {
            user_agent: "bad\nagent".to_string(),
            ..FetchConfig::default()
        };
        let fetcher = RetryingFetcher::new(config);
        assert_eq!(fetcher.config().user_agent, "bad\nagent");
    }

    #[tokio::test]
    async fn test_invalid_url_makes_no_attempt() {
        let fetcher = RetryingFetcher::default();
        let report = fetcher
            .run(&FetchRequest::new("not a url").with_retries(5))
            .await;
        assert!(report.outcome.is_absent());
        assert_eq!(report.attempts, 0);
        assert!(report.last_error.is_none());
    }

    #[tokio::test]
    async fn test_empty_url_is_absent() {
        let fetcher = RetryingFetcher::default();
        let outcome = fetcher.fetch("", FetchOptions::default(), 2, 50).await;
        assert_eq!(outcome, FetchOutcome::Absent);
    }
}
