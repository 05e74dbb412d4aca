//! Core data types for fetch requests, outcomes, and errors.

use std::time::Duration;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Retries after the first attempt when the caller does not say otherwise.
pub const DEFAULT_RETRIES: u32 = 3;

/// Per-attempt budget when the caller does not say otherwise.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Request configuration merged into every attempt.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: Vec::new(),
            body: None,
        }
    }
}

impl FetchOptions {
    /// Set the HTTP method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Append a header. Repeated names are sent repeatedly.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Set a raw request body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set a JSON body and the matching content type.
    pub fn with_json(self, value: &Value) -> Self {
        self.with_header("content-type", "application/json")
            .with_body(value.to_string())
    }
}

/// One logical fetch: the URL, its options, and the retry/timeout bounds.
///
/// The request is never mutated between attempts; the retry loop keeps its
/// own countdown.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub options: FetchOptions,
    pub retries: u32,
    pub timeout: Duration,
}

impl FetchRequest {
    /// Create a request with default options, retries and timeout.
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            options: FetchOptions::default(),
            retries: DEFAULT_RETRIES,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the per-attempt timeout. Zero is bumped to one millisecond.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.max(Duration::from_millis(1));
        self
    }

    /// Total attempts this request may make.
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Result of a fetch: parsed content, or the absence value once every
/// attempt has failed.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Parsed(Value),
    Absent,
}

impl FetchOutcome {
    pub fn is_parsed(&self) -> bool {
        matches!(self, FetchOutcome::Parsed(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, FetchOutcome::Absent)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            FetchOutcome::Parsed(v) => Some(v),
            FetchOutcome::Absent => None,
        }
    }

    pub fn into_option(self) -> Option<Value> {
        match self {
            FetchOutcome::Parsed(v) => Some(v),
            FetchOutcome::Absent => None,
        }
    }
}

impl From<Option<Value>> for FetchOutcome {
    fn from(value: Option<Value>) -> Self {
        value.map_or(FetchOutcome::Absent, FetchOutcome::Parsed)
    }
}

/// What happened across all attempts of one fetch.
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub outcome: FetchOutcome,
    /// Attempts actually issued. Zero when the URL was rejected up front.
    pub attempts: u32,
    pub elapsed: Duration,
    /// Failure of the last failed attempt, if any attempt failed.
    pub last_error: Option<AttemptError>,
}

/// Why a single attempt failed. Every variant is retried.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AttemptError {
    #[error("network error: {0}")]
    Network(String),

    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("unsuccessful status: {0}")]
    Status(u16),

    #[error("malformed body: {0}")]
    Parse(String),
}

impl AttemptError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, AttemptError::Timeout(_))
    }
}

impl From<reqwest::Error> for AttemptError {
    fn from(e: reqwest::Error) -> Self {
        AttemptError::Network(e.to_string())
    }
}

/// Errors from the fallible page helpers.
#[derive(thiserror::Error, Debug)]
pub enum OptimizerError {
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type OptimizerResult<T> = Result<T, OptimizerError>;

/// Tag of a lazily loaded media element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaTag {
    Img,
    Iframe,
}

impl MediaTag {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "img" => Some(MediaTag::Img),
            "iframe" => Some(MediaTag::Iframe),
            _ => None,
        }
    }
}
