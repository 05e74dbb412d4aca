//! Performance metric forwarding.
//!
//! Metrics are scalar timings handed to a sink as they arrive. There is no
//! aggregation; the default sink writes each value to the log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of a performance metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    /// Cumulative layout shift.
    Cls,
    /// First input delay.
    Fid,
    /// Largest contentful paint.
    Lcp,
    Custom(String),
}

impl MetricName {
    pub fn as_str(&self) -> &str {
        match self {
            MetricName::Cls => "CLS",
            MetricName::Fid => "FID",
            MetricName::Lcp => "LCP",
            MetricName::Custom(name) => name,
        }
    }
}

/// A single recorded value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub name: MetricName,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
}

impl Metric {
    pub fn new(name: MetricName, value: f64) -> Self {
        Self {
            name,
            value,
            recorded_at: Utc::now(),
        }
    }

    pub fn custom(name: &str, value: f64) -> Self {
        Self::new(MetricName::Custom(name.to_string()), value)
    }
}

/// Receives metrics one at a time.
pub trait MetricSink {
    fn record(&self, metric: &Metric);
}

/// Sink that logs every metric at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl MetricSink for LogSink {
    fn record(&self, metric: &Metric) {
        tracing::info!(
            "metric {}={} at {}",
            metric.name.as_str(),
            metric.value,
            metric.recorded_at.to_rfc3339()
        );
    }
}

impl<F> MetricSink for F
where
    F: Fn(&Metric),
{
    fn record(&self, metric: &Metric) {
        self(metric)
    }
}

/// Hand each metric to `sink`, in order.
pub fn forward<S: MetricSink + ?Sized>(sink: &S, metrics: &[Metric]) {
    for metric in metrics {
        sink.record(metric);
    }
}
