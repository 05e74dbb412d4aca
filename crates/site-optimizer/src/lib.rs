//! Site optimizer — retrying JSON fetches plus small page-load helpers.
//!
//! The fetcher is the core: a request raced against a per-attempt timeout,
//! retried a bounded number of times, degrading to an absence value instead
//! of an error. The remaining modules are independent leaf utilities.

pub mod config;
pub mod fetch;
pub mod metrics;
pub mod page;
pub mod timing;
pub mod types;

pub use config::FetchConfig;
pub use fetch::RetryingFetcher;
pub use metrics::{forward, LogSink, Metric, MetricName, MetricSink};
pub use page::{
    deferred_scripts, init, init_file, lazy_media, parse_document, select_all, select_first,
    DeferredScript, IntersectionEntry, LazyLoader, LazyMedia, ObserverOptions, PagePlan,
};
pub use timing::{debounce, throttle, Debouncer, Throttler};
pub use types::*;

pub use reqwest::Method;
