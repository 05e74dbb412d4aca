//! Debounce and throttle wrappers for callbacks.
//!
//! Both spawn their delayed calls on the current tokio runtime and use
//! `tokio::time`, so they must be called from within a runtime.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Wrap `func` so that bursts of calls collapse into one call made `delay`
/// after the last call of the burst, with that call's argument.
pub fn debounce<T, F>(func: F, delay: Duration) -> Debouncer<T>
where
    T: Send + 'static,
    F: Fn(T) + Send + Sync + 'static,
{
    Debouncer {
        func: Arc::new(func),
        delay,
        pending: Mutex::new(None),
    }
}

/// Wrap `func` so that it runs at most once per `limit`. The first call runs
/// immediately; calls inside the window are folded into one trailing call.
pub fn throttle<T, F>(func: F, limit: Duration) -> Throttler<T>
where
    T: Send + 'static,
    F: Fn(T) + Send + Sync + 'static,
{
    Throttler {
        func: Arc::new(func),
        limit,
        state: Arc::new(Mutex::new(ThrottleState::default())),
    }
}

pub struct Debouncer<T> {
    func: Callback<T>,
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Cancel any scheduled call and schedule `func(arg)` after the delay.
    pub fn call(&self, arg: T) {
        let func = Arc::clone(&self.func);
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            func(arg);
        });

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(prev) = pending.replace(handle) {
            prev.abort();
        }
    }

    /// Drop the scheduled call, if any.
    pub fn cancel(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(prev) = pending.take() {
            prev.abort();
        }
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(prev) = pending.take() {
                prev.abort();
            }
        }
    }
}

#[derive(Default)]
struct ThrottleState {
    last_ran: Option<Instant>,
    trailing: Option<JoinHandle<()>>,
}

pub struct Throttler<T> {
    func: Callback<T>,
    limit: Duration,
    state: Arc<Mutex<ThrottleState>>,
}

impl<T: Send + 'static> Throttler<T> {
    pub fn call(&self, arg: T) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let Some(last_ran) = state.last_ran else {
            state.last_ran = Some(Instant::now());
            drop(state);
            (self.func)(arg);
            return;
        };

        if let Some(prev) = state.trailing.take() {
            prev.abort();
        }

        let wait = self.limit.saturating_sub(last_ran.elapsed());
        let limit = self.limit;
        let func = Arc::clone(&self.func);
        let shared = Arc::clone(&self.state);

        state.trailing = Some(tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            let mut state = shared.lock().unwrap_or_else(|e| e.into_inner());
            let due = state
                .last_ran
                .map_or(true, |t| t.elapsed() >= limit);
            if due {
                state.last_ran = Some(Instant::now());
                state.trailing = None;
                drop(state);
                func(arg);
            }
        }));
    }
}

impl<T> Drop for Throttler<T> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(prev) = state.trailing.take() {
                prev.abort();
            }
        }
    }
}
