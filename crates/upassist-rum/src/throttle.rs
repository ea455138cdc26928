//! Leading-edge throttle.

use crate::clock::Clock;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Leading-edge rate limiter around a callable.
///
/// The first call runs. Calls made less than `window` after the last call
/// that ran are dropped: not queued, not replayed later.
#[derive(Debug)]
pub struct Throttle {
    window: Duration,
    clock: Arc<dyn Clock>,
    last_run: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            clock,
            last_run: Mutex::new(None),
        }
    }

    /// Run `f` unless the window since the last run is still open.
    ///
    /// Returns `None` when the call was dropped.
    pub fn call<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let now = self.clock.now();
        {
            let mut last_run = self.last_run.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(last) = *last_run {
                if now.saturating_duration_since(last) < self.window {
                    return None;
                }
            }
            *last_run = Some(now);
        }
        Some(f())
    }

    /// Forget the last run so the next call executes.
    pub fn reset(&self) {
        *self.last_run.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// The throttle window.
    pub fn window(&self) -> Duration {
        self.window
    }
}
