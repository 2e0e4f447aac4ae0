//! Fixed-window request counter keyed by caller origin.
//!
//! Each key owns its own mutex-guarded window; the outer map lock is only
//! taken for writing when a key is seen for the first time or during a sweep,
//! so increments on different keys never contend with each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub window: Duration,
    pub max_requests: u32,
}

impl WindowSpec {
    /// Credential exchange: 10 attempts per second.
    pub const LOGIN: WindowSpec = WindowSpec { window: Duration::from_secs(1), max_requests: 10 };

    pub fn new(window: Duration, max_requests: u32) -> Self { Self { window, max_requests } }
}

#[derive(Debug, Clone)]
pub struct RateLimitWindow {
    pub key: String,
    pub window_duration: Duration,
    pub max_requests: u32,
    pub current_count: u32,
    pub window_start: Instant,
}

impl RateLimitWindow {
    fn new(key: &str, spec: WindowSpec, now: Instant) -> Self {
        Self { key: key.to_string(), window_duration: spec.window, max_requests: spec.max_requests, current_count: 0, window_start: now }
    }

    fn elapsed(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) >= self.window_duration
    }
}

type Slot = Arc<Mutex<RateLimitWindow>>;

#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: RwLock<HashMap<String, Slot>>,
}

impl RateLimiter {
    pub fn new() -> Self { Self::default() }

    pub fn admit(&self, key: &str, spec: WindowSpec) -> bool {
        self.admit_at(key, spec, Instant::now())
    }

    /// Count one request for `key` at `now` and report whether it fits the window.
    pub fn admit_at(&self, key: &str, spec: WindowSpec, now: Instant) -> bool {
        let slot = self.slot(key, spec, now);
        let mut w = slot.lock();
        w.window_duration = spec.window;
        w.max_requests = spec.max_requests;
        if w.elapsed(now) {
            w.current_count = 0;
            w.window_start = now;
        }
        w.current_count = w.current_count.saturating_add(1);
        let admitted = w.current_count <= w.max_requests;
        if !admitted {
            debug!(key, count = w.current_count, max = w.max_requests, "rate limit window exhausted");
        }
        admitted
    }

    /// Gate form of [`admit`](Self::admit): a denied request becomes `RATE_LIMITED`.
    pub fn check(&self, key: &str, spec: WindowSpec) -> AppResult<()> {
        self.check_at(key, spec, Instant::now())
    }

    pub fn check_at(&self, key: &str, spec: WindowSpec, now: Instant) -> AppResult<()> {
        if self.admit_at(key, spec, now) {
            return Ok(());
        }
        warn!(key, "request rejected by rate limit");
        Err(AppError::rate_limited(
            "rate_limited".to_string(),
            format!("Too many requests: limit is {} per {} ms", spec.max_requests, spec.window.as_millis()),
        ))
    }

    fn slot(&self, key: &str, spec: WindowSpec, now: Instant) -> Slot {
        if let Some(s) = self.windows.read().get(key) {
            return s.clone();
        }
        let mut map = self.windows.write();
        map.entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(RateLimitWindow::new(key, spec, now))))
            .clone()
    }

    pub fn snapshot(&self, key: &str) -> Option<RateLimitWindow> {
        self.windows.read().get(key).map(|s| s.lock().clone())
    }

    pub fn len(&self) -> usize { self.windows.read().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Drop windows that have elapsed and are not in use. Returns how many were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut map = self.windows.write();
        let before = map.len();
        // strong_count == 1: no admit holds this slot, and none can start while we hold the write lock
        map.retain(|_, slot| Arc::strong_count(slot) > 1 || !slot.lock().elapsed(now));
        before - map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eleventh_request_in_window_is_denied() {
        let rl = RateLimiter::new();
        let t0 = Instant::now();
        for i in 0..10 {
            assert!(rl.admit_at("origin:1.2.3.4", WindowSpec::LOGIN, t0 + Duration::from_millis(i * 50)), "request {i}");
        }
        assert!(!rl.admit_at("origin:1.2.3.4", WindowSpec::LOGIN, t0 + Duration::from_millis(999)));
        let err = rl.check_at("origin:1.2.3.4", WindowSpec::LOGIN, t0 + Duration::from_millis(999)).unwrap_err();
        assert_eq!(err.graphql_code(), "RATE_LIMITED");
    }

    #[test]
    fn window_resets_after_elapsing() {
        let rl = RateLimiter::new();
        let t0 = Instant::now();
        for _ in 0..11 { rl.admit_at("k", WindowSpec::LOGIN, t0); }
        assert!(!rl.admit_at("k", WindowSpec::LOGIN, t0 + Duration::from_millis(500)));
        assert!(rl.admit_at("k", WindowSpec::LOGIN, t0 + Duration::from_secs(1)));
        let w = rl.snapshot("k").unwrap();
        assert_eq!(w.current_count, 1);
        assert_eq!(w.window_start, t0 + Duration::from_secs(1));
    }

    #[test]
    fn keys_are_independent() {
        let rl = RateLimiter::new();
        let t0 = Instant::now();
        let spec = WindowSpec::new(Duration::from_secs(1), 1);
        assert!(rl.admit_at("a", spec, t0));
        assert!(!rl.admit_at("a", spec, t0));
        assert!(rl.admit_at("b", spec, t0));
        assert_eq!(rl.len(), 2);
    }

    #[test]
    fn window_is_created_lazily() {
        let rl = RateLimiter::new();
        assert!(rl.is_empty());
        assert!(rl.snapshot("k").is_none());
        rl.admit("k", WindowSpec::LOGIN);
        let w = rl.snapshot("k").unwrap();
        assert_eq!(w.key, "k");
        assert_eq!(w.max_requests, 10);
        assert_eq!(w.window_duration, Duration::from_secs(1));
    }

    #[test]
    fn sweep_drops_only_elapsed_windows() {
        let rl = RateLimiter::new();
        let t0 = Instant::now();
        rl.admit_at("old", WindowSpec::LOGIN, t0);
        rl.admit_at("fresh", WindowSpec::LOGIN, t0 + Duration::from_millis(900));
        assert_eq!(rl.sweep(t0 + Duration::from_millis(1200)), 1);
        assert!(rl.snapshot("old").is_none());
        assert!(rl.snapshot("fresh").is_some());
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let rl = Arc::new(RateLimiter::new());
        let t0 = Instant::now();
        let spec = WindowSpec::new(Duration::from_secs(3600), 1_000_000);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rl = rl.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 { rl.admit_at("shared", spec, t0); }
                })
            })
            .collect();
        for h in handles { h.join().unwrap(); }
        assert_eq!(rl.snapshot("shared").unwrap().current_count, 4000);
    }
}
