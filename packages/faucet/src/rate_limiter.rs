//! Sliding-window rate limiter
//!
//! Per-address admission control keyed by the environment-independent account
//! id, so a requester cannot double-dip by switching between the bech32 and
//! hex encodings of one key.
//!
//! A request is admitted through a [`Reservation`]: the check and the
//! in-flight slot are taken under one lock, the slot turns into a recorded
//! timestamp on [`Reservation::commit`] and is released if the reservation is
//! dropped. Two concurrent requests for one address therefore cannot both pass
//! a quota of one.
//!
//! State is process-local; a restart resets every window.

use dualchain_rs::NormalizedAddress;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;

/// Result of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Reject { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allow)
    }
}

#[derive(Debug, Default)]
struct Window {
    /// Recorded requests, oldest first
    requests: VecDeque<Instant>,
    /// Admitted but not yet committed or released
    in_flight: u32,
}

impl Window {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.requests.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.requests.pop_front();
            } else {
                break;
            }
        }
    }

    fn used(&self) -> usize {
        self.requests.len() + self.in_flight as usize
    }

    fn is_idle(&self) -> bool {
        self.requests.is_empty() && self.in_flight == 0
    }
}

/// Sliding-window limiter shared by all request handlers
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    quota: u32,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(window: Duration, quota: u32) -> Self {
        Self {
            window,
            quota: quota.max(1),
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.window(), config.quota)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn quota(&self) -> u32 {
        self.quota
    }

    /// Check whether `addr` may request now. Does not take a slot.
    pub fn check_admission(&self, addr: &NormalizedAddress) -> Admission {
        self.check_at(&addr.account_key(), Instant::now())
    }

    /// Record a completed request for `addr`
    pub fn record_request(&self, addr: &NormalizedAddress) {
        self.record_at(&addr.account_key(), Instant::now());
    }

    /// Atomically check admission and take an in-flight slot
    pub fn try_reserve(&self, addr: &NormalizedAddress) -> Result<Reservation<'_>, Duration> {
        let key = addr.account_key();
        match self.reserve_at(&key, Instant::now()) {
            Admission::Allow => Ok(Reservation {
                limiter: self,
                key,
                settled: false,
            }),
            Admission::Reject { retry_after } => Err(retry_after),
        }
    }

    /// Time until `addr` may next request; zero when it may request now
    pub fn next_admission(&self, addr: &NormalizedAddress) -> Duration {
        match self.check_admission(addr) {
            Admission::Allow => Duration::ZERO,
            Admission::Reject { retry_after } => retry_after,
        }
    }

    /// Number of requests recorded for `addr` in the current window
    pub fn recorded(&self, addr: &NormalizedAddress) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        match windows.get_mut(&addr.account_key()) {
            Some(entry) => {
                entry.prune(now, self.window);
                entry.requests.len()
            }
            None => 0,
        }
    }

    /// Number of addresses currently tracked
    pub fn tracked(&self) -> usize {
        self.windows.lock().len()
    }

    /// Drop windows that hold no live timestamps and no in-flight slot.
    /// Returns the number of evicted addresses.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    // =========================================================================
    // Clocked internals
    // =========================================================================

    fn decide(&self, entry: &Window, now: Instant) -> Admission {
        let quota = self.quota as usize;
        if entry.used() < quota {
            return Admission::Allow;
        }

        // Oldest recorded entry whose expiry brings usage back under quota
        let must_expire = entry.used() + 1 - quota;
        let retry_after = match entry.requests.get(must_expire - 1) {
            Some(at) => self.window.saturating_sub(now.saturating_duration_since(*at)),
            None => self.window,
        };
        Admission::Reject { retry_after }
    }

    fn check_at(&self, key: &str, now: Instant) -> Admission {
        let mut windows = self.windows.lock();
        match windows.get_mut(key) {
            Some(entry) => {
                entry.prune(now, self.window);
                self.decide(entry, now)
            }
            None => Admission::Allow,
        }
    }

    fn reserve_at(&self, key: &str, now: Instant) -> Admission {
        let mut windows = self.windows.lock();
        let entry = windows.entry(key.to_string()).or_default();
        entry.prune(now, self.window);

        let admission = self.decide(entry, now);
        if admission.is_allowed() {
            entry.in_flight += 1;
        }
        admission
    }

    fn record_at(&self, key: &str, now: Instant) {
        let mut windows = self.windows.lock();
        let entry = windows.entry(key.to_string()).or_default();
        entry.prune(now, self.window);
        entry.requests.push_back(now);
    }

    fn settle(&self, key: &str, commit_at: Option<Instant>) {
        let mut windows = self.windows.lock();
        let Some(entry) = windows.get_mut(key) else {
            return;
        };
        entry.in_flight = entry.in_flight.saturating_sub(1);
        if let Some(now) = commit_at {
            entry.prune(now, self.window);
            entry.requests.push_back(now);
        }
        if entry.is_idle() {
            windows.remove(key);
        }
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, entry| {
            entry.prune(now, self.window);
            !entry.is_idle()
        });
        before - windows.len()
    }
}

/// An admitted request's slot in its address window
#[must_use = "dropping a reservation releases the slot"]
#[derive(Debug)]
pub struct Reservation<'a> {
    limiter: &'a RateLimiter,
    key: String,
    settled: bool,
}

impl Reservation<'_> {
    /// Record the request against the window
    pub fn commit(mut self) {
        self.settled = true;
        self.limiter.settle(&self.key, Some(Instant::now()));
    }

    /// Give the slot back without recording
    pub fn release(mut self) {
        self.settled = true;
        self.limiter.settle(&self.key, None);
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.limiter.settle(&self.key, None);
        }
    }
}
