//! Per-notifier rate limiting
//!
//! Each registered notifier owns one [`RateLimiter`]. A send must first
//! obtain a [`Reservation`]; the reservation is committed when the transport
//! reports success and released otherwise, so failed sends never consume a
//! slot. In-flight reservations count against the window, which keeps
//! concurrent events from overshooting `limits`.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Length of the fixed window `limits` is counted over
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Why a send was intentionally skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SuppressReason {
    /// The notifier is switched off
    Disabled,
    /// The minimum delay since the last successful send has not elapsed
    Delayed {
        #[serde(with = "humantime_serde")]
        remaining: Duration,
    },
    /// The current window already holds `limit` successful sends
    LimitReached { limit: u32 },
}

impl std::fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuppressReason::Disabled => write!(f, "notifier disabled"),
            SuppressReason::Delayed { remaining } => {
                write!(f, "rate limited, next send in {:?}", remaining)
            }
            SuppressReason::LimitReached { limit } => {
                write!(f, "rate limited, {} sends per window reached", limit)
            }
        }
    }
}

#[derive(Debug, Default)]
struct LimiterState {
    last_send: Option<Instant>,
    window_start: Option<Instant>,
    window_count: u32,
    in_flight: u32,
}

/// Minimum-delay and sends-per-window limiter
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    state: Mutex<LimiterState>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_window(RATE_LIMIT_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            state: Mutex::new(LimiterState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve a send slot, or report why the send must be skipped
    ///
    /// `limits == 0` means no per-window cap.
    pub fn try_acquire(
        &self,
        delay: Duration,
        limits: u32,
        now: Instant,
    ) -> Result<Reservation<'_>, SuppressReason> {
        let mut state = self.lock();

        if let Some(start) = state.window_start {
            if now.saturating_duration_since(start) >= self.window {
                state.window_start = None;
                state.window_count = 0;
            }
        }

        if let Some(last) = state.last_send {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < delay {
                return Err(SuppressReason::Delayed {
                    remaining: delay - elapsed,
                });
            }
        }

        // A pending send may still succeed and restart the delay.
        if !delay.is_zero() && state.in_flight > 0 {
            return Err(SuppressReason::Delayed { remaining: delay });
        }

        if limits > 0 && state.window_count + state.in_flight >= limits {
            return Err(SuppressReason::LimitReached { limit: limits });
        }

        state.in_flight += 1;
        Ok(Reservation {
            limiter: self,
            settled: false,
        })
    }

    /// Successful sends counted in the current window
    pub fn sends_in_window(&self) -> u32 {
        self.lock().window_count
    }

    /// Forget all send history
    pub fn reset(&self) {
        let mut state = self.lock();
        let in_flight = state.in_flight;
        *state = LimiterState {
            in_flight,
            ..LimiterState::default()
        };
    }
}

/// A reserved send slot
///
/// Dropping a reservation without calling [`Reservation::commit`] releases
/// the slot, which covers failed, timed-out and cancelled sends alike.
#[derive(Debug)]
pub struct Reservation<'a> {
    limiter: &'a RateLimiter,
    settled: bool,
}

impl Reservation<'_> {
    /// Record a successful send at `now`
    pub fn commit(mut self, now: Instant) {
        let mut state = self.limiter.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        // The window may have expired while the send was in flight.
        let expired = state
            .window_start
            .is_some_and(|start| now.saturating_duration_since(start) >= self.limiter.window);
        if expired || state.window_start.is_none() {
            state.window_start = Some(now);
            state.window_count = 0;
        }
        state.window_count += 1;
        state.last_send = Some(now);
        self.settled = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let mut state = self.limiter.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
    }
}
