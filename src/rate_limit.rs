//! Client-wide request quota.
//!
//! Mimecast publishes the caller's budget through `X-MC-Rate-Limit*` headers. When they are
//! present they are authoritative; otherwise a local fixed-window bucket stands in. Quota is
//! reserved under the lock before dispatch, so concurrent callers never overdraw it.

// std
use std::time::Duration as StdDuration;
// crates.io
use oauth2::http::HeaderMap;
use tokio::time::Instant;
// self
use crate::{_prelude::*, obs};

/// Total requests allowed in the current window.
pub const LIMIT_HEADER: &str = "x-mc-rate-limit";
/// Requests left in the current window.
pub const REMAINING_HEADER: &str = "x-mc-rate-limit-remaining";
/// Window reset, as epoch seconds or delta seconds.
pub const RESET_HEADER: &str = "x-mc-rate-limit-reset";

// Reset values below this are treated as relative seconds rather than a Unix timestamp.
const EPOCH_FLOOR: u64 = 1_000_000_000;

/// Local fallback budget used until the server reports its own numbers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitBudget {
	/// Requests allowed per window.
	pub capacity: u64,
	/// Window length.
	pub window: StdDuration,
}
impl Default for RateLimitBudget {
	fn default() -> Self {
		Self { capacity: 100, window: StdDuration::from_secs(60) }
	}
}

/// Parsed `X-MC-Rate-Limit*` headers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RateLimitHeaders {
	/// Window capacity.
	pub limit: Option<u64>,
	/// Remaining requests.
	pub remaining: Option<u64>,
	/// Raw reset value.
	pub reset: Option<u64>,
}
impl RateLimitHeaders {
	/// Reads the headers; `None` when none of them is present.
	pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
		let read = |name: &str| headers.get(name)?.to_str().ok()?.trim().parse::<u64>().ok();
		let parsed = Self {
			limit: read(LIMIT_HEADER),
			remaining: read(REMAINING_HEADER),
			reset: read(RESET_HEADER),
		};

		if parsed == Self::default() { None } else { Some(parsed) }
	}

	/// Time until the window resets, measured from now.
	pub fn reset_in(&self) -> Option<StdDuration> {
		let raw = self.reset?;

		if raw < EPOCH_FLOOR {
			return Some(StdDuration::from_secs(raw));
		}

		let now = u64::try_from(OffsetDateTime::now_utc().unix_timestamp()).unwrap_or_default();

		Some(StdDuration::from_secs(raw.saturating_sub(now)))
	}
}

/// Snapshot of the limiter's state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitState {
	/// Requests that may still be dispatched before `reset_at`.
	pub remaining: u64,
	/// Window capacity.
	pub limit: u64,
	/// Instant the window resets.
	pub reset_at: Instant,
	/// Throttle or server failures since the last success.
	pub consecutive_failures: u32,
	/// Whether the numbers came from server headers.
	pub authoritative: bool,
}

/// Result emitted by [`RateLimiter::try_acquire`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
	/// One unit of quota was reserved; the request may proceed.
	Allow,
	/// No quota is left; retry after the delay.
	Delay(StdDuration),
}

/// Shared quota gate; one per client, shared by every clone.
#[derive(Debug)]
pub struct RateLimiter {
	budget: RateLimitBudget,
	state: Mutex<RateLimitState>,
}
impl RateLimiter {
	/// Creates a limiter starting from the fallback budget.
	pub fn new(budget: RateLimitBudget) -> Self {
		let state = RateLimitState {
			remaining: budget.capacity,
			limit: budget.capacity,
			reset_at: Instant::now() + budget.window,
			consecutive_failures: 0,
			authoritative: false,
		};

		Self { budget, state: Mutex::new(state) }
	}

	/// Returns a copy of the current state.
	pub fn snapshot(&self) -> RateLimitState {
		*self.state.lock()
	}

	/// Reserves one unit of quota, or reports how long to wait for the next window.
	pub fn try_acquire(&self) -> RateLimitDecision {
		let now = Instant::now();
		let mut state = self.state.lock();

		if now >= state.reset_at {
			// The described window is over; refill and wait for fresh server numbers.
			state.limit = if state.authoritative { state.limit } else { self.budget.capacity };
			state.remaining = state.limit;
			state.reset_at = now + self.budget.window;
			state.authoritative = false;
		}
		if state.remaining == 0 {
			return RateLimitDecision::Delay(state.reset_at - now);
		}

		state.remaining -= 1;

		RateLimitDecision::Allow
	}

	/// Waits until one unit of quota is reserved.
	pub async fn acquire(&self) {
		loop {
			match self.try_acquire() {
				RateLimitDecision::Allow => return,
				RateLimitDecision::Delay(delay) => {
					obs::record_rate_limit_wait(delay, self.snapshot().authoritative);
					tokio::time::sleep(delay).await;
				},
			}
		}
	}

	/// Folds a response into the state.
	///
	/// Server headers replace the local numbers. A 429 zeroes the quota and pushes the reset
	/// to at least now + `retry_after`; without server numbers the reset becomes exactly that.
	pub fn observe(
		&self,
		status: u16,
		headers: Option<RateLimitHeaders>,
		retry_after: Option<StdDuration>,
	) {
		let now = Instant::now();
		let mut state = self.state.lock();

		if let Some(headers) = headers {
			if let Some(limit) = headers.limit {
				state.limit = limit;
			}
			if let Some(remaining) = headers.remaining {
				state.remaining = remaining;
			}
			if let Some(reset_in) = headers.reset_in() {
				state.reset_at = now + reset_in;
			}

			state.authoritative = true;
		}

		match status {
			429 => {
				state.remaining = 0;
				state.consecutive_failures += 1;

				let floor = now + retry_after.unwrap_or_default();

				// A local window is a guess; the server's hint replaces it outright.
				if !state.authoritative || state.reset_at < floor {
					state.reset_at = floor;
				}
			},
			500..=599 => state.consecutive_failures += 1,
			200..=299 => state.consecutive_failures = 0,
			_ => {},
		}
	}
}
impl Default for RateLimiter {
	fn default() -> Self {
		Self::new(RateLimitBudget::default())
	}
}
