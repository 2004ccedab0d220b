//! Per-attempt retry state machine shared by API requests, token exchanges, and secret loads.
//!
//! Each logical operation owns a [`RetryState`]. After every attempt the caller classifies the
//! result into an [`AttemptOutcome`] and asks the state for a [`Decision`]: succeed, wait and
//! retry, or fail with the last classified error.

// std
use std::time::Duration as StdDuration;
// crates.io
use rand::Rng;
use tokio::time::Instant;

/// Bounded exponential backoff configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Total attempts allowed for one logical operation, the first try included.
	pub max_attempts: u32,
	/// Retries allowed for non-throttle server failures (500/502/504).
	pub max_server_retries: u32,
	/// Base delay for the first retry of a failure class.
	pub min_backoff: StdDuration,
	/// Upper bound for computed backoff delays.
	pub max_backoff: StdDuration,
	/// Wall-clock budget for the whole operation, waits included.
	pub max_elapsed: StdDuration,
	/// Whether computed delays are scaled by a random factor in `[0.5, 1.5)`.
	pub jitter: bool,
}
impl RetryPolicy {
	/// Policy that never retries.
	pub fn none() -> Self {
		Self { max_attempts: 1, max_server_retries: 0, ..Self::default() }
	}

	/// Overrides the attempt ceiling; values below one are clamped to one.
	pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
		self.max_attempts = max_attempts.max(1);

		self
	}

	/// Overrides the server-failure retry ceiling.
	pub fn with_max_server_retries(mut self, retries: u32) -> Self {
		self.max_server_retries = retries;

		self
	}

	/// Overrides the backoff bounds.
	pub fn with_backoff(mut self, min: StdDuration, max: StdDuration) -> Self {
		self.min_backoff = min;
		self.max_backoff = max.max(min);

		self
	}

	/// Overrides the elapsed-time budget.
	pub fn with_max_elapsed(mut self, budget: StdDuration) -> Self {
		self.max_elapsed = budget;

		self
	}

	/// Enables or disables jitter.
	pub fn with_jitter(mut self, jitter: bool) -> Self {
		self.jitter = jitter;

		self
	}

	/// Computes the delay before retrying the `n`-th (0-based) failure of one class.
	pub fn backoff(&self, n: u32) -> StdDuration {
		let factor = 2_u32.saturating_pow(n.min(31));
		let delay = self.min_backoff.saturating_mul(factor).min(self.max_backoff);

		if self.jitter && !delay.is_zero() {
			delay.mul_f64(rand::rng().random_range(0.5..1.5))
		} else {
			delay
		}
	}

	/// Starts tracking a new logical operation.
	pub fn start(&self, idempotent: bool) -> RetryState<'_> {
		RetryState {
			policy: self,
			idempotent,
			started: Instant::now(),
			attempts: 0,
			throttle_failures: 0,
			server_failures: 0,
			network_failures: 0,
		}
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 4,
			max_server_retries: 3,
			min_backoff: StdDuration::from_secs(1),
			max_backoff: StdDuration::from_secs(60),
			max_elapsed: StdDuration::from_secs(120),
			jitter: true,
		}
	}
}

/// Classification of a single attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
	/// 2xx response or otherwise usable result.
	Success,
	/// Request was rejected as malformed or forbidden; never retried.
	ClientError,
	/// Credentials were rejected; retried only through the token manager's forced refresh.
	AuthError,
	/// 429 or 503; the server asked the caller to slow down.
	Throttle {
		/// Server-supplied wait, when present.
		retry_after: Option<StdDuration>,
	},
	/// 500, 502, 504 or another 5xx.
	ServerError,
	/// The request failed below HTTP.
	Network {
		/// `true` when the server certainly never saw the request.
		pre_execution: bool,
	},
}
impl AttemptOutcome {
	/// Stable label for retry events.
	pub const fn reason(&self) -> &'static str {
		match self {
			Self::Success => "success",
			Self::ClientError => "client_error",
			Self::AuthError => "auth_error",
			Self::Throttle { .. } => "throttle",
			Self::ServerError => "server_error",
			Self::Network { .. } => "network",
		}
	}
}

/// What to do after an attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
	/// Return the attempt's result.
	Succeed,
	/// Wait for the delay and try again.
	Retry(StdDuration),
	/// Surface the attempt's classified error.
	Fail,
}

/// Retry bookkeeping for one logical operation.
#[derive(Debug)]
pub struct RetryState<'p> {
	policy: &'p RetryPolicy,
	idempotent: bool,
	started: Instant,
	attempts: u32,
	throttle_failures: u32,
	server_failures: u32,
	network_failures: u32,
}
impl RetryState<'_> {
	/// Attempts recorded so far.
	pub fn attempts(&self) -> u32 {
		self.attempts
	}

	/// Records an attempt that is retried outside the policy, such as the single re-send
	/// after a forced token refresh.
	pub fn record_reauth(&mut self) {
		self.attempts += 1;
	}

	/// Records an attempt and decides what happens next.
	pub fn next(&mut self, outcome: &AttemptOutcome) -> Decision {
		self.attempts += 1;

		let delay = match outcome {
			AttemptOutcome::Success => return Decision::Succeed,
			AttemptOutcome::ClientError | AttemptOutcome::AuthError => return Decision::Fail,
			AttemptOutcome::Throttle { retry_after } => {
				self.throttle_failures += 1;

				match retry_after {
					Some(hint) => *hint,
					None => self.policy.backoff(self.throttle_failures - 1),
				}
			},
			AttemptOutcome::ServerError => {
				self.server_failures += 1;

				if !self.idempotent || self.server_failures > self.policy.max_server_retries {
					return Decision::Fail;
				}

				self.policy.backoff(self.server_failures - 1)
			},
			AttemptOutcome::Network { pre_execution } => {
				self.network_failures += 1;

				if !self.idempotent && !pre_execution {
					return Decision::Fail;
				}

				self.policy.backoff(self.network_failures - 1)
			},
		};

		if self.attempts >= self.policy.max_attempts {
			return Decision::Fail;
		}
		if self.started.elapsed().saturating_add(delay) > self.policy.max_elapsed {
			return Decision::Fail;
		}

		Decision::Retry(delay)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn policy() -> RetryPolicy {
		RetryPolicy::default().with_jitter(false)
	}

	#[test]
	fn backoff_doubles_and_caps() {
		let policy = policy();

		assert_eq!(policy.backoff(0), StdDuration::from_secs(1));
		assert_eq!(policy.backoff(3), StdDuration::from_secs(8));
		assert_eq!(policy.backoff(10), StdDuration::from_secs(60));
		assert_eq!(policy.backoff(u32::MAX), StdDuration::from_secs(60));
	}

	#[test]
	fn jitter_stays_within_half_to_one_and_a_half() {
		let policy = RetryPolicy::default();

		for _ in 0..64 {
			let delay = policy.backoff(2);

			assert!(delay >= StdDuration::from_secs(2));
			assert!(delay < StdDuration::from_secs(6));
		}
	}

	#[tokio::test(start_paused = true)]
	async fn retry_after_takes_precedence_over_backoff() {
		let policy = policy();
		let mut state = policy.start(true);
		let throttle = AttemptOutcome::Throttle { retry_after: Some(StdDuration::from_secs(7)) };

		assert_eq!(state.next(&throttle), Decision::Retry(StdDuration::from_secs(7)));
		assert_eq!(
			state.next(&AttemptOutcome::Throttle { retry_after: None }),
			Decision::Retry(StdDuration::from_secs(2))
		);
		assert_eq!(state.next(&AttemptOutcome::Success), Decision::Succeed);
		assert_eq!(state.attempts(), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn attempt_ceiling_stops_retries() {
		let policy = policy();
		let mut state = policy.start(true);

		assert!(matches!(state.next(&AttemptOutcome::ServerError), Decision::Retry(_)));
		assert!(matches!(state.next(&AttemptOutcome::ServerError), Decision::Retry(_)));
		assert!(matches!(state.next(&AttemptOutcome::ServerError), Decision::Retry(_)));
		assert_eq!(state.next(&AttemptOutcome::ServerError), Decision::Fail);
		assert_eq!(state.attempts(), 4);
	}

	#[tokio::test(start_paused = true)]
	async fn server_retries_have_their_own_ceiling() {
		let policy = policy().with_max_attempts(10).with_max_server_retries(1);
		let mut state = policy.start(true);

		assert!(matches!(
			state.next(&AttemptOutcome::Throttle { retry_after: None }),
			Decision::Retry(_)
		));
		assert!(matches!(state.next(&AttemptOutcome::ServerError), Decision::Retry(_)));
		assert_eq!(state.next(&AttemptOutcome::ServerError), Decision::Fail);
	}

	#[tokio::test(start_paused = true)]
	async fn client_and_auth_errors_never_retry() {
		let policy = policy();

		assert_eq!(policy.start(true).next(&AttemptOutcome::ClientError), Decision::Fail);
		assert_eq!(policy.start(true).next(&AttemptOutcome::AuthError), Decision::Fail);
	}

	#[tokio::test(start_paused = true)]
	async fn non_idempotent_calls_retry_only_pre_execution_failures() {
		let policy = policy();

		assert_eq!(
			policy.start(false).next(&AttemptOutcome::Network { pre_execution: false }),
			Decision::Fail
		);
		assert_eq!(policy.start(false).next(&AttemptOutcome::ServerError), Decision::Fail);
		assert!(matches!(
			policy.start(false).next(&AttemptOutcome::Network { pre_execution: true }),
			Decision::Retry(_)
		));
		assert!(matches!(
			policy.start(false).next(&AttemptOutcome::Throttle { retry_after: None }),
			Decision::Retry(_)
		));
	}

	#[tokio::test(start_paused = true)]
	async fn waits_that_overrun_the_budget_are_not_taken() {
		let policy = policy().with_max_elapsed(StdDuration::from_secs(10));
		let mut state = policy.start(true);

		tokio::time::advance(StdDuration::from_secs(8)).await;

		assert_eq!(
			state.next(&AttemptOutcome::Throttle { retry_after: Some(StdDuration::from_secs(5)) }),
			Decision::Fail
		);
	}
}
