//! Access-token lifecycle: proactive refresh, singleflight exchanges, and revocation.
//!
//! The manager moves through `Unauthenticated → Authenticating → Valid → Expiring →
//! Authenticating → …`, ending in `Revoked` when the token endpoint refuses the credential.
//! Reading an already-valid token takes a short read lock and never waits on an exchange.
//! At most one exchange is in flight; it runs on a spawned task that owns the exchange lock,
//! so it finishes and stores its result even if every caller waiting on it is cancelled.

mod metrics;

pub use metrics::ExchangeMetrics;

// std
use std::{
	sync::atomic::{AtomicBool, Ordering},
	time::Duration as StdDuration,
};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, Credential, TokenStatus},
	error::TransientError,
	http::HttpClient,
	oauth::{BasicFacade, TransportErrorMapper},
	obs::{self, OperationKind, OperationOutcome, OperationSpan},
	retry::{AttemptOutcome, Decision, RetryPolicy},
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

/// Token manager specialized for the crate's default reqwest transport stack.
#[cfg(feature = "reqwest")]
pub type ReqwestTokenManager = TokenManager<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Lifecycle position of a [`TokenManager`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenManagerState {
	/// No token has been obtained yet.
	Unauthenticated,
	/// An exchange is in flight.
	Authenticating,
	/// A token is cached and outside the safety margin.
	Valid,
	/// The cached token is inside the safety margin or expired.
	Expiring,
	/// The credential was refused; every call fails until it is reloaded.
	Revoked,
}

#[derive(Default)]
struct TokenSlot {
	token: Option<Arc<AccessToken>>,
	revoked: Option<String>,
	// Bumped when a token is stored or the credential is reloaded.
	generation: u64,
	// Bumped when any exchange finishes, successful or not.
	exchanges: u64,
	// Outcome of the last exchange if it failed, tagged with its `exchanges` value.
	failure: Option<(u64, Error)>,
}
impl TokenSlot {
	fn epoch(&self) -> Epoch {
		Epoch { generation: self.generation, exchanges: self.exchanges }
	}

	fn rejection(&self) -> Option<Error> {
		self.revoked.as_ref().map(|reason| Error::rejected(reason.clone(), 0))
	}

	// Result of an exchange that finished after `seen` was observed, if any.
	fn settled_since(&self, seen: Epoch) -> Option<Result<Arc<AccessToken>>> {
		if self.exchanges == seen.exchanges && self.generation == seen.generation {
			return None;
		}
		if self.generation != seen.generation {
			let fresh =
				self.token.as_ref().filter(|token| !token.is_expired_at(OffsetDateTime::now_utc()));

			if let Some(token) = fresh {
				return Some(Ok(Arc::clone(token)));
			}
		}

		match &self.failure {
			Some((epoch, err)) if *epoch > seen.exchanges => Some(Err(err.replay())),
			_ => None,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Epoch {
	generation: u64,
	exchanges: u64,
}

struct Shared<C, M>
where
	C: ?Sized + HttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	http_client: Arc<C>,
	error_mapper: Arc<M>,
	token_url: Url,
	credential: RwLock<Arc<Credential>>,
	slot: RwLock<TokenSlot>,
	exchange_lock: Arc<AsyncMutex<()>>,
	in_flight: AtomicBool,
	metrics: ExchangeMetrics,
}
impl<C, M> Shared<C, M>
where
	C: ?Sized + HttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	async fn run_exchange(&self, policy: &RetryPolicy) -> Result<Arc<AccessToken>> {
		const KIND: OperationKind = OperationKind::TokenExchange;

		let span = OperationSpan::new(KIND, "client_credentials");

		obs::record_operation_outcome(KIND, OperationOutcome::Attempt);
		self.in_flight.store(true, Ordering::SeqCst);

		let result = span
			.instrument(async {
				let credential = Arc::clone(&self.credential.read());
				let facade: BasicFacade<C, M> = BasicFacade::new(
					&credential,
					&self.token_url,
					Arc::clone(&self.http_client),
					Arc::clone(&self.error_mapper),
				);
				let mut state = policy.start(true);

				loop {
					self.metrics.record_attempt();

					let err = match facade.exchange_client_credentials().await {
						Ok(token) => return Ok(token),
						Err(err) => err,
					};
					let outcome = classify_exchange_error(&err);

					match state.next(&outcome) {
						Decision::Retry(delay) => {
							obs::record_retry(KIND, outcome.reason(), state.attempts(), delay);
							tokio::time::sleep(delay).await;
						},
						Decision::Succeed | Decision::Fail =>
							return Err(exhausted(err, &outcome, state.attempts())),
					}
				}
			})
			.await;

		self.in_flight.store(false, Ordering::SeqCst);

		match result {
			Ok(token) => {
				let token = Arc::new(token);
				let mut slot = self.slot.write();

				slot.token = Some(Arc::clone(&token));
				slot.generation += 1;
				slot.exchanges += 1;
				slot.failure = None;

				drop(slot);
				self.metrics.record_success();
				obs::record_operation_outcome(KIND, OperationOutcome::Success);

				Ok(token)
			},
			Err(err) => {
				let mut slot = self.slot.write();

				if let Error::AuthenticationRejected { reason, .. } = &err {
					slot.token = None;
					slot.revoked = Some(reason.clone());
				}

				slot.exchanges += 1;
				slot.failure = Some((slot.exchanges, err.replay()));

				drop(slot);
				self.metrics.record_failure();
				obs::record_operation_outcome(KIND, OperationOutcome::Failure);

				Err(err)
			},
		}
	}
}

/// Owns the access token for one client and exchanges credentials on demand.
///
/// Clones share the token, the credential, and the exchange lock. Exchanges are spawned on the
/// ambient tokio runtime.
pub struct TokenManager<C, M>
where
	C: ?Sized + HttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	shared: Arc<Shared<C, M>>,
	retry_policy: RetryPolicy,
	safety_margin: Duration,
}
impl<C, M> TokenManager<C, M>
where
	C: ?Sized + HttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Default time before expiry at which a token is refreshed.
	pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::seconds(60);

	/// Creates a manager for `credential` against the token endpoint at `token_url`.
	///
	/// Nothing is sent until a token is first demanded.
	pub fn new(
		credential: Credential,
		token_url: Url,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Self {
		let shared = Shared {
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
			token_url,
			credential: RwLock::new(Arc::new(credential)),
			slot: RwLock::new(TokenSlot::default()),
			exchange_lock: Arc::new(AsyncMutex::new(())),
			in_flight: AtomicBool::new(false),
			metrics: ExchangeMetrics::default(),
		};

		Self {
			shared: Arc::new(shared),
			retry_policy: RetryPolicy::default(),
			safety_margin: Self::DEFAULT_SAFETY_MARGIN,
		}
	}

	/// Overrides the retry policy applied to exchanges.
	pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
		self.retry_policy = policy;

		self
	}

	/// Overrides the safety margin; negative values are treated as zero.
	pub fn with_safety_margin(mut self, margin: Duration) -> Self {
		self.safety_margin = if margin.is_negative() { Duration::ZERO } else { margin };

		self
	}

	/// Token endpoint URL.
	pub fn token_url(&self) -> &Url {
		&self.shared.token_url
	}

	/// Configured safety margin.
	pub fn safety_margin(&self) -> Duration {
		self.safety_margin
	}

	/// Exchange counters.
	pub fn metrics(&self) -> &ExchangeMetrics {
		&self.shared.metrics
	}

	/// Credential currently used for exchanges.
	pub fn credential(&self) -> Arc<Credential> {
		Arc::clone(&self.shared.credential.read())
	}

	/// Cached token, valid or not.
	pub fn current_token(&self) -> Option<Arc<AccessToken>> {
		self.shared.slot.read().token.clone()
	}

	/// Current lifecycle position.
	pub fn state(&self) -> TokenManagerState {
		let slot = self.shared.slot.read();

		if slot.revoked.is_some() {
			return TokenManagerState::Revoked;
		}
		if self.shared.in_flight.load(Ordering::SeqCst) {
			return TokenManagerState::Authenticating;
		}

		match &slot.token {
			None => TokenManagerState::Unauthenticated,
			Some(token) => match token.status_at(OffsetDateTime::now_utc(), self.safety_margin) {
				TokenStatus::Valid => TokenManagerState::Valid,
				TokenStatus::Expiring | TokenStatus::Expired => TokenManagerState::Expiring,
			},
		}
	}

	/// Returns a token that is valid beyond the safety margin, exchanging if needed.
	///
	/// Concurrent callers share one in-flight exchange, including its failure: callers that
	/// were already waiting when an exchange fails receive that failure instead of starting
	/// another exchange.
	pub async fn ensure_valid_token(&self) -> Result<Arc<AccessToken>> {
		let seen = {
			let slot = self.shared.slot.read();

			if let Some(err) = slot.rejection() {
				return Err(err);
			}
			if let Some(token) = slot
				.token
				.as_ref()
				.filter(|token| token.is_valid_at(OffsetDateTime::now_utc(), self.safety_margin))
			{
				return Ok(Arc::clone(token));
			}

			slot.epoch()
		};

		self.exchange(seen).await
	}

	/// Forces one exchange after the API rejected `stale`, unless another caller already
	/// replaced it.
	pub async fn refresh_after_rejection(
		&self,
		stale: &Arc<AccessToken>,
	) -> Result<Arc<AccessToken>> {
		let seen = {
			let slot = self.shared.slot.read();

			if let Some(err) = slot.rejection() {
				return Err(err);
			}

			match &slot.token {
				Some(current)
					if !Arc::ptr_eq(current, stale)
						&& !current.is_expired_at(OffsetDateTime::now_utc()) =>
					return Ok(Arc::clone(current)),
				_ => slot.epoch(),
			}
		};

		self.exchange(seen).await
	}

	/// Replaces the credential, drops the cached token, and clears any revocation.
	///
	/// Waits for an in-flight exchange so its result cannot overwrite the reload.
	pub async fn reload(&self, credential: Credential) {
		let _guard = self.shared.exchange_lock.lock().await;

		*self.shared.credential.write() = Arc::new(credential);

		let mut slot = self.shared.slot.write();

		slot.token = None;
		slot.revoked = None;
		slot.failure = None;
		slot.generation += 1;
	}

	async fn exchange(&self, seen: Epoch) -> Result<Arc<AccessToken>> {
		let guard = self.shared.exchange_lock.lock_arc().await;

		{
			let slot = self.shared.slot.read();

			if let Some(err) = slot.rejection() {
				return Err(err);
			}
			// An exchange finished while this caller waited for the lock.
			if let Some(result) = slot.settled_since(seen) {
				return result;
			}
		}

		let shared = Arc::clone(&self.shared);
		let policy = self.retry_policy.clone();
		let task = tokio::spawn(async move {
			let _guard = guard;

			shared.run_exchange(&policy).await
		});

		task.await.map_err(|e| {
			Error::from(TransientError::TokenEndpoint {
				message: format!("Token exchange task failed: {e}"),
				status: None,
				retry_after: None,
				attempts: 0,
			})
		})?
	}
}
impl<C, M> Clone for TokenManager<C, M>
where
	C: ?Sized + HttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			shared: Arc::clone(&self.shared),
			retry_policy: self.retry_policy.clone(),
			safety_margin: self.safety_margin,
		}
	}
}
impl<C, M> Debug for TokenManager<C, M>
where
	C: ?Sized + HttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("token_url", &self.shared.token_url.as_str())
			.field("credential", &self.credential())
			.field("state", &self.state())
			.field("safety_margin", &self.safety_margin)
			.finish()
	}
}

fn classify_exchange_error(err: &Error) -> AttemptOutcome {
	match err {
		Error::Transient(TransientError::TokenEndpoint {
			status: Some(429 | 503),
			retry_after,
			..
		}) => AttemptOutcome::Throttle {
			retry_after: retry_after.and_then(|hint| StdDuration::try_from(hint).ok()),
		},
		Error::Transient(_) => AttemptOutcome::ServerError,
		Error::TransportUnavailable { source, .. } =>
			AttemptOutcome::Network { pre_execution: source.is_pre_execution() },
		Error::AuthenticationRejected { .. } => AttemptOutcome::AuthError,
		_ => AttemptOutcome::ClientError,
	}
}

fn exhausted(err: Error, outcome: &AttemptOutcome, attempts: u32) -> Error {
	match (&err, outcome) {
		(
			Error::Transient(TransientError::TokenEndpoint {
				status: Some(429),
				retry_after,
				..
			}),
			AttemptOutcome::Throttle { .. },
		) => Error::RateLimited { attempts, retry_after: *retry_after },
		_ => err.with_attempts(attempts),
	}
}
