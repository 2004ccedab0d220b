//! Uniform authenticated request call used by every feature API.
//!
//! Each attempt waits for rate-limit quota, obtains a token, sends the request, and classifies
//! the response. A `401` triggers one forced token refresh per logical request; throttles,
//! server failures, and network failures go through the [`RetryPolicy`].

pub mod request;
pub mod response;

pub use request::*;
pub use response::*;

// std
use std::time::Duration as StdDuration;
// crates.io
use oauth2::{AsyncHttpClient, HttpResponse};
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, Credential, TokenManager},
	config::TransportConfig,
	envelope,
	http::{self, HttpClient, ResponseMetadataSlot},
	oauth::{TOKEN_PATH, TransportErrorMapper},
	obs::{self, OperationKind, OperationOutcome, OperationSpan},
	rate_limit::{RateLimitHeaders, RateLimiter},
	retry::{AttemptOutcome, Decision, RetryPolicy},
	source::{self, SecretSource},
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

/// Transport specialized for the crate's default reqwest stack.
#[cfg(feature = "reqwest")]
pub type ReqwestTransport = Transport<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Authenticated Mimecast API client core.
///
/// Clones share the token manager and the rate limiter.
pub struct Transport<C, M>
where
	C: ?Sized + HttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	base_url: Url,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
	tokens: TokenManager<C, M>,
	rate_limiter: Arc<RateLimiter>,
	retry_policy: RetryPolicy,
	secret_retry: RetryPolicy,
}
impl<C, M> Transport<C, M>
where
	C: ?Sized + HttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Builds a transport around a caller-supplied HTTP client.
	///
	/// Resolves the base URL once; no request is sent until the first call.
	pub fn with_http_client(
		credential: Credential,
		config: &TransportConfig,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let base_url = config.resolve_base_url(credential.region())?;
		let token_url = request::join_path(&base_url, TOKEN_PATH);
		let http_client = http_client.into();
		let error_mapper = error_mapper.into();
		let tokens = TokenManager::new(
			credential,
			token_url,
			Arc::clone(&http_client),
			Arc::clone(&error_mapper),
		)
		.with_retry_policy(config.token_retry.clone())
		.with_safety_margin(config.safety_margin);

		Ok(Self {
			base_url,
			http_client,
			error_mapper,
			tokens,
			rate_limiter: Arc::new(RateLimiter::new(config.rate_limit)),
			retry_policy: config.api_retry.clone(),
			secret_retry: config.secret_retry.clone(),
		})
	}

	/// Loads the credential stored under `key` and builds a transport around it.
	///
	/// The source is queried once; a missing secret fails before any network call.
	pub async fn from_source_with_http_client<S>(
		source: &S,
		key: &str,
		config: &TransportConfig,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self>
	where
		S: ?Sized + SecretSource,
	{
		let credential = source::load_credential(source, key, &config.secret_retry).await?;

		Self::with_http_client(credential, config, http_client, error_mapper)
	}

	/// Resolved API base URL.
	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	/// Token manager shared by every clone.
	pub fn tokens(&self) -> &TokenManager<C, M> {
		&self.tokens
	}

	/// Rate limiter shared by every clone.
	pub fn rate_limiter(&self) -> &RateLimiter {
		&self.rate_limiter
	}

	/// Re-reads the credential from `source` and clears any revocation.
	///
	/// The base URL stays as resolved at construction.
	pub async fn reload<S>(&self, source: &S, key: &str) -> Result<()>
	where
		S: ?Sized + SecretSource,
	{
		let credential = source::load_credential(source, key, &self.secret_retry).await?;

		self.tokens.reload(credential).await;

		Ok(())
	}

	/// `GET path`.
	pub async fn get(&self, path: &str) -> Result<ApiResponse> {
		self.request(ApiRequest::get(path)).await
	}

	/// `POST path` with a JSON body.
	pub async fn post(&self, path: &str, body: Value) -> Result<ApiResponse> {
		self.request(ApiRequest::post(path).with_json(body)).await
	}

	/// `PUT path` with a JSON body.
	pub async fn put(&self, path: &str, body: Value) -> Result<ApiResponse> {
		self.request(ApiRequest::put(path).with_json(body)).await
	}

	/// `DELETE path`.
	pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
		self.request(ApiRequest::delete(path)).await
	}

	/// Sends `request`, retrying per the configured policy.
	pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse> {
		const KIND: OperationKind = OperationKind::Request;

		let span = OperationSpan::new(KIND, "api_request");

		obs::record_operation_outcome(KIND, OperationOutcome::Attempt);

		let result = span.instrument(self.execute(&request)).await;

		match &result {
			Ok(_) => obs::record_operation_outcome(KIND, OperationOutcome::Success),
			Err(_) => obs::record_operation_outcome(KIND, OperationOutcome::Failure),
		}

		result
	}

	async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
		let mut state = self.retry_policy.start(request.is_idempotent());
		let mut forced = None::<Arc<AccessToken>>;
		let mut reauthenticated = false;

		loop {
			// Quota first; the token must still be valid when the request is dispatched.
			self.rate_limiter.acquire().await;

			let token = match forced.take() {
				Some(token) if !token.is_expired_at(OffsetDateTime::now_utc()) => token,
				_ => self.tokens.ensure_valid_token().await?,
			};
			let http_request = request.to_http(&self.base_url, &token)?;
			let slot = ResponseMetadataSlot::default();
			let handle = self.http_client.with_metadata(slot.clone());
			let (outcome, err) = match handle.call(http_request).await {
				Ok(response) => {
					let (status, headers, body) = split(response);
					let retry_after = http::parse_retry_after(&headers);

					self.rate_limiter.observe(
						status,
						RateLimitHeaders::from_headers(&headers),
						retry_after.and_then(|hint| StdDuration::try_from(hint).ok()),
					);

					match status {
						200..=299 => {
							state.next(&AttemptOutcome::Success);

							return Ok(ApiResponse::new(status, headers, body, state.attempts()));
						},
						401 if !reauthenticated => {
							reauthenticated = true;
							state.record_reauth();
							forced = Some(self.tokens.refresh_after_rejection(&token).await?);

							continue;
						},
						401 =>
							return Err(Error::AuthenticationRejected {
								reason: "API rejected a freshly issued token".into(),
								code: serde_json::from_slice::<Value>(&body)
									.ok()
									.as_ref()
									.and_then(envelope::error_code),
								attempts: state.attempts() + 1,
							}),
						_ => classify_status(status, retry_after, &body),
					}
				},
				Err(e) => {
					let err = self.error_mapper.map_transport_error(slot.take().as_ref(), e);
					let outcome = match &err {
						Error::TransportUnavailable { source, .. } =>
							AttemptOutcome::Network { pre_execution: source.is_pre_execution() },
						_ => AttemptOutcome::ClientError,
					};

					(outcome, err)
				},
			};

			match state.next(&outcome) {
				Decision::Retry(delay) => {
					let attempt = state.attempts();

					obs::record_retry(OperationKind::Request, outcome.reason(), attempt, delay);
					tokio::time::sleep(delay).await;
				},
				Decision::Succeed | Decision::Fail =>
					return Err(err.with_attempts(state.attempts())),
			}
		}
	}
}
#[cfg(feature = "reqwest")]
impl Transport<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Builds a reqwest-backed transport honoring the configured request timeout.
	pub fn new(credential: Credential, config: &TransportConfig) -> Result<Self> {
		let http_client = ReqwestHttpClient::new(config.request_timeout)?;

		Self::with_http_client(credential, config, http_client, ReqwestTransportErrorMapper)
	}

	/// Loads the credential from `source` and builds a reqwest-backed transport.
	pub async fn from_source<S>(source: &S, key: &str, config: &TransportConfig) -> Result<Self>
	where
		S: ?Sized + SecretSource,
	{
		let credential = source::load_credential(source, key, &config.secret_retry).await?;

		Self::new(credential, config)
	}
}
impl<C, M> Clone for Transport<C, M>
where
	C: ?Sized + HttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			base_url: self.base_url.clone(),
			http_client: Arc::clone(&self.http_client),
			error_mapper: Arc::clone(&self.error_mapper),
			tokens: self.tokens.clone(),
			rate_limiter: Arc::clone(&self.rate_limiter),
			retry_policy: self.retry_policy.clone(),
			secret_retry: self.secret_retry.clone(),
		}
	}
}
impl<C, M> Debug for Transport<C, M>
where
	C: ?Sized + HttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Transport")
			.field("base_url", &self.base_url.as_str())
			.field("tokens", &self.tokens)
			.field("rate_limit", &self.rate_limiter.snapshot())
			.field("retry_policy", &self.retry_policy)
			.finish()
	}
}

fn split(response: HttpResponse) -> (u16, oauth2::http::HeaderMap, Vec<u8>) {
	let (parts, body) = response.into_parts();

	(parts.status.as_u16(), parts.headers, body)
}

// Maps a non-2xx, non-401 status to its retry class and the error surfaced on exhaustion.
fn classify_status(
	status: u16,
	retry_after: Option<Duration>,
	body: &[u8],
) -> (AttemptOutcome, Error) {
	let code = serde_json::from_slice::<Value>(body).ok().as_ref().and_then(envelope::error_code);
	let body_excerpt = envelope::body_excerpt(body);
	let hint = retry_after.and_then(|hint| StdDuration::try_from(hint).ok());

	match status {
		429 => (
			AttemptOutcome::Throttle { retry_after: hint },
			Error::RateLimited { attempts: 1, retry_after },
		),
		503 => (
			AttemptOutcome::Throttle { retry_after: hint },
			Error::ServerError { status, code, body_excerpt, attempts: 1 },
		),
		500..=599 => (
			AttemptOutcome::ServerError,
			Error::ServerError { status, code, body_excerpt, attempts: 1 },
		),
		_ => (
			AttemptOutcome::ClientError,
			Error::ClientError { status, code, body_excerpt, attempts: 1 },
		),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn statuses_map_to_retry_classes() {
		let (outcome, err) = classify_status(429, Some(Duration::seconds(2)), b"");

		assert_eq!(
			outcome,
			AttemptOutcome::Throttle { retry_after: Some(StdDuration::from_secs(2)) }
		);
		assert!(matches!(err, Error::RateLimited { retry_after: Some(_), .. }));

		let (outcome, err) = classify_status(503, None, b"down");

		assert_eq!(outcome, AttemptOutcome::Throttle { retry_after: None });
		assert_eq!(err.status(), Some(503));

		let (outcome, _) = classify_status(502, None, b"");

		assert_eq!(outcome, AttemptOutcome::ServerError);
	}

	#[test]
	fn client_errors_carry_code_and_excerpt() {
		let body = br#"{"meta":{"status":400},"fail":[{"errors":[{"code":"err_validation_missing","message":"missing field"}]}]}"#;
		let (outcome, err) = classify_status(400, None, body);

		assert_eq!(outcome, AttemptOutcome::ClientError);
		assert_eq!(err.code(), Some("err_validation_missing"));
		assert!(matches!(
			err,
			Error::ClientError { ref body_excerpt, .. } if body_excerpt.contains("missing field")
		));
	}
}
