//! Token endpoint facade built on the `oauth2` crate.
//!
//! The facade performs a single client-credentials exchange and classifies every failure into
//! the client's error taxonomy; retries and singleflight live in
//! [`TokenManager`](crate::auth::TokenManager).

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, HttpClientError,
	RequestTokenError, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, Credential},
	envelope,
	error::{ConfigError, TransientError, TransportError},
	http::{HttpClient, ResponseMetadata, ResponseMetadataSlot},
};

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Token endpoint path relative to the API base URL.
pub const TOKEN_PATH: &str = "oauth/token";

/// OAuth error codes that mean the credential itself was refused.
pub const CREDENTIAL_ERRORS: [&str; 4] =
	["invalid_client", "unauthorized_client", "invalid_grant", "access_denied"];

/// Maps HTTP transport failures into client [`Error`] values.
///
/// Implementations decide which stack failures happened before the server saw the request
/// ([`TransportError::Connect`]) and which are ambiguous.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a client error.
	fn map_transport_error(
		&self,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		_meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) if inner.is_builder() =>
				ConfigError::from(*inner).into(),
			HttpClientError::Reqwest(inner) => TransportError::from(*inner).into(),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) =>
				TransportError::network(std::io::Error::other(message)).into(),
			_ => TransportError::network(std::io::Error::other("unknown HTTP client failure"))
				.into(),
		}
	}
}

pub(crate) struct BasicFacade<C, M>
where
	C: ?Sized + HttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredBasicClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> BasicFacade<C, M>
where
	C: ?Sized + HttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Configures a client that posts the credential in the form body.
	pub(crate) fn new(
		credential: &Credential,
		token_url: &Url,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
	) -> Self {
		let oauth_client = BasicClient::new(ClientId::new(credential.client_id().to_owned()))
			.set_client_secret(ClientSecret::new(credential.client_secret().expose().to_owned()))
			.set_token_uri(TokenUrl::from_url(token_url.clone()))
			.set_auth_type(AuthType::RequestBody);

		Self { oauth_client, http_client, error_mapper }
	}

	/// Performs one `client_credentials` exchange.
	pub(crate) fn exchange_client_credentials(&self) -> FacadeFuture<'_, AccessToken> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let response = self
				.oauth_client
				.exchange_client_credentials()
				.request_async(&instrumented)
				.await
				.map_err(|err| map_request_error(meta.take(), err, self.error_mapper.as_ref()))?;

			map_token_response(response)
		})
	}
}

fn map_token_response(response: BasicTokenResponse) -> Result<AccessToken> {
	let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
	let expires_in = i64::try_from(expires_in).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

	if expires_in <= 0 {
		return Err(ConfigError::NonPositiveExpiresIn.into());
	}

	AccessToken::builder()
		.value(response.access_token().secret().to_owned())
		.issued_at(OffsetDateTime::now_utc())
		.expires_in(Duration::seconds(expires_in))
		.build()
		.map_err(|err| ConfigError::from(err).into())
}

fn map_request_error<E, M>(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) =>
			map_server_response_error(response, meta_ref),
		RequestTokenError::Request(error) => mapper.map_transport_error(meta_ref, error),
		RequestTokenError::Parse(error, body) =>
			map_status_error(meta_ref, "Token endpoint returned an unreadable error body", &body)
				.unwrap_or_else(|| {
					TransientError::TokenResponseParse {
						source: error,
						status: meta_status(meta_ref),
						attempts: 1,
					}
					.into()
				}),
		RequestTokenError::Other(message) =>
			map_status_error(meta_ref, &message, &[]).unwrap_or_else(|| {
				TransientError::TokenEndpoint {
					message,
					status: meta_status(meta_ref),
					retry_after: meta_retry_after(meta_ref),
					attempts: 1,
				}
				.into()
			}),
	}
}

fn map_server_response_error(
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let code = response.error().as_ref().to_string();
	let message = match response.error_description() {
		Some(description) => format!("{code}: {description}"),
		None => code.clone(),
	};

	let status = meta_status(meta);

	if CREDENTIAL_ERRORS.contains(&code.as_str()) || matches!(status, Some(401 | 403)) {
		return Error::AuthenticationRejected { reason: message, code: Some(code), attempts: 1 };
	}

	match status {
		Some(status) if status == 429 || status >= 500 => TransientError::TokenEndpoint {
			message,
			status: Some(status),
			retry_after: meta_retry_after(meta),
			attempts: 1,
		}
		.into(),
		status => Error::ClientError {
			status: status.unwrap_or(400),
			code: Some(code),
			body_excerpt: message,
			attempts: 1,
		},
	}
}

// Classifies a token-endpoint failure by HTTP status alone; `None` for 2xx or unknown status.
fn map_status_error(
	meta: Option<&ResponseMetadata>,
	message: &str,
	body: &[u8],
) -> Option<Error> {
	let status = meta_status(meta)?;
	let error = match status {
		401 | 403 => Error::AuthenticationRejected {
			reason: format!("token endpoint returned HTTP {status}"),
			code: serde_json::from_slice(body).ok().as_ref().and_then(envelope::error_code),
			attempts: 1,
		},
		429 | 500..=599 => TransientError::TokenEndpoint {
			message: message.to_owned(),
			status: Some(status),
			retry_after: meta_retry_after(meta),
			attempts: 1,
		}
		.into(),
		400..=499 => Error::ClientError {
			status,
			code: serde_json::from_slice(body).ok().as_ref().and_then(envelope::error_code),
			body_excerpt: envelope::body_excerpt(body),
			attempts: 1,
		},
		_ => return None,
	};

	Some(error)
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::{
		AccessToken as OAuthAccessToken, EmptyExtraTokenFields, StandardErrorResponse,
		basic::{BasicErrorResponseType, BasicTokenType},
	};
	// self
	use super::*;

	fn meta(status: u16) -> ResponseMetadata {
		ResponseMetadata { status: Some(status), retry_after: Some(Duration::seconds(4)) }
	}

	fn error_response(kind: BasicErrorResponseType) -> BasicErrorResponse {
		StandardErrorResponse::new(kind, Some("described".into()), None)
	}

	#[test]
	fn credential_errors_reject_authentication() {
		for kind in [
			BasicErrorResponseType::InvalidClient,
			BasicErrorResponseType::UnauthorizedClient,
			BasicErrorResponseType::InvalidGrant,
			BasicErrorResponseType::Extension("access_denied".into()),
		] {
			let err = map_server_response_error(error_response(kind), Some(&meta(400)));

			assert!(matches!(err, Error::AuthenticationRejected { .. }), "{err:?}");
			assert!(err.code().is_some());
		}
	}

	#[test]
	fn other_oauth_errors_are_client_errors() {
		let err = map_server_response_error(
			error_response(BasicErrorResponseType::InvalidRequest),
			Some(&meta(400)),
		);

		assert!(matches!(
			err,
			Error::ClientError { status: 400, code: Some(ref code), attempts: 1, .. }
				if code == "invalid_request"
		));
	}

	#[test]
	fn throttled_oauth_errors_are_transient() {
		let err = map_server_response_error(
			error_response(BasicErrorResponseType::Extension("temporarily_unavailable".into())),
			Some(&meta(503)),
		);

		assert!(matches!(
			err,
			Error::Transient(TransientError::TokenEndpoint { status: Some(503), retry_after, .. })
				if retry_after == Some(Duration::seconds(4))
		));
	}

	#[test]
	fn bare_statuses_are_classified() {
		assert!(matches!(
			map_status_error(Some(&meta(401)), "nope", b""),
			Some(Error::AuthenticationRejected { .. })
		));
		assert!(matches!(
			map_status_error(Some(&meta(429)), "slow down", b""),
			Some(Error::Transient(_))
		));
		assert!(matches!(
			map_status_error(Some(&meta(404)), "missing", br#"{"code":"not_found"}"#),
			Some(Error::ClientError { status: 404, code: Some(_), .. })
		));
		assert!(map_status_error(Some(&meta(200)), "ok", b"").is_none());
		assert!(map_status_error(None, "unknown", b"").is_none());
	}

	#[test]
	fn token_response_requires_positive_expiry() {
		let mut response = BasicTokenResponse::new(
			OAuthAccessToken::new("bearer".into()),
			BasicTokenType::Bearer,
			EmptyExtraTokenFields {},
		);

		assert!(matches!(
			map_token_response(response.clone()),
			Err(Error::Config(ConfigError::MissingExpiresIn))
		));

		response.set_expires_in(Some(&std::time::Duration::ZERO));

		assert!(matches!(
			map_token_response(response.clone()),
			Err(Error::Config(ConfigError::NonPositiveExpiresIn))
		));

		response.set_expires_in(Some(&std::time::Duration::from_secs(1800)));

		let token = map_token_response(response).expect("Valid response should map.");

		assert_eq!(token.value.expose(), "bearer");
		assert_eq!(token.expires_at - token.issued_at, Duration::minutes(30));
	}
}
