//! Client-level error types shared by secret sources, the token manager, and the transport.

// self
use crate::_prelude::*;

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical client error exposed by public APIs.
///
/// Retries happen inside the transport; a caller only ever sees the final classification,
/// with the number of attempts already spent where that is meaningful.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem; never retried.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Credential could not be loaded from its secret source.
	#[error(transparent)]
	Secret(#[from] crate::source::SecretError),
	/// Token endpoint kept answering with something unexpected.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Successful response body could not be interpreted.
	#[error(transparent)]
	Response(#[from] ResponseError),

	/// Credentials were rejected; terminal until they are reloaded.
	#[error("Authentication was rejected after {attempts} attempt(s): {reason}.")]
	AuthenticationRejected {
		/// Server- or client-supplied reason string.
		reason: String,
		/// Machine-readable error code from the body, when present.
		code: Option<String>,
		/// Attempts made for the logical request; zero when the client was already revoked.
		attempts: u32,
	},
	/// Network failures persisted past the retry budget.
	#[error("Transport unavailable after {attempts} attempt(s).")]
	TransportUnavailable {
		/// Attempts made for the logical request.
		attempts: u32,
		/// Last network failure observed.
		#[source]
		source: TransportError,
	},
	/// Server kept throttling past the retry budget.
	#[error("Rate limited after {attempts} attempt(s).")]
	RateLimited {
		/// Attempts made for the logical request.
		attempts: u32,
		/// Last Retry-After hint, if the server supplied one.
		retry_after: Option<Duration>,
	},
	/// Server kept failing (5xx) past the retry budget.
	#[error("Server returned HTTP {status} after {attempts} attempt(s): {body_excerpt}")]
	ServerError {
		/// HTTP status code.
		status: u16,
		/// Machine-readable error code from the body, when present.
		code: Option<String>,
		/// Leading part of the response body.
		body_excerpt: String,
		/// Attempts made for the logical request.
		attempts: u32,
	},
	/// Request was rejected as malformed or forbidden (4xx other than 401/429).
	#[error("Request rejected with HTTP {status} after {attempts} attempt(s): {body_excerpt}")]
	ClientError {
		/// HTTP status code.
		status: u16,
		/// Machine-readable error code from the body, when present.
		code: Option<String>,
		/// Leading part of the response body.
		body_excerpt: String,
		/// Attempts made for the logical request.
		attempts: u32,
	},
}
impl Error {
	/// Returns the number of attempts recorded on the error, if it carries one.
	pub fn attempts(&self) -> Option<u32> {
		match self {
			Self::TransportUnavailable { attempts, .. }
			| Self::RateLimited { attempts, .. }
			| Self::ServerError { attempts, .. }
			| Self::ClientError { attempts, .. }
			| Self::AuthenticationRejected { attempts, .. } => Some(*attempts),
			Self::Transient(err) => Some(err.attempts()),
			Self::Secret(crate::source::SecretError::BackendUnavailable { attempts, .. }) =>
				Some(*attempts),
			_ => None,
		}
	}

	/// Returns the HTTP status associated with the error, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::ServerError { status, .. } | Self::ClientError { status, .. } => Some(*status),
			Self::RateLimited { .. } => Some(429),
			Self::AuthenticationRejected { .. } => Some(401),
			Self::Transient(TransientError::TokenEndpoint { status, .. })
			| Self::Transient(TransientError::TokenResponseParse { status, .. }) => *status,
			_ => None,
		}
	}

	/// Returns the machine-readable error code extracted from the response body, if any.
	pub fn code(&self) -> Option<&str> {
		match self {
			Self::ServerError { code, .. }
			| Self::ClientError { code, .. }
			| Self::AuthenticationRejected { code, .. } => code.as_deref(),
			Self::Response(ResponseError::ApiFailure { code, .. }) => code.as_deref(),
			_ => None,
		}
	}

	/// Re-stamps the attempt counter on variants that carry one.
	pub(crate) fn with_attempts(mut self, total: u32) -> Self {
		match &mut self {
			Self::TransportUnavailable { attempts, .. }
			| Self::RateLimited { attempts, .. }
			| Self::ServerError { attempts, .. }
			| Self::ClientError { attempts, .. }
			| Self::AuthenticationRejected { attempts, .. }
			| Self::Transient(TransientError::TokenEndpoint { attempts, .. })
			| Self::Transient(TransientError::TokenResponseParse { attempts, .. }) =>
				*attempts = total,
			_ => {},
		}

		self
	}

	/// Builds a rejection without a body code.
	pub(crate) fn rejected(reason: impl Into<String>, attempts: u32) -> Self {
		Self::AuthenticationRejected { reason: reason.into(), code: None, attempts }
	}

	/// Rebuilds an equivalent error so one failure can be handed to several callers.
	///
	/// Classification, status, code, and attempt counts survive. Transport sources are replaced
	/// by their message; failures with no cloneable shape become a token endpoint failure
	/// carrying the original message.
	pub(crate) fn replay(&self) -> Self {
		match self {
			Self::AuthenticationRejected { reason, code, attempts } =>
				Self::AuthenticationRejected {
					reason: reason.clone(),
					code: code.clone(),
					attempts: *attempts,
				},
			Self::TransportUnavailable { attempts, source } =>
				Self::TransportUnavailable { attempts: *attempts, source: source.replay() },
			Self::RateLimited { attempts, retry_after } =>
				Self::RateLimited { attempts: *attempts, retry_after: *retry_after },
			Self::ServerError { status, code, body_excerpt, attempts } => Self::ServerError {
				status: *status,
				code: code.clone(),
				body_excerpt: body_excerpt.clone(),
				attempts: *attempts,
			},
			Self::ClientError { status, code, body_excerpt, attempts } => Self::ClientError {
				status: *status,
				code: code.clone(),
				body_excerpt: body_excerpt.clone(),
				attempts: *attempts,
			},
			Self::Transient(TransientError::TokenEndpoint {
				message,
				status,
				retry_after,
				attempts,
			}) => TransientError::TokenEndpoint {
				message: message.clone(),
				status: *status,
				retry_after: *retry_after,
				attempts: *attempts,
			}
			.into(),
			Self::Config(ConfigError::MissingExpiresIn) => ConfigError::MissingExpiresIn.into(),
			Self::Config(ConfigError::ExpiresInOutOfRange) =>
				ConfigError::ExpiresInOutOfRange.into(),
			Self::Config(ConfigError::NonPositiveExpiresIn) =>
				ConfigError::NonPositiveExpiresIn.into(),
			other => TransientError::TokenEndpoint {
				message: other.to_string(),
				status: other.status(),
				retry_after: None,
				attempts: other.attempts().unwrap_or(1),
			}
			.into(),
		}
	}
}

impl From<TransportError> for Error {
	fn from(source: TransportError) -> Self {
		Self::TransportUnavailable { attempts: 1, source }
	}
}

/// Configuration and validation failures raised by the client.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	RequestBody {
		/// Underlying serialization failure.
		#[source]
		source: serde_json::Error,
	},
	/// A header value could not be encoded.
	#[error("Header `{name}` has an invalid value.")]
	InvalidHeader {
		/// Header name.
		name: String,
	},
	/// Region code is not part of the fixed region table.
	#[error("Region `{code}` is not a known Mimecast region.")]
	UnknownRegion {
		/// Code supplied by the caller.
		code: String,
	},
	/// Override base URL cannot be parsed.
	#[error("Base URL `{url}` is invalid.")]
	InvalidBaseUrl {
		/// URL supplied by the caller.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Override base URL is not an absolute HTTPS URL.
	#[error("Base URL `{url}` must be an absolute https URL.")]
	InsecureBaseUrl {
		/// URL supplied by the caller.
		url: String,
	},
	/// Access token builder validation failed.
	#[error("Unable to build access token.")]
	TokenBuild(#[from] crate::auth::AccessTokenBuilderError),
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary token endpoint failures (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Token endpoint returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Server- or client-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
		/// Exchange attempts made before giving up.
		attempts: u32,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Exchange attempts made before giving up.
		attempts: u32,
	},
}
impl TransientError {
	/// Retry-After hint carried by the failure, if any.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::TokenEndpoint { retry_after, .. } => *retry_after,
			Self::TokenResponseParse { .. } => None,
		}
	}

	/// Exchange attempts made before the failure surfaced.
	pub fn attempts(&self) -> u32 {
		match self {
			Self::TokenEndpoint { attempts, .. } | Self::TokenResponseParse { attempts, .. } =>
				*attempts,
		}
	}
}

/// Transport-level failures (network, IO).
///
/// The variants separate failures that certainly happened before the server saw the
/// request from those where the server may already have acted on it.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Connection could not be established; the request never reached the server.
	#[error("Connection to the Mimecast API could not be established.")]
	Connect {
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},
	/// Request timed out; the server may or may not have processed it.
	#[error("Request to the Mimecast API timed out.")]
	Timeout {
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},
	/// Underlying HTTP client reported a network failure mid-request.
	#[error("Network error occurred while calling the Mimecast API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the Mimecast API.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a connection failure.
	pub fn connect(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Connect { source: Box::new(src) }
	}

	/// Wraps a timeout.
	pub fn timeout(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Timeout { source: Box::new(src) }
	}

	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Returns `true` when the failure certainly happened before the server processed
	/// anything, so even non-idempotent requests may be retried.
	pub fn is_pre_execution(&self) -> bool {
		matches!(self, Self::Connect { .. })
	}

	// Same class, with the original failure shared as the source.
	fn replay(&self) -> Self {
		let shared = SharedFailure(self.to_string());

		match self {
			Self::Connect { .. } => Self::connect(shared),
			Self::Timeout { .. } => Self::timeout(shared),
			Self::Network { .. } => Self::network(shared),
			Self::Io(e) => Self::Io(std::io::Error::new(e.kind(), shared)),
		}
	}
}

#[derive(Debug, ThisError)]
#[error("{0}")]
struct SharedFailure(String);
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_connect() {
			Self::connect(e)
		} else if e.is_timeout() {
			Self::timeout(e)
		} else {
			Self::network(e)
		}
	}
}

/// Failures interpreting a successful response body.
#[derive(Debug, ThisError)]
pub enum ResponseError {
	/// Body was not JSON but the caller asked for JSON.
	#[error("Response body is not JSON.")]
	NotJson,
	/// JSON body did not match the requested shape.
	#[error("Response body could not be decoded.")]
	Decode {
		/// Structured decoding failure including the JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
	},
	/// Response envelope reported a failure despite a successful status.
	#[error("Mimecast API reported a failure: {message}.")]
	ApiFailure {
		/// First machine-readable error code, when present.
		code: Option<String>,
		/// Joined `code: message` pairs from the envelope.
		message: String,
	},
}
