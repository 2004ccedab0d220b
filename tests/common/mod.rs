//! Shared fixtures for integration tests.

#![allow(dead_code)]

// std
use std::{
	collections::VecDeque,
	error::Error as StdError,
	fmt::{Display, Formatter, Result as FmtResult},
	future::Future,
	pin::Pin,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};
// crates.io
use mimecast_client::{
	auth::Credential,
	config::TransportConfig,
	error::{Error, TransportError},
	http::{HttpClient, ResponseMetadata, ResponseMetadataSlot},
	oauth::{
		TransportErrorMapper,
		oauth2::{
			AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
			http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header::CONTENT_TYPE},
		},
	},
	retry::RetryPolicy,
	transport::Transport,
};
#[cfg(feature = "reqwest")]
use mimecast_client::{http::ReqwestHttpClient, reqwest::Client as ReqwestClient};
use parking_lot::Mutex;

pub const CLIENT_ID: &str = "mc-client";
pub const CLIENT_SECRET: &str = "mc-secret";
pub const BASE_URL: &str = "https://api.mimecast.test";

pub type ScriptedTransport = Transport<ScriptedHttpClient, FakeErrorMapper>;

/// Failure injected below HTTP.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FakeTransportError {
	/// Connection refused before anything was sent.
	Connect,
	/// Timed out after the request went out.
	Timeout,
}
impl Display for FakeTransportError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Connect => write!(f, "Connection refused."),
			Self::Timeout => write!(f, "Request timed out."),
		}
	}
}
impl StdError for FakeTransportError {}

/// One scripted reply.
#[derive(Clone, Debug)]
pub enum Step {
	Respond {
		status: u16,
		headers: Vec<(&'static str, String)>,
		body: String,
		delay: StdDuration,
	},
	Fail(FakeTransportError),
}
impl Step {
	pub fn status(status: u16) -> Self {
		Self::Respond { status, headers: Vec::new(), body: String::new(), delay: StdDuration::ZERO }
	}

	pub fn json(status: u16, body: impl Into<String>) -> Self {
		Self::status(status).with_header("content-type", "application/json").with_body(body)
	}

	pub fn token(value: &str, expires_in: i64) -> Self {
		Self::json(
			200,
			format!(r#"{{"access_token":"{value}","token_type":"bearer","expires_in":{expires_in}}}"#),
		)
	}

	pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
		if let Self::Respond { headers, .. } = &mut self {
			headers.push((name, value.into()));
		}

		self
	}

	pub fn with_body(mut self, value: impl Into<String>) -> Self {
		if let Self::Respond { body, .. } = &mut self {
			*body = value.into();
		}

		self
	}

	pub fn with_delay(mut self, value: StdDuration) -> Self {
		if let Self::Respond { delay, .. } = &mut self {
			*delay = value;
		}

		self
	}
}

/// Request captured by [`ScriptedHttpClient`].
#[derive(Clone, Debug)]
pub struct RecordedRequest {
	pub method: String,
	pub uri: String,
	pub headers: HeaderMap,
	pub body: Vec<u8>,
}
impl RecordedRequest {
	pub fn body_text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}
}

#[derive(Default)]
struct Script {
	token: Mutex<VecDeque<Step>>,
	api: Mutex<VecDeque<Step>>,
	token_calls: AtomicUsize,
	api_calls: AtomicUsize,
	requests: Mutex<Vec<RecordedRequest>>,
}

/// Fake HTTP stack replaying scripted replies; token and API calls have separate scripts.
///
/// An empty token script issues `token-N` valid for 30 minutes; an empty API script answers
/// `200 {"data":[]}`.
#[derive(Clone, Default)]
pub struct ScriptedHttpClient(Arc<Script>);
impl ScriptedHttpClient {
	pub fn push_token(&self, step: Step) -> &Self {
		self.0.token.lock().push_back(step);

		self
	}

	pub fn push_api(&self, step: Step) -> &Self {
		self.0.api.lock().push_back(step);

		self
	}

	pub fn token_calls(&self) -> usize {
		self.0.token_calls.load(Ordering::SeqCst)
	}

	pub fn api_calls(&self) -> usize {
		self.0.api_calls.load(Ordering::SeqCst)
	}

	pub fn requests(&self) -> Vec<RecordedRequest> {
		self.0.requests.lock().clone()
	}

	pub fn api_requests(&self) -> Vec<RecordedRequest> {
		self.requests().into_iter().filter(|request| !is_token_request(&request.uri)).collect()
	}
}
impl HttpClient for ScriptedHttpClient {
	type Handle = ScriptedHandle;
	type TransportError = FakeTransportError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		ScriptedHandle { script: Arc::clone(&self.0), slot }
	}
}

pub struct ScriptedHandle {
	script: Arc<Script>,
	slot: ResponseMetadataSlot,
}
impl<'c> AsyncHttpClient<'c> for ScriptedHandle {
	type Error = HttpClientError<FakeTransportError>;
	type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let script = Arc::clone(&self.script);
		let slot = self.slot.clone();

		Box::pin(async move {
			slot.take();

			let uri = request.uri().to_string();
			let token = is_token_request(&uri);
			let step = if token {
				let n = script.token_calls.fetch_add(1, Ordering::SeqCst) + 1;

				script
					.token
					.lock()
					.pop_front()
					.unwrap_or_else(|| Step::token(&format!("token-{n}"), 1800))
			} else {
				script.api_calls.fetch_add(1, Ordering::SeqCst);
				script.api.lock().pop_front().unwrap_or_else(|| Step::json(200, r#"{"data":[]}"#))
			};

			script.requests.lock().push(RecordedRequest {
				method: request.method().to_string(),
				uri,
				headers: request.headers().clone(),
				body: request.body().clone(),
			});

			match step {
				Step::Fail(failure) => Err(HttpClientError::Reqwest(Box::new(failure))),
				Step::Respond { status, headers, body, delay } => {
					if !delay.is_zero() {
						tokio::time::sleep(delay).await;
					}

					let mut response = HttpResponse::new(body.into_bytes());

					*response.status_mut() =
						StatusCode::from_u16(status).expect("Scripted status should be valid.");

					for (name, value) in headers {
						response.headers_mut().insert(
							HeaderName::from_static(name),
							HeaderValue::from_str(&value).expect("Scripted header should be valid."),
						);
					}

					slot.store(ResponseMetadata::from_parts(status, response.headers()));

					Ok(response)
				},
			}
		})
	}
}

/// Maps [`FakeTransportError`] onto the client's transport taxonomy.
#[derive(Clone, Copy, Debug, Default)]
pub struct FakeErrorMapper;
impl TransportErrorMapper<FakeTransportError> for FakeErrorMapper {
	fn map_transport_error(
		&self,
		_meta: Option<&ResponseMetadata>,
		error: HttpClientError<FakeTransportError>,
	) -> Error {
		match error {
			HttpClientError::Reqwest(inner) => match *inner {
				FakeTransportError::Connect => TransportError::connect(*inner).into(),
				FakeTransportError::Timeout => TransportError::timeout(*inner).into(),
			},
			other => TransportError::network(std::io::Error::other(other.to_string())).into(),
		}
	}
}

fn is_token_request(uri: &str) -> bool {
	uri.ends_with("/oauth/token")
}

/// Retry policy without jitter so waits are predictable.
pub fn fixed_policy() -> RetryPolicy {
	RetryPolicy::default().with_jitter(false)
}

pub fn config() -> TransportConfig {
	TransportConfig::default().with_base_url(BASE_URL).with_retry(fixed_policy())
}

pub fn credential() -> Credential {
	Credential::new(CLIENT_ID, CLIENT_SECRET)
}

pub fn scripted_transport(client: &ScriptedHttpClient) -> ScriptedTransport {
	Transport::with_http_client(credential(), &config(), client.clone(), FakeErrorMapper)
		.expect("Scripted transport should build.")
}

/// Reqwest client that accepts the self-signed certificates `httpmock` serves.
#[cfg(feature = "reqwest")]
pub fn test_reqwest_http_client() -> ReqwestHttpClient {
	let client = ReqwestClient::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()
		.expect("Failed to build insecure Reqwest client for tests.");

	ReqwestHttpClient::with_client(client)
}
