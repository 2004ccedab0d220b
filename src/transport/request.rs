//! Outbound request description.

// crates.io
use oauth2::{
	HttpRequest,
	http::{
		HeaderName, HeaderValue,
		header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
	},
};
use serde_json::Value;
// self
use crate::{_prelude::*, auth::AccessToken, error::ConfigError};

pub use oauth2::http::Method;

const JSON: &str = "application/json";

/// One logical API call; retries reuse it unchanged.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Path relative to the base URL, e.g. `/api/ttp/url/get-all-managed-urls`.
	pub path: String,
	/// JSON body, sent with `Content-Type: application/json`.
	pub body: Option<Value>,
	/// Query pairs appended in order.
	pub query: Vec<(String, String)>,
	/// Extra headers.
	pub headers: Vec<(String, String)>,
	/// Explicit idempotency marker; `None` derives it from the method.
	pub idempotent: Option<bool>,
}
impl ApiRequest {
	/// Creates a request without body, query, or extra headers.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			body: None,
			query: Vec::new(),
			headers: Vec::new(),
			idempotent: None,
		}
	}

	/// `GET` request.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// `POST` request; not retried after ambiguous failures unless marked idempotent.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	/// `PUT` request.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::PUT, path)
	}

	/// `DELETE` request.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::DELETE, path)
	}

	/// Attaches a JSON body.
	pub fn with_json(mut self, body: Value) -> Self {
		self.body = Some(body);

		self
	}

	/// Serializes `body` and attaches it.
	pub fn with_body<T>(self, body: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		let value =
			serde_json::to_value(body).map_err(|source| ConfigError::RequestBody { source })?;

		Ok(self.with_json(value))
	}

	/// Appends a query pair.
	pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((key.into(), value.into()));

		self
	}

	/// Appends a header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Marks the request as safe (or unsafe) to repeat after an ambiguous failure.
	pub fn idempotent(mut self, idempotent: bool) -> Self {
		self.idempotent = Some(idempotent);

		self
	}

	/// Whether the request may be repeated after an ambiguous failure.
	pub fn is_idempotent(&self) -> bool {
		self.idempotent.unwrap_or_else(|| {
			matches!(
				self.method,
				Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS
			)
		})
	}

	/// Builds the HTTP request for one attempt.
	pub(crate) fn to_http(&self, base: &Url, token: &AccessToken) -> Result<HttpRequest> {
		let mut url = join_path(base, &self.path);

		if !self.query.is_empty() {
			url.query_pairs_mut().extend_pairs(&self.query);
		}

		let mut builder = oauth2::http::Request::builder()
			.method(self.method.clone())
			.uri(url.as_str())
			.header(AUTHORIZATION, format!("Bearer {}", token.value.expose()))
			.header(ACCEPT, JSON);

		for (name, value) in &self.headers {
			let invalid = || ConfigError::InvalidHeader { name: name.clone() };
			let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
			let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;

			builder = builder.header(header_name, header_value);
		}

		let body = match &self.body {
			Some(value) => {
				builder = builder.header(CONTENT_TYPE, JSON);

				serde_json::to_vec(value).map_err(|source| ConfigError::RequestBody { source })?
			},
			None => Vec::new(),
		};

		builder.body(body).map_err(|e| ConfigError::from(e).into())
	}
}

/// Joins `path` onto `base`, collapsing duplicate slashes.
pub fn join_path(base: &Url, path: &str) -> Url {
	let mut url = base.clone();
	let prefix = base.path().trim_end_matches('/');
	let suffix = path.split('/').filter(|segment| !segment.is_empty()).collect::<Vec<_>>();

	url.set_path(&format!("{prefix}/{}", suffix.join("/")));

	url
}
