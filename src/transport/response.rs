//! Successful API responses.

// crates.io
use oauth2::http::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
// self
use crate::{_prelude::*, envelope::ApiEnvelope, error::ResponseError};

/// Response body as received.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
	/// No body.
	Empty,
	/// Body parsed as JSON.
	Json(Value),
	/// Body that is not JSON, passed through untouched.
	Raw(Vec<u8>),
}
impl ResponseBody {
	pub(crate) fn parse(bytes: Vec<u8>) -> Self {
		if bytes.iter().all(u8::is_ascii_whitespace) {
			return Self::Empty;
		}

		match serde_json::from_slice(&bytes) {
			Ok(value) => Self::Json(value),
			Err(_) => Self::Raw(bytes),
		}
	}
}

/// 2xx response returned by [`Transport::request`](crate::transport::Transport::request).
#[derive(Clone, Debug)]
pub struct ApiResponse {
	status: u16,
	headers: HeaderMap,
	body: ResponseBody,
	attempts: u32,
}
impl ApiResponse {
	pub(crate) fn new(status: u16, headers: HeaderMap, body: Vec<u8>, attempts: u32) -> Self {
		Self { status, headers, body: ResponseBody::parse(body), attempts }
	}

	/// HTTP status code.
	pub fn status(&self) -> u16 {
		self.status
	}

	/// Response headers.
	pub fn headers(&self) -> &HeaderMap {
		&self.headers
	}

	/// Body as received.
	pub fn body(&self) -> &ResponseBody {
		&self.body
	}

	/// Attempts spent on the logical request, the successful one included.
	pub fn attempts(&self) -> u32 {
		self.attempts
	}

	/// JSON body, or [`ResponseError::NotJson`].
	pub fn json(&self) -> Result<&Value, ResponseError> {
		match &self.body {
			ResponseBody::Json(value) => Ok(value),
			ResponseBody::Empty | ResponseBody::Raw(_) => Err(ResponseError::NotJson),
		}
	}

	/// Decodes the JSON body into `T`; errors name the failing JSON path.
	pub fn deserialize<T>(&self) -> Result<T, ResponseError>
	where
		T: DeserializeOwned,
	{
		serde_path_to_error::deserialize(self.json()?)
			.map_err(|source| ResponseError::Decode { source })
	}

	/// Decodes the Mimecast envelope and returns `data`, failing if the envelope reports errors.
	pub fn envelope<T>(&self) -> Result<Option<T>, ResponseError>
	where
		T: DeserializeOwned,
	{
		self.deserialize::<ApiEnvelope<T>>()?.into_data()
	}

	/// Consumes the response, returning the body.
	pub fn into_body(self) -> ResponseBody {
		self.body
	}
}
