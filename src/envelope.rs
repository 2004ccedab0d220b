//! Mimecast response envelopes and error-body inspection.
//!
//! API 2.0 endpoints wrap results as `{"meta": {...}, "data": ..., "fail": [...]}`. A request
//! can succeed at the HTTP level while the envelope reports a failure, so feature APIs decode
//! through [`ApiEnvelope`] rather than reading `data` directly.

// crates.io
use serde_json::Value;
// self
use crate::{_prelude::*, error::ResponseError};

/// Longest body excerpt carried by errors, in characters.
pub const EXCERPT_LIMIT: usize = 256;

/// Standard Mimecast response wrapper.
#[derive(Clone, Debug, Deserialize)]
pub struct ApiEnvelope<T = Value> {
	/// Response metadata (status, pagination, envelope-level errors).
	#[serde(default)]
	pub meta: Option<ApiMeta>,
	/// Payload; absent on some failures.
	#[serde(default = "Option::default")]
	pub data: Option<T>,
	/// Per-item failures.
	#[serde(default)]
	pub fail: Vec<ApiFailEntry>,
}
impl<T> ApiEnvelope<T> {
	/// Returns the failure reported by the envelope, if any.
	pub fn failure(&self) -> Option<ResponseError> {
		let mut details = Vec::new();

		let meta_failed = self.meta.as_ref().filter(|meta| {
			meta.status.as_deref().is_some_and(|status| status.eq_ignore_ascii_case("fail"))
		});

		if let Some(meta) = meta_failed {
			details.extend(meta.errors.iter());
		}

		let item_failed = !self.fail.is_empty();

		details.extend(self.fail.iter().flat_map(|entry| entry.errors.iter()));

		if details.is_empty() && !item_failed {
			return None;
		}

		let code = details.iter().find_map(|detail| detail.code.clone());
		let message = if details.is_empty() {
			"request reported failed items".to_owned()
		} else {
			details.iter().map(|detail| detail.summary()).collect::<Vec<_>>().join("; ")
		};

		Some(ResponseError::ApiFailure { code, message })
	}

	/// Returns `data`, or the envelope failure.
	pub fn into_data(self) -> Result<Option<T>, ResponseError> {
		match self.failure() {
			Some(err) => Err(err),
			None => Ok(self.data),
		}
	}
}

/// Envelope metadata.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ApiMeta {
	/// `"fail"` or an HTTP-like number on older endpoints; absent on most API 2.0 responses.
	#[serde(default, deserialize_with = "code_string")]
	pub status: Option<String>,
	/// Envelope-level errors.
	#[serde(default)]
	pub errors: Vec<ApiErrorDetail>,
	/// Pagination cursor information, left uninterpreted.
	#[serde(default)]
	pub pagination: Option<Value>,
}

/// One failed item.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ApiFailEntry {
	/// Errors for the item.
	#[serde(default)]
	pub errors: Vec<ApiErrorDetail>,
	/// Echo of the offending input, left uninterpreted.
	#[serde(default)]
	pub key: Option<Value>,
}

/// Machine-readable error detail.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ApiErrorDetail {
	/// Error code such as `err_validation_missing`.
	#[serde(default, deserialize_with = "code_string")]
	pub code: Option<String>,
	/// Human-readable message.
	#[serde(default)]
	pub message: Option<String>,
	/// Whether the server considers the failure retryable.
	#[serde(default)]
	pub retryable: Option<bool>,
}
impl ApiErrorDetail {
	fn summary(&self) -> String {
		match (&self.code, &self.message) {
			(Some(code), Some(message)) => format!("{code}: {message}"),
			(Some(code), None) => code.clone(),
			(None, Some(message)) => message.clone(),
			(None, None) => "unknown error".to_owned(),
		}
	}
}

fn code_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
	D: serde::Deserializer<'de>,
{
	Ok(Option::<Value>::deserialize(deserializer)?.as_ref().and_then(scalar))
}

fn scalar(value: &Value) -> Option<String> {
	match value {
		Value::String(text) if !text.is_empty() => Some(text.clone()),
		Value::Number(number) => Some(number.to_string()),
		_ => None,
	}
}

/// Extracts the first machine-readable error code from an error body.
///
/// Looks at `fail[].errors[].code`, `meta.errors[].code`, `fault.detail.errorcode`, then the
/// top-level `error`/`code` used by the token endpoint.
pub fn error_code(body: &Value) -> Option<String> {
	let from_errors = |errors: Option<&Value>| {
		errors?.as_array()?.iter().find_map(|error| error.get("code").and_then(scalar))
	};

	body.get("fail")
		.and_then(Value::as_array)
		.and_then(|entries| entries.iter().find_map(|entry| from_errors(entry.get("errors"))))
		.or_else(|| from_errors(body.get("meta").and_then(|meta| meta.get("errors"))))
		.or_else(|| body.pointer("/fault/detail/errorcode").and_then(scalar))
		.or_else(|| body.get("error").and_then(scalar))
		.or_else(|| body.get("code").and_then(scalar))
}

/// Lossy, trimmed, length-capped rendering of a response body for error messages.
pub fn body_excerpt(body: &[u8]) -> String {
	let text = String::from_utf8_lossy(body);
	let text = text.trim();

	match text.char_indices().nth(EXCERPT_LIMIT) {
		Some((cut, _)) => text[..cut].to_owned(),
		None => text.to_owned(),
	}
}
