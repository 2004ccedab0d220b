//! Client credentials and the shared secret-blob parser used by every secret source.

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::Secret, region::Region, source::SecretError};

const ENV_KEY_PREFIX: &str = "MIMECAST_";

/// Client identifier and secret used to obtain access tokens.
///
/// Immutable once loaded. Neither `Debug` nor any log line exposes the secret; spans only
/// carry [`Credential::fingerprint`].
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
	client_id: String,
	client_secret: Secret,
	region: Option<Region>,
}
impl Credential {
	/// Creates a credential from explicit values.
	pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
		Self { client_id: client_id.into(), client_secret: Secret::new(client_secret), region: None }
	}

	/// Attaches the region the credential belongs to.
	pub fn with_region(mut self, region: Region) -> Self {
		self.region = Some(region);

		self
	}

	/// Parses a secret blob into a credential.
	///
	/// Accepts a JSON object, `key=value` lines, or either of those encoded as base64.
	pub fn from_blob(blob: &[u8]) -> Result<Self, SecretError> {
		parse_blob(blob, true)
	}

	/// OAuth client identifier.
	pub fn client_id(&self) -> &str {
		&self.client_id
	}

	/// OAuth client secret.
	pub fn client_secret(&self) -> &Secret {
		&self.client_secret
	}

	/// Region stored alongside the credential, if any.
	pub fn region(&self) -> Option<Region> {
		self.region
	}

	/// Short stable fingerprint of the client identifier, safe for logs.
	pub fn fingerprint(&self) -> String {
		let digest = Sha256::digest(self.client_id.as_bytes());

		digest.iter().take(6).map(|byte| format!("{byte:02x}")).collect()
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("client", &self.fingerprint())
			.field("client_secret", &"<redacted>")
			.field("region", &self.region)
			.finish()
	}
}

#[derive(Deserialize)]
struct CredentialDocument {
	#[serde(alias = "clientId", alias = "CLIENT_ID")]
	client_id: Option<String>,
	#[serde(alias = "clientSecret", alias = "CLIENT_SECRET")]
	client_secret: Option<String>,
	#[serde(default)]
	region: Option<String>,
}

fn parse_blob(blob: &[u8], allow_base64: bool) -> Result<Credential, SecretError> {
	let text = std::str::from_utf8(blob)
		.map_err(|_| SecretError::malformed("Secret blob is not valid UTF-8"))?
		.trim();

	if text.is_empty() {
		return Err(SecretError::malformed("Secret blob is empty"));
	}
	if text.starts_with('{') {
		let de = &mut serde_json::Deserializer::from_str(text);
		let document: CredentialDocument = serde_path_to_error::deserialize(de).map_err(|e| {
			SecretError::malformed(format!("Secret blob JSON is invalid at `{}`", e.path()))
		})?;

		return build(document);
	}
	if text.contains('=') && !looks_like_base64(text) {
		return build(parse_pairs(text));
	}
	if allow_base64 {
		if let Ok(decoded) = STANDARD.decode(text) {
			return parse_blob(&decoded, false);
		}
	}
	if text.contains('=') {
		return build(parse_pairs(text));
	}

	Err(SecretError::malformed("Secret blob is neither JSON nor key=value pairs"))
}

// Base64 payloads only carry `=` as trailing padding, and never contain whitespace.
fn looks_like_base64(text: &str) -> bool {
	let body = text.trim_end_matches('=');

	!body.is_empty()
		&& !body.contains('=')
		&& body.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
}

fn parse_pairs(text: &str) -> CredentialDocument {
	let mut document = CredentialDocument { client_id: None, client_secret: None, region: None };

	for line in text.lines() {
		let line = line.trim();

		if line.is_empty() || line.starts_with('#') {
			continue;
		}

		let line = line.strip_prefix("export ").unwrap_or(line);
		let Some((key, value)) = line.split_once('=') else {
			continue;
		};
		let key = key.trim().to_ascii_uppercase();
		let key = key.strip_prefix(ENV_KEY_PREFIX).unwrap_or(&key);
		let value = unquote(value.trim()).to_owned();

		match key {
			"CLIENT_ID" | "CLIENTID" => document.client_id = Some(value),
			"CLIENT_SECRET" | "CLIENTSECRET" => document.client_secret = Some(value),
			"REGION" => document.region = Some(value),
			_ => {},
		}
	}

	document
}

fn unquote(value: &str) -> &str {
	for quote in ['"', '\''] {
		if let Some(inner) = value.strip_prefix(quote).and_then(|v| v.strip_suffix(quote)) {
			return inner;
		}
	}

	value
}

fn build(document: CredentialDocument) -> Result<Credential, SecretError> {
	let client_id = document
		.client_id
		.map(|value| value.trim().to_owned())
		.filter(|value| !value.is_empty())
		.ok_or_else(|| SecretError::malformed("Secret blob is missing client_id"))?;
	let client_secret = document
		.client_secret
		.filter(|value| !value.trim().is_empty())
		.ok_or_else(|| SecretError::malformed("Secret blob is missing client_secret"))?;
	let mut credential = Credential::new(client_id, client_secret.trim());

	if let Some(code) = document.region.filter(|value| !value.trim().is_empty()) {
		let region = code.parse::<Region>().map_err(|_| {
			SecretError::malformed(format!("Secret blob names unknown region `{code}`"))
		})?;

		credential = credential.with_region(region);
	}

	Ok(credential)
}
