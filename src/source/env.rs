//! Environment-variable secret source.

// self
use crate::{
	_prelude::*,
	source::{SecretBackend, SecretBlob, SecretSource, SourceError, SourceFuture},
};

/// Default variable prefix used when the key is empty.
pub const DEFAULT_PREFIX: &str = "MIMECAST_";

/// Reads `{prefix}CLIENT_ID`, `{prefix}CLIENT_SECRET`, and `{prefix}REGION`.
///
/// The fetch key is the prefix. By default the live process environment is read; a fixed
/// snapshot can be injected with [`EnvSource::with_vars`].
#[derive(Clone, Default)]
pub struct EnvSource {
	vars: Option<HashMap<String, String>>,
}
impl EnvSource {
	/// Reads from the process environment on every fetch.
	pub fn new() -> Self {
		Self::default()
	}

	/// Reads from a fixed variable snapshot instead of the process environment.
	pub fn with_vars<I, K, V>(vars: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		Self { vars: Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect()) }
	}

	fn lookup(&self, name: &str) -> Option<String> {
		let value = match &self.vars {
			Some(vars) => vars.get(name).cloned(),
			None => std::env::var(name).ok(),
		};

		value.filter(|value| !value.trim().is_empty())
	}
}
impl Debug for EnvSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EnvSource").field("snapshot", &self.vars.is_some()).finish()
	}
}
impl SecretSource for EnvSource {
	fn backend(&self) -> SecretBackend {
		SecretBackend::Environment
	}

	fn fetch<'a>(&'a self, key: &'a str) -> SourceFuture<'a, SecretBlob> {
		Box::pin(async move {
			let prefix = if key.is_empty() { DEFAULT_PREFIX } else { key };
			let client_id = self.lookup(&format!("{prefix}CLIENT_ID"));
			let client_secret = self.lookup(&format!("{prefix}CLIENT_SECRET"));

			if client_id.is_none() && client_secret.is_none() {
				return Err(SourceError::NotFound);
			}

			let document = serde_json::json!({
				"client_id": client_id,
				"client_secret": client_secret,
				"region": self.lookup(&format!("{prefix}REGION")),
			});

			Ok(SecretBlob::new(document.to_string()))
		})
	}
}
