//! Thread-safe in-memory [`SecretSource`] for embedding and tests.

// self
use crate::{
	_prelude::*,
	source::{SecretBackend, SecretBlob, SecretSource, SourceError, SourceFuture},
};

type SecretMap = Arc<RwLock<HashMap<String, SecretBlob>>>;

/// Keeps secret blobs in-process. Clones share the same map.
#[derive(Clone, Debug, Default)]
pub struct MemorySource(SecretMap);
impl MemorySource {
	/// Creates an empty source.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a secret and returns the source.
	pub fn with_secret(self, key: impl Into<String>, blob: impl Into<SecretBlob>) -> Self {
		self.insert(key, blob);

		self
	}

	/// Inserts or replaces a secret.
	pub fn insert(&self, key: impl Into<String>, blob: impl Into<SecretBlob>) {
		self.0.write().insert(key.into(), blob.into());
	}

	/// Removes a secret, returning it if present.
	pub fn remove(&self, key: &str) -> Option<SecretBlob> {
		self.0.write().remove(key)
	}
}
impl SecretSource for MemorySource {
	fn backend(&self) -> SecretBackend {
		SecretBackend::Memory
	}

	fn fetch<'a>(&'a self, key: &'a str) -> SourceFuture<'a, SecretBlob> {
		let found = self.0.read().get(key).cloned();

		Box::pin(async move { found.ok_or(SourceError::NotFound) })
	}
}
