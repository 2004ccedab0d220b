//! Local JSON secret store: the producer side of the secret boundary.
//!
//! The file holds one JSON object mapping keys to blobs. String values are stored verbatim;
//! object values are handed to the credential parser as JSON.

// std
use std::{
	fs::{self, File, OpenOptions},
	io::Write,
	path::{Path, PathBuf},
};
// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	source::{SecretBackend, SecretBlob, SecretSource, SourceError, SourceFuture},
};

/// File-backed secret store with atomic writes.
#[derive(Clone, Debug)]
pub struct FileSource {
	path: PathBuf,
}
impl FileSource {
	/// Points the source at `path`; the file is read lazily on every fetch.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Stores `blob` under `key`, replacing the file atomically.
	///
	/// Non-UTF-8 blobs are stored base64-encoded, which the credential parser decodes.
	pub fn put(&self, key: &str, blob: &SecretBlob) -> Result<(), SourceError> {
		let mut entries = self.load()?.unwrap_or_default();
		let value = match std::str::from_utf8(blob.as_bytes()) {
			Ok(text) => Value::String(text.to_owned()),
			Err(_) => Value::String(STANDARD.encode(blob.as_bytes())),
		};

		entries.insert(key.to_owned(), value);

		self.persist(&entries)
	}

	fn load(&self) -> Result<Option<BTreeMap<String, Value>>, SourceError> {
		let Some(bytes) = self.read()? else {
			return Ok(None);
		};

		Self::parse(&bytes).map(Some).map_err(|e| {
			SourceError::unavailable(format!("Failed to parse {}: {e}", self.path.display()))
		})
	}

	fn read(&self) -> Result<Option<Vec<u8>>, SourceError> {
		if !self.path.exists() {
			return Ok(None);
		}

		fs::read(&self.path).map(Some).map_err(|e| {
			SourceError::unavailable(format!("Failed to read {}: {e}", self.path.display()))
		})
	}

	fn parse(bytes: &[u8]) -> serde_json::Result<BTreeMap<String, Value>> {
		if bytes.iter().all(u8::is_ascii_whitespace) {
			return Ok(BTreeMap::new());
		}

		serde_json::from_slice(bytes)
	}

	fn persist(&self, entries: &BTreeMap<String, Value>) -> Result<(), SourceError> {
		if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| {
				SourceError::unavailable(format!(
					"Failed to create secret directory {}: {e}",
					parent.display()
				))
			})?;
		}

		let serialized = serde_json::to_vec_pretty(entries).map_err(|e| {
			SourceError::unavailable(format!("Failed to serialize secret store: {e}"))
		})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = Self::create_private(&tmp_path).map_err(|e| {
				SourceError::unavailable(format!("Failed to create {}: {e}", tmp_path.display()))
			})?;

			file.write_all(&serialized).map_err(|e| {
				SourceError::unavailable(format!("Failed to write {}: {e}", tmp_path.display()))
			})?;
			file.sync_all().map_err(|e| {
				SourceError::unavailable(format!("Failed to sync {}: {e}", tmp_path.display()))
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| {
			SourceError::unavailable(format!("Failed to replace {}: {e}", self.path.display()))
		})
	}

	fn create_private(path: &Path) -> std::io::Result<File> {
		let mut options = OpenOptions::new();

		options.write(true).create(true).truncate(true);

		#[cfg(unix)]
		{
			use std::os::unix::fs::OpenOptionsExt;

			options.mode(0o600);
		}

		options.open(path)
	}
}
impl SecretSource for FileSource {
	fn backend(&self) -> SecretBackend {
		SecretBackend::LocalEncrypted
	}

	fn fetch<'a>(&'a self, key: &'a str) -> SourceFuture<'a, SecretBlob> {
		Box::pin(async move {
			let bytes = self.read()?.ok_or(SourceError::NotFound)?;
			// Rereading a corrupt store cannot help; its bytes go to the credential parser,
			// which reports them as malformed.
			let Ok(entries) = Self::parse(&bytes) else {
				return Ok(SecretBlob::new(bytes));
			};

			match entries.get(key) {
				Some(Value::String(text)) => Ok(SecretBlob::new(text.as_str())),
				Some(Value::Null) | None => Err(SourceError::NotFound),
				Some(other) => Ok(SecretBlob::new(other.to_string())),
			}
		})
	}
}
