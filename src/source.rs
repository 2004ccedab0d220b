//! Secret source contracts, built-in backends, and credential loading with bounded retries.

pub mod env;
pub mod file;
pub mod memory;

pub use env::EnvSource;
pub use file::FileSource;
pub use memory::MemorySource;

// self
use crate::{
	_prelude::*,
	auth::Credential,
	obs::{self, OperationKind, OperationOutcome, OperationSpan},
	retry::{AttemptOutcome, Decision, RetryPolicy},
};

/// Boxed future returned by [`SecretSource::fetch`].
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + 'a + Send>>;

/// Capability to fetch a named secret blob from a vault or local store.
///
/// Implementations never mutate remote state while fetching.
pub trait SecretSource
where
	Self: Send + Sync,
{
	/// Backend kind, used for error reporting and spans.
	fn backend(&self) -> SecretBackend;

	/// Fetches the blob stored under `key`.
	fn fetch<'a>(&'a self, key: &'a str) -> SourceFuture<'a, SecretBlob>;
}

/// Kinds of secret backends a credential can live in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretBackend {
	/// Process environment variables.
	Environment,
	/// Operating-system keyring.
	Keyring,
	/// AWS Secrets Manager.
	Aws,
	/// Azure Key Vault.
	Azure,
	/// Kubernetes secret.
	Kubernetes,
	/// HashiCorp Vault.
	HashiCorp,
	/// Google Cloud Secret Manager.
	Gcp,
	/// Local encrypted or permission-restricted file.
	LocalEncrypted,
	/// In-process map.
	Memory,
}
impl SecretBackend {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			SecretBackend::Environment => "environment",
			SecretBackend::Keyring => "keyring",
			SecretBackend::Aws => "aws",
			SecretBackend::Azure => "azure",
			SecretBackend::Kubernetes => "kubernetes",
			SecretBackend::HashiCorp => "hashicorp",
			SecretBackend::Gcp => "gcp",
			SecretBackend::LocalEncrypted => "local_encrypted",
			SecretBackend::Memory => "memory",
		}
	}
}
impl Display for SecretBackend {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Opaque secret bytes as stored by a backend.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretBlob(Vec<u8>);
impl SecretBlob {
	/// Wraps raw bytes.
	pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
		Self(bytes.into())
	}

	/// Returns the raw bytes.
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	/// Parses the blob into a [`Credential`].
	pub fn parse(&self) -> Result<Credential, SecretError> {
		Credential::from_blob(&self.0)
	}
}
impl Debug for SecretBlob {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "SecretBlob(<{} bytes redacted>)", self.0.len())
	}
}
impl From<&str> for SecretBlob {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}
impl From<String> for SecretBlob {
	fn from(value: String) -> Self {
		Self::new(value)
	}
}

/// Failures reported by a [`SecretSource`] implementation.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum SourceError {
	/// Nothing is stored under the requested key.
	#[error("Secret was not found.")]
	NotFound,
	/// Backend could not be reached or read; safe to retry.
	#[error("Secret backend is unavailable: {message}.")]
	Unavailable {
		/// Human-readable error payload.
		message: String,
	},
}
impl SourceError {
	/// Builds an [`SourceError::Unavailable`] from any displayable failure.
	pub fn unavailable(message: impl Display) -> Self {
		Self::Unavailable { message: message.to_string() }
	}
}

/// Credential loading failures surfaced to callers.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum SecretError {
	/// Backend has no secret under the key; fatal.
	#[error("Secret `{key}` was not found in the {backend} backend.")]
	NotFound {
		/// Backend that was queried.
		backend: SecretBackend,
		/// Key that was requested.
		key: String,
	},
	/// Blob exists but does not describe a usable credential; fatal.
	#[error("Secret is malformed: {reason}.")]
	Malformed {
		/// What was wrong with the blob (never its contents).
		reason: String,
	},
	/// Backend stayed unavailable after bounded retries.
	#[error("The {backend} backend stayed unavailable after {attempts} attempt(s): {message}.")]
	BackendUnavailable {
		/// Backend that was queried.
		backend: SecretBackend,
		/// Attempts made.
		attempts: u32,
		/// Last failure reported by the backend.
		message: String,
	},
}
impl SecretError {
	/// Builds a [`SecretError::Malformed`] with the provided reason.
	pub fn malformed(reason: impl Into<String>) -> Self {
		Self::Malformed { reason: reason.into() }
	}
}

/// Fetches `key` from `source` and parses it into a [`Credential`].
///
/// Unavailable backends are retried according to `policy`; missing and malformed secrets fail
/// immediately.
pub async fn load_credential<S>(
	source: &S,
	key: &str,
	policy: &RetryPolicy,
) -> Result<Credential, SecretError>
where
	S: SecretSource + ?Sized,
{
	const KIND: OperationKind = OperationKind::SecretFetch;

	let span = OperationSpan::new(KIND, "load_credential");

	obs::record_operation_outcome(KIND, OperationOutcome::Attempt);

	let result = span
		.instrument(async move {
			let backend = source.backend();
			let mut state = policy.start(true);

			loop {
				match source.fetch(key).await {
					Ok(blob) => return blob.parse(),
					Err(SourceError::NotFound) =>
						return Err(SecretError::NotFound { backend, key: key.to_owned() }),
					Err(SourceError::Unavailable { message }) => {
						let outcome = AttemptOutcome::Network { pre_execution: true };

						match state.next(&outcome) {
							Decision::Retry(delay) => {
								obs::record_retry(KIND, outcome.reason(), state.attempts(), delay);
								tokio::time::sleep(delay).await;
							},
							Decision::Succeed | Decision::Fail =>
								return Err(SecretError::BackendUnavailable {
									backend,
									attempts: state.attempts(),
									message,
								}),
						}
					},
				}
			}
		})
		.await;

	match &result {
		Ok(_) => obs::record_operation_outcome(KIND, OperationOutcome::Success),
		Err(_) => obs::record_operation_outcome(KIND, OperationOutcome::Failure),
	}

	result
}
