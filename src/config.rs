//! Transport configuration.

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	rate_limit::RateLimitBudget,
	region::{self, Region},
	retry::RetryPolicy,
};

/// Environment variable holding a base URL override.
pub const BASE_URL_VAR: &str = "MIMECAST_BASE_URL";
/// Environment variable holding a region code.
pub const REGION_VAR: &str = "MIMECAST_REGION";

/// Settings for a [`Transport`](crate::transport::Transport).
///
/// Base URL precedence: explicit override, then the configured region, then the region
/// stored with the credential, then `us`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportConfig {
	/// Region to call; overrides the credential's region.
	pub region: Option<Region>,
	/// Absolute `https` base URL; overrides every region.
	pub base_url: Option<String>,
	/// Retry policy for API requests.
	pub api_retry: RetryPolicy,
	/// Retry policy for token exchanges.
	pub token_retry: RetryPolicy,
	/// Retry policy for secret backends.
	pub secret_retry: RetryPolicy,
	/// Fallback rate-limit budget used until the server reports its own.
	pub rate_limit: RateLimitBudget,
	/// Time before expiry at which tokens are refreshed.
	pub safety_margin: Duration,
	/// Per-request timeout applied by the default HTTP client.
	pub request_timeout: Option<StdDuration>,
}
impl TransportConfig {
	/// Reads [`BASE_URL_VAR`] and [`REGION_VAR`] from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Builds a config from an arbitrary variable lookup.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
		let mut config = Self::default();

		if let Some(code) = read(REGION_VAR) {
			config.region = Some(code.parse()?);
		}
		if let Some(url) = read(BASE_URL_VAR) {
			config = config.with_base_url(url);
		}

		Ok(config)
	}

	/// Pins the region.
	pub fn with_region(mut self, region: Region) -> Self {
		self.region = Some(region);

		self
	}

	/// Sets a base URL override.
	pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
		self.base_url = Some(url.into());

		self
	}

	/// Overrides the API retry policy.
	pub fn with_api_retry(mut self, policy: RetryPolicy) -> Self {
		self.api_retry = policy;

		self
	}

	/// Overrides the token exchange retry policy.
	pub fn with_token_retry(mut self, policy: RetryPolicy) -> Self {
		self.token_retry = policy;

		self
	}

	/// Overrides the secret backend retry policy.
	pub fn with_secret_retry(mut self, policy: RetryPolicy) -> Self {
		self.secret_retry = policy;

		self
	}

	/// Applies one policy to API requests, token exchanges, and secret loads.
	pub fn with_retry(self, policy: RetryPolicy) -> Self {
		self.with_api_retry(policy.clone())
			.with_token_retry(policy.clone())
			.with_secret_retry(policy)
	}

	/// Overrides the fallback rate-limit budget.
	pub fn with_rate_limit(mut self, budget: RateLimitBudget) -> Self {
		self.rate_limit = budget;

		self
	}

	/// Overrides the token safety margin.
	pub fn with_safety_margin(mut self, margin: Duration) -> Self {
		self.safety_margin = margin;

		self
	}

	/// Overrides the per-request timeout; `None` disables it.
	pub fn with_request_timeout(mut self, timeout: Option<StdDuration>) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Resolves the API base URL, falling back to the credential's region.
	pub fn resolve_base_url(&self, credential_region: Option<Region>) -> Result<Url, ConfigError> {
		region::resolve_region(self.region.or(credential_region), self.base_url.as_deref())
	}
}
impl Default for TransportConfig {
	fn default() -> Self {
		Self {
			region: None,
			base_url: None,
			api_retry: RetryPolicy::default(),
			token_retry: RetryPolicy::default(),
			secret_retry: RetryPolicy::default(),
			rate_limit: RateLimitBudget::default(),
			safety_margin: Duration::seconds(60),
			request_timeout: Some(StdDuration::from_secs(30)),
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn base_url_precedence() {
		let config = TransportConfig::default();

		assert_eq!(
			config.resolve_base_url(None).expect("Default should resolve.").as_str(),
			"https://us-api.mimecast.com/"
		);
		assert_eq!(
			config.resolve_base_url(Some(Region::Au)).expect("Credential region.").host_str(),
			Some("au-api.mimecast.com")
		);

		let config = config.with_region(Region::De);

		assert_eq!(
			config.resolve_base_url(Some(Region::Au)).expect("Config region wins.").host_str(),
			Some("de-api.mimecast.com")
		);

		let config = config.with_base_url("https://proxy.example.com");

		assert_eq!(
			config.resolve_base_url(Some(Region::Au)).expect("Override wins.").host_str(),
			Some("proxy.example.com")
		);
	}

	#[test]
	fn lookup_reads_region_and_override() {
		let config = TransportConfig::from_lookup(|name| match name {
			REGION_VAR => Some("ZA".into()),
			BASE_URL_VAR => Some("   ".into()),
			_ => None,
		})
		.expect("Lookup should succeed.");

		assert_eq!(config.region, Some(Region::Za));
		assert_eq!(config.base_url, None);

		let err = TransportConfig::from_lookup(|name| (name == REGION_VAR).then(|| "xx".into()))
			.expect_err("Unknown region must fail.");

		assert!(matches!(err, ConfigError::UnknownRegion { .. }));
	}
}
