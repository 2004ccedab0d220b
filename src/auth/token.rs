//! Access token model, lifecycle helpers, and builder.

// self
use crate::{_prelude::*, auth::Secret};

/// Lifecycle position of a token relative to a safety margin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenStatus {
	/// Token is usable and outside the safety margin.
	Valid,
	/// Token is inside the safety margin and should be refreshed before use.
	Expiring,
	/// Token is past its expiry instant.
	Expired,
}

/// Errors produced by [`AccessTokenBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum AccessTokenBuilderError {
	/// Issued when no token value was provided.
	#[error("Access token value is required.")]
	MissingValue,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
}

/// Short-lived bearer value authorizing API calls.
#[derive(Clone)]
pub struct AccessToken {
	/// Bearer value; callers must avoid logging it.
	pub value: Secret,
	/// Instant the token was issued.
	pub issued_at: OffsetDateTime,
	/// Instant the token stops being accepted.
	pub expires_at: OffsetDateTime,
}
impl AccessToken {
	/// Returns a builder for constructing tokens.
	pub fn builder() -> AccessTokenBuilder {
		AccessTokenBuilder::default()
	}

	/// Computes the lifecycle status at `instant`, treating the final `safety_margin` of the
	/// lifetime as [`TokenStatus::Expiring`].
	pub fn status_at(&self, instant: OffsetDateTime, safety_margin: Duration) -> TokenStatus {
		if instant >= self.expires_at {
			return TokenStatus::Expired;
		}
		if instant >= self.expires_at - safety_margin {
			return TokenStatus::Expiring;
		}

		TokenStatus::Valid
	}

	/// Returns `true` if the token is usable without refresh at `instant`.
	pub fn is_valid_at(&self, instant: OffsetDateTime, safety_margin: Duration) -> bool {
		matches!(self.status_at(instant, safety_margin), TokenStatus::Valid)
	}

	/// Returns `true` if the token has expired at `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}

	/// Remaining lifetime at `instant`; negative once expired.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		self.expires_at - instant
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("value", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`AccessToken`].
#[derive(Clone, Debug, Default)]
pub struct AccessTokenBuilder {
	value: Option<Secret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl AccessTokenBuilder {
	/// Provides the bearer value.
	pub fn value(mut self, token: impl Into<String>) -> Self {
		self.value = Some(Secret::new(token));

		self
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Consumes the builder and produces an [`AccessToken`].
	pub fn build(self) -> Result<AccessToken, AccessTokenBuilderError> {
		let value = self.value.ok_or(AccessTokenBuilderError::MissingValue)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => issued_at + delta,
			(None, None) => return Err(AccessTokenBuilderError::MissingExpiry),
		};

		Ok(AccessToken { value, issued_at, expires_at })
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn token() -> AccessToken {
		AccessToken::builder()
			.value("bearer")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_in(Duration::minutes(30))
			.build()
			.expect("Token builder should succeed.")
	}

	#[test]
	fn status_respects_safety_margin() {
		let token = token();
		let margin = Duration::seconds(60);

		assert_eq!(token.expires_at, macros::datetime!(2025-01-01 00:30 UTC));
		assert_eq!(
			token.status_at(macros::datetime!(2025-01-01 00:10 UTC), margin),
			TokenStatus::Valid
		);
		assert_eq!(
			token.status_at(macros::datetime!(2025-01-01 00:29:00 UTC), margin),
			TokenStatus::Expiring
		);
		assert_eq!(
			token.status_at(macros::datetime!(2025-01-01 00:30 UTC), margin),
			TokenStatus::Expired
		);
		assert!(token.is_valid_at(macros::datetime!(2025-01-01 00:28:59 UTC), margin));
	}

	#[test]
	fn builder_requires_value_and_expiry() {
		assert_eq!(
			AccessToken::builder().expires_in(Duration::MINUTE).build().map(|_| ()),
			Err(AccessTokenBuilderError::MissingValue)
		);
		assert_eq!(
			AccessToken::builder().value("v").build().map(|_| ()),
			Err(AccessTokenBuilderError::MissingExpiry)
		);
	}

	#[test]
	fn debug_redacts_value() {
		assert!(!format!("{:?}", token()).contains("bearer"));
	}
}
