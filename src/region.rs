//! Regional endpoint table and base URL resolution.

// self
use crate::{_prelude::*, error::ConfigError};

/// Fixed geographic Mimecast API deployment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
	/// Europe (excluding Germany).
	Eu,
	/// Germany.
	De,
	/// United States of America.
	#[default]
	Us,
	/// United States of America (USB).
	Usb,
	/// Canada.
	Ca,
	/// South Africa.
	Za,
	/// Australia.
	Au,
	/// Offshore.
	Je,
}
impl Region {
	/// Every known region, in table order.
	pub const ALL: [Region; 8] = [
		Region::Eu,
		Region::De,
		Region::Us,
		Region::Usb,
		Region::Ca,
		Region::Za,
		Region::Au,
		Region::Je,
	];

	/// Returns the region code used in configuration.
	pub const fn code(self) -> &'static str {
		match self {
			Region::Eu => "eu",
			Region::De => "de",
			Region::Us => "us",
			Region::Usb => "usb",
			Region::Ca => "ca",
			Region::Za => "za",
			Region::Au => "au",
			Region::Je => "je",
		}
	}

	/// Returns the fixed API base URL for the region.
	pub const fn base_url(self) -> &'static str {
		match self {
			Region::Eu => "https://eu-api.mimecast.com",
			Region::De => "https://de-api.mimecast.com",
			Region::Us => "https://us-api.mimecast.com",
			Region::Usb => "https://usb-api.mimecast.com",
			Region::Ca => "https://ca-api.mimecast.com",
			Region::Za => "https://za-api.mimecast.com",
			Region::Au => "https://au-api.mimecast.com",
			Region::Je => "https://je-api.mimecast.com",
		}
	}

	/// Returns a human-readable description of the region.
	pub const fn description(self) -> &'static str {
		match self {
			Region::Eu => "Europe (excluding Germany)",
			Region::De => "Germany",
			Region::Us => "United States of America",
			Region::Usb => "United States of America (USB)",
			Region::Ca => "Canada",
			Region::Za => "South Africa",
			Region::Au => "Australia",
			Region::Je => "Offshore",
		}
	}
}
impl Display for Region {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.code())
	}
}
impl FromStr for Region {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let code = s.trim().to_ascii_lowercase();

		Region::ALL
			.into_iter()
			.find(|region| region.code() == code)
			.ok_or(ConfigError::UnknownRegion { code: s.trim().to_owned() })
	}
}

/// Resolves the API base URL from an optional region code and an optional override.
///
/// The override wins whenever it is present and must be an absolute `https` URL. Without
/// either input the `us` deployment is used.
pub fn resolve(region_code: Option<&str>, override_url: Option<&str>) -> Result<Url, ConfigError> {
	if let Some(raw) = override_url {
		return parse_base_url(raw);
	}

	let region = match region_code {
		Some(code) => code.parse()?,
		None => Region::default(),
	};

	parse_base_url(region.base_url())
}

/// Resolves the base URL from an already-typed region.
pub fn resolve_region(
	region: Option<Region>,
	override_url: Option<&str>,
) -> Result<Url, ConfigError> {
	resolve(region.map(Region::code), override_url)
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
	let url = Url::parse(raw.trim())
		.map_err(|source| ConfigError::InvalidBaseUrl { url: raw.to_owned(), source })?;

	if url.scheme() != "https" || url.cannot_be_a_base() || url.host_str().is_none() {
		return Err(ConfigError::InsecureBaseUrl { url: raw.to_owned() });
	}

	Ok(url)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn override_wins_over_region_code() {
		let url = resolve(Some("de"), Some("https://proxy.example.com/mimecast"))
			.expect("Override URL should resolve.");

		assert_eq!(url.as_str(), "https://proxy.example.com/mimecast");
	}

	#[test]
	fn region_code_maps_to_fixed_endpoint() {
		let url = resolve(Some("de"), None).expect("Germany should resolve.");

		assert_eq!(url.host_str(), Some("de-api.mimecast.com"));

		let url = resolve(Some(" USB "), None).expect("Codes should be case-insensitive.");

		assert_eq!(url.host_str(), Some("usb-api.mimecast.com"));
	}

	#[test]
	fn defaults_to_us() {
		let url = resolve(None, None).expect("Default region should resolve.");

		assert_eq!(url.host_str(), Some("us-api.mimecast.com"));
	}

	#[test]
	fn unknown_region_is_rejected() {
		let err = resolve(Some("mars"), None).expect_err("Unknown codes must fail.");

		assert!(matches!(err, ConfigError::UnknownRegion { code } if code == "mars"));
	}

	#[test]
	fn insecure_or_relative_overrides_are_rejected() {
		assert!(matches!(
			resolve(None, Some("http://eu-api.mimecast.com")),
			Err(ConfigError::InsecureBaseUrl { .. })
		));
		assert!(matches!(
			resolve(None, Some("/api/v2")),
			Err(ConfigError::InvalidBaseUrl { .. })
		));
	}

	#[test]
	fn every_region_has_a_distinct_https_endpoint() {
		let mut hosts = Region::ALL
			.iter()
			.map(|region| {
				resolve_region(Some(*region), None)
					.expect("Table endpoints should be valid.")
					.host_str()
					.map(str::to_owned)
			})
			.collect::<Vec<_>>();

		hosts.sort();
		hosts.dedup();

		assert_eq!(hosts.len(), Region::ALL.len());
		assert_eq!(Region::Je.description(), "Offshore");
	}
}
