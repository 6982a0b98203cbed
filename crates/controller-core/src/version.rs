use serde::Serialize;

/// Build/version metadata, surfaced on the admin config-dump endpoint.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
	pub version: &'static str,
	pub rust_version: &'static str,
	pub build_profile: &'static str,
}

impl BuildInfo {
	pub const fn new() -> Self {
		Self {
			version: env!("CARGO_PKG_VERSION"),
			rust_version: "1.85",
			build_profile: if cfg!(debug_assertions) {
				"debug"
			} else {
				"release"
			},
		}
	}
}

impl Default for BuildInfo {
	fn default() -> Self {
		Self::new()
	}
}
