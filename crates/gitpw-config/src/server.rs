//! Server URL normalisation and the API version model.

use std::fmt::{self, Display, Formatter};

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::error::{ConfigError, ConfigResult};

static VERSIONED_API: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/api/(\d+)\.(\d+)$").expect("static regex is valid"));
static API_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/api(/\d+\.\d+)?$").expect("static regex is valid"));

/// REST API version advertised in the server URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
}

impl ApiVersion {
    /// Oldest supported version, assumed when the URL carries none.
    pub const V1_0: Self = Self::new(1, 0);
    /// First version with native multi-value filters and name/email filtering.
    pub const V1_1: Self = Self::new(1, 1);
    /// First version allowing bundle mutation.
    pub const V1_2: Self = Self::new(1, 2);

    /// Build a version from its components.
    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl Display for ApiVersion {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}.{}", self.major, self.minor)
    }
}

/// Normalised server base URL plus the version embedded in it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDescriptor {
    url: String,
    version: Option<ApiVersion>,
}

impl ServerDescriptor {
    /// Normalise a configured server value.
    ///
    /// Trailing slashes are stripped and `/api` is appended unless the URL
    /// already ends in `/api` or `/api/{major}.{minor}`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidServer`] when the value is not a URL.
    pub fn parse(raw: &str) -> ConfigResult<Self> {
        let trimmed = raw.trim().trim_end_matches('/');
        Url::parse(trimmed).map_err(|err| ConfigError::InvalidServer {
            value: raw.to_string(),
            reason: err.to_string(),
        })?;

        let version = VERSIONED_API.captures(trimmed).and_then(|captures| {
            let major = captures.get(1)?.as_str().parse().ok()?;
            let minor = captures.get(2)?.as_str().parse().ok()?;
            Some(ApiVersion::new(major, minor))
        });

        let url = if API_SUFFIX.is_match(trimmed) {
            trimmed.to_string()
        } else {
            format!("{trimmed}/api")
        };

        Ok(Self { url, version })
    }

    /// Base URL every resource path hangs off.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Version used for feature gating; `1.0` when the URL carries none.
    #[must_use]
    pub fn version(&self) -> ApiVersion {
        self.version.unwrap_or(ApiVersion::V1_0)
    }

    /// Whether the configured URL named an explicit version.
    #[must_use]
    pub const fn has_explicit_version(&self) -> bool {
        self.version.is_some()
    }

    /// Emit the operator-facing warning for unversioned URLs.
    pub fn warn_if_unversioned(&self) {
        if self.has_explicit_version() {
            return;
        }
        tracing::warn!("Server version missing");
        tracing::warn!(
            "You should provide the server version in the URL configured via git-config or --server"
        );
        tracing::warn!("This will be required in git-pw 2.0");
    }

    /// Collection endpoint, always with a trailing slash.
    #[must_use]
    pub fn collection_url(&self, resource: &str) -> String {
        format!("{}/{resource}/", self.url)
    }

    /// Member endpoint, always with a trailing slash.
    #[must_use]
    pub fn member_url(&self, resource: &str, id: impl Display) -> String {
        format!("{}/{resource}/{id}/", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> ServerDescriptor {
        ServerDescriptor::parse(raw).expect("valid server")
    }

    #[test]
    fn unversioned_api_url_defaults_to_oldest_version() {
        let server = parse("https://example.com/api");
        assert_eq!(server.url(), "https://example.com/api");
        assert_eq!(server.version(), ApiVersion::V1_0);
        assert!(!server.has_explicit_version());
    }

    #[test]
    fn versioned_api_url_is_kept() {
        let server = parse("https://example.com/api/1.1/");
        assert_eq!(server.url(), "https://example.com/api/1.1");
        assert_eq!(server.version(), ApiVersion::V1_1);
        assert!(server.has_explicit_version());
    }

    #[test]
    fn bare_host_gains_api_suffix() {
        let server = parse("https://example.com/");
        assert_eq!(server.url(), "https://example.com/api");
        assert!(!server.has_explicit_version());
    }

    #[test]
    fn nested_prefix_gains_api_suffix() {
        let server = parse("https://example.com/patchwork");
        assert_eq!(server.url(), "https://example.com/patchwork/api");
    }

    #[test]
    fn invalid_url_is_rejected() {
        let err = ServerDescriptor::parse("not a url").expect_err("invalid URL");
        assert!(matches!(err, ConfigError::InvalidServer { .. }));
    }

    #[test]
    fn versions_order_lexicographically() {
        assert!(ApiVersion::V1_0 < ApiVersion::V1_1);
        assert!(ApiVersion::V1_1 < ApiVersion::V1_2);
        assert!(ApiVersion::new(2, 0) > ApiVersion::new(1, 10));
        assert_eq!(ApiVersion::V1_2.to_string(), "1.2");
    }

    #[test]
    fn resource_urls_carry_trailing_slash() {
        let server = parse("https://example.com/api/1.2");
        assert_eq!(
            server.collection_url("patches"),
            "https://example.com/api/1.2/patches/"
        );
        assert_eq!(
            server.member_url("bundles", 7),
            "https://example.com/api/1.2/bundles/7/"
        );
    }
}
