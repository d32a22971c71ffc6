//! Source requests: what the host asks a session to load, and the
//! validation that runs before anything is built from it.

use std::collections::BTreeMap;

use url::Url;

use crate::cache::config::CacheOptions;
use crate::error::{PlaybackError, Result};

const USER_AGENT_HEADER: &str = "User-Agent";

/// DRM credentials attached to a source.
///
/// At most one of `license_url` and `clear_key` may be set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrmOptions {
    /// Widevine license server.
    pub license_url: Option<String>,
    /// Extra headers sent with every license request.
    pub headers: BTreeMap<String, String>,
    /// ClearKey JSON key set, served locally.
    pub clear_key: Option<Vec<u8>>,
}

impl DrmOptions {
    pub fn widevine(license_url: impl Into<String>) -> Self {
        Self {
            license_url: Some(license_url.into()),
            ..Default::default()
        }
    }

    pub fn clear_key(key: impl Into<Vec<u8>>) -> Self {
        Self {
            clear_key: Some(key.into()),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// License URL, if set and non-empty.
    pub fn license_url(&self) -> Option<&str> {
        self.license_url.as_deref().filter(|url| !url.is_empty())
    }

    /// ClearKey material, if set and non-empty.
    pub fn clear_key_bytes(&self) -> Option<&[u8]> {
        self.clear_key.as_deref().filter(|key| !key.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.license_url().is_none() && self.clear_key_bytes().is_none()
    }

    /// Reject requests that carry both a license URL and a ClearKey.
    pub fn validate(&self) -> Result<()> {
        if self.license_url().is_some() && self.clear_key_bytes().is_some() {
            return Err(PlaybackError::Configuration(
                "licenseUrl and clearKey are mutually exclusive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where a validated source lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    /// `http`/`https` URL.
    Network(Url),
    /// Anything the engine opens without the transport stack
    /// (`file`, `asset`, `content` URIs or bare paths).
    Local(String),
}

impl SourceLocation {
    pub fn is_network(&self) -> bool {
        matches!(self, SourceLocation::Network(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            SourceLocation::Network(url) => url.as_str(),
            SourceLocation::Local(path) => path,
        }
    }
}

/// Parse a source URI. Bare paths are accepted as local sources.
pub fn parse_location(uri: &str) -> Result<SourceLocation> {
    let uri = uri.trim();
    if uri.is_empty() {
        return Err(PlaybackError::Configuration("source uri is empty".to_string()));
    }

    match Url::parse(uri) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            if url.host_str().map_or(true, str::is_empty) {
                return Err(PlaybackError::Configuration(format!(
                    "network uri has no host: {uri}"
                )));
            }
            Ok(SourceLocation::Network(url))
        }
        Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => {
            Ok(SourceLocation::Local(uri.to_string()))
        }
        Err(e) => Err(PlaybackError::Configuration(format!(
            "malformed uri {uri}: {e}"
        ))),
    }
}

/// Everything needed to load one source into a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRequest {
    /// Caller-supplied identity echoed in `initialized`/`completed` events.
    pub key: Option<String>,
    pub uri: String,
    pub ad_tag_uri: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub cache: CacheOptions,
    /// Clip playback to `[0, overridden_duration_ms]` when positive.
    pub overridden_duration_ms: i64,
    pub drm: DrmOptions,
    /// Replaces the URI as the cache identity.
    pub cache_key: Option<String>,
}

impl SourceRequest {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_ad_tag(mut self, ad_tag_uri: impl Into<String>) -> Self {
        self.ad_tag_uri = Some(ad_tag_uri.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_cache(mut self, cache: CacheOptions) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_overridden_duration_ms(mut self, duration_ms: i64) -> Self {
        self.overridden_duration_ms = duration_ms;
        self
    }

    pub fn with_drm(mut self, drm: DrmOptions) -> Self {
        self.drm = drm;
        self
    }

    pub fn with_cache_key(mut self, cache_key: impl Into<String>) -> Self {
        self.cache_key = Some(cache_key.into());
        self
    }

    /// Non-empty custom cache key.
    pub fn custom_cache_key(&self) -> Option<&str> {
        self.cache_key.as_deref().filter(|key| !key.is_empty())
    }

    /// Non-empty ad tag.
    pub fn ad_tag(&self) -> Option<&str> {
        self.ad_tag_uri.as_deref().filter(|tag| !tag.trim().is_empty())
    }

    /// `User-Agent` header when present, `default` otherwise.
    pub fn user_agent<'a>(&'a self, default: &'a str) -> &'a str {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(USER_AGENT_HEADER))
            .map(|(_, value)| value.as_str())
            .unwrap_or(default)
    }

    /// Validate the request and resolve its location.
    ///
    /// Runs before any DRM or cache decision is made.
    pub fn validate(&self) -> Result<SourceLocation> {
        let location = parse_location(&self.uri)?;

        if let Some(tag) = self.ad_tag() {
            Url::parse(tag).map_err(|e| {
                PlaybackError::Configuration(format!("malformed ad tag uri {tag}: {e}"))
            })?;
        }

        if self.overridden_duration_ms < 0 {
            return Err(PlaybackError::Configuration(format!(
                "overridden duration must not be negative (got {})",
                self.overridden_duration_ms
            )));
        }

        self.drm.validate()?;
        self.cache
            .validate()
            .map_err(PlaybackError::Configuration)?;

        Ok(location)
    }
}
