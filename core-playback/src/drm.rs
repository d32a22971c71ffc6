//! # Content Protection
//!
//! Chooses and builds the content-protection session for a source.
//!
//! Decision order:
//! 1. License URL set: Widevine with an HTTP license source.
//! 2. ClearKey set: ClearKey with a local license source.
//! 3. Neither: no session.
//!
//! Both set is rejected before anything is built. Hosts below the minimum
//! DRM API level get no session and a capability warning; playback carries
//! on unprotected.

use std::collections::BTreeMap;
use std::fmt;

use bridge_traits::{BridgeError, DrmProvider, KeySystem, KeySystemId, SecurityLevel};
use core_runtime::logging::{redact_headers, redact_url};
use tracing::{debug, info, warn};

use crate::error::{PlaybackError, Result};
use crate::source::DrmOptions;

/// Protection scheme of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrmScheme {
    Widevine,
    ClearKey,
}

impl DrmScheme {
    pub fn key_system(&self) -> KeySystemId {
        match self {
            DrmScheme::Widevine => KeySystemId::Widevine,
            DrmScheme::ClearKey => KeySystemId::ClearKey,
        }
    }
}

/// Where license responses come from.
#[derive(Clone, PartialEq, Eq)]
pub enum LicenseSource {
    /// License server with extra request headers.
    Http {
        url: String,
        headers: BTreeMap<String, String>,
    },
    /// Key material served without network access.
    Local { key_set: Vec<u8> },
}

impl fmt::Debug for LicenseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LicenseSource::Http { url, headers } => f
                .debug_struct("Http")
                .field("url", &redact_url(url))
                .field("headers", &redact_headers(headers))
                .finish(),
            LicenseSource::Local { key_set } => f
                .debug_struct("Local")
                .field("key_set", &format_args!("<{} bytes>", key_set.len()))
                .finish(),
        }
    }
}

/// Native key system backing a session.
pub enum KeySystemHandle {
    Native(Box<dyn KeySystem>),
    /// The platform refused the key system. Sources using this session fail
    /// at license time instead of silently playing with weaker protection.
    UnsupportedStub { reason: String },
}

impl KeySystemHandle {
    pub fn is_supported(&self) -> bool {
        matches!(self, KeySystemHandle::Native(_))
    }
}

impl fmt::Debug for KeySystemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySystemHandle::Native(system) => {
                f.debug_tuple("Native").field(&system.id()).finish()
            }
            KeySystemHandle::UnsupportedStub { reason } => f
                .debug_struct("UnsupportedStub")
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Key-system and license resources for one source.
///
/// Built fresh for every source and released when replaced or when the
/// session is disposed.
#[derive(Debug)]
pub struct ContentProtectionSession {
    scheme: DrmScheme,
    key_system: KeySystemHandle,
    license: LicenseSource,
    multi_session: bool,
    released: bool,
}

impl ContentProtectionSession {
    pub fn scheme(&self) -> DrmScheme {
        self.scheme
    }

    pub fn key_system(&self) -> &KeySystemHandle {
        &self.key_system
    }

    pub fn license(&self) -> &LicenseSource {
        &self.license
    }

    pub fn multi_session(&self) -> bool {
        self.multi_session
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Release native resources. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        if let KeySystemHandle::Native(system) = &mut self.key_system {
            system.release();
        }
        self.released = true;
        debug!(scheme = ?self.scheme, "Content protection session released");
    }
}

impl Drop for ContentProtectionSession {
    fn drop(&mut self) {
        self.release();
    }
}

/// Builds content-protection sessions from source DRM options.
#[derive(Debug, Clone, Copy)]
pub struct DrmConfigurator {
    min_api_level: u32,
}

impl DrmConfigurator {
    pub fn new(min_api_level: u32) -> Self {
        Self { min_api_level }
    }

    /// Build the session for `options`, or `None` when the source is clear
    /// or the host cannot do DRM.
    ///
    /// # Errors
    ///
    /// - [`PlaybackError::Configuration`] when both a license URL and a
    ///   ClearKey are set.
    /// - [`PlaybackError::Bridge`] when the host fails to configure an opened
    ///   key system.
    pub fn configure(
        &self,
        options: &DrmOptions,
        provider: &dyn DrmProvider,
    ) -> Result<Option<ContentProtectionSession>> {
        options.validate()?;

        let (scheme, license) = if let Some(url) = options.license_url() {
            (
                DrmScheme::Widevine,
                LicenseSource::Http {
                    url: url.to_string(),
                    headers: options.headers.clone(),
                },
            )
        } else if let Some(key_set) = options.clear_key_bytes() {
            (
                DrmScheme::ClearKey,
                LicenseSource::Local {
                    key_set: key_set.to_vec(),
                },
            )
        } else {
            return Ok(None);
        };

        let api_level = provider.api_level();
        if api_level < self.min_api_level {
            let warning = PlaybackError::Capability(format!(
                "protected content not supported on API level {} (minimum {})",
                api_level, self.min_api_level
            ));
            warn!(scheme = ?scheme, "{}", warning);
            return Ok(None);
        }

        let key_system = match scheme {
            DrmScheme::Widevine => self.open_widevine(provider)?,
            DrmScheme::ClearKey => KeySystemHandle::Native(
                provider.open_key_system(KeySystemId::ClearKey)?,
            ),
        };

        info!(scheme = ?scheme, license = ?license, supported = key_system.is_supported(), "Content protection configured");

        Ok(Some(ContentProtectionSession {
            scheme,
            key_system,
            license,
            multi_session: false,
            released: false,
        }))
    }

    /// Open Widevine forced to software security.
    ///
    /// An unsupported platform yields the explicit stub; any other failure
    /// propagates rather than falling back to a weaker key system.
    fn open_widevine(&self, provider: &dyn DrmProvider) -> Result<KeySystemHandle> {
        match provider.open_key_system(KeySystemId::Widevine) {
            Ok(mut system) => {
                system.set_security_level(SecurityLevel::L3)?;
                Ok(KeySystemHandle::Native(system))
            }
            Err(BridgeError::Unsupported(reason)) => {
                warn!(reason = %reason, "Widevine unsupported, using stub key system");
                Ok(KeySystemHandle::UnsupportedStub { reason })
            }
            Err(e) => Err(e.into()),
        }
    }
}
