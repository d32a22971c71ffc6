//! Content-protection capability exposed by the host platform.
//!
//! The core decides *which* key system to use; the host owns the native
//! key-system objects (Android `MediaDrm`, EME `MediaKeys`, ...).

use std::fmt;

use uuid::Uuid;

use crate::error::Result;

/// Key systems the core knows how to negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySystemId {
    Widevine,
    ClearKey,
}

impl KeySystemId {
    /// Registered scheme UUID for the key system.
    pub fn uuid(&self) -> Uuid {
        match self {
            KeySystemId::Widevine => Uuid::from_u128(0xedef8ba9_79d6_4ace_a3c8_27dcd51d21ed),
            KeySystemId::ClearKey => Uuid::from_u128(0xe2719d58_a985_b3c9_781a_b030af78d30e),
        }
    }

    /// Look up a key system by its conventional name (`"widevine"`, `"clearkey"`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "widevine" => Some(KeySystemId::Widevine),
            "clearkey" => Some(KeySystemId::ClearKey),
            _ => None,
        }
    }
}

impl fmt::Display for KeySystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySystemId::Widevine => f.write_str("widevine"),
            KeySystemId::ClearKey => f.write_str("clearkey"),
        }
    }
}

/// Widevine robustness level requested on the native key system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityLevel {
    /// Hardware-backed decryption.
    L1,
    /// Software-only decryption.
    L3,
}

impl SecurityLevel {
    pub fn as_property(&self) -> &'static str {
        match self {
            SecurityLevel::L1 => "L1",
            SecurityLevel::L3 => "L3",
        }
    }
}

/// Native key-system instance owned by a content-protection session.
pub trait KeySystem: Send + Sync {
    fn id(&self) -> KeySystemId;

    /// Force the robustness level used for subsequently opened key sessions.
    fn set_security_level(&mut self, level: SecurityLevel) -> Result<()>;

    /// Release native key-session resources. Must be idempotent.
    fn release(&mut self);
}

/// Host DRM capability.
pub trait DrmProvider: Send + Sync {
    /// Platform DRM API level (Android SDK level on Android; hosts without a
    /// versioned API report their own monotonically increasing value).
    fn api_level(&self) -> u32;

    /// Open a native key system. Returns [`BridgeError::Unsupported`] when
    /// the platform has no implementation for `id`.
    ///
    /// [`BridgeError::Unsupported`]: crate::error::BridgeError::Unsupported
    fn open_key_system(&self, id: KeySystemId) -> Result<Box<dyn KeySystem>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_system_uuids_match_registry() {
        assert_eq!(
            KeySystemId::Widevine.uuid().to_string(),
            "edef8ba9-79d6-4ace-a3c8-27dcd51d21ed"
        );
        assert_eq!(
            KeySystemId::ClearKey.uuid().to_string(),
            "e2719d58-a985-b3c9-781a-b030af78d30e"
        );
    }

    #[test]
    fn key_system_lookup_is_case_insensitive() {
        assert_eq!(KeySystemId::from_name("Widevine"), Some(KeySystemId::Widevine));
        assert_eq!(KeySystemId::from_name("clearkey"), Some(KeySystemId::ClearKey));
        assert_eq!(KeySystemId::from_name("playready"), None);
    }
}
