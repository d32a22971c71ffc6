//! Cache options carried by a source request

use serde::{Deserialize, Serialize};

/// Per-request transport cache settings.
///
/// Caching only happens when `enabled` is set and both budgets are
/// positive; a zero budget disables it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheOptions {
    #[serde(rename = "useCache")]
    pub enabled: bool,

    /// Total cache budget in bytes
    #[serde(rename = "maxCacheSize")]
    pub max_bytes: i64,

    /// Largest single cache file in bytes
    #[serde(rename = "maxCacheFileSize")]
    pub max_file_bytes: i64,
}

impl CacheOptions {
    /// Cache disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enabled cache with both budgets set.
    pub fn bounded(max_bytes: i64, max_file_bytes: i64) -> Self {
        Self {
            enabled: true,
            max_bytes,
            max_file_bytes,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_max_bytes(mut self, bytes: i64) -> Self {
        self.max_bytes = bytes;
        self
    }

    pub fn with_max_file_bytes(mut self, bytes: i64) -> Self {
        self.max_file_bytes = bytes;
        self
    }

    /// True when a source should be wrapped with the disk cache.
    pub fn has_budget(&self) -> bool {
        self.enabled && self.max_bytes > 0 && self.max_file_bytes > 0
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_bytes < 0 {
            return Err("maxCacheSize must not be negative".to_string());
        }

        if self.max_file_bytes < 0 {
            return Err("maxCacheFileSize must not be negative".to_string());
        }

        if self.max_bytes > 0 && self.max_file_bytes > self.max_bytes {
            return Err("maxCacheFileSize cannot exceed maxCacheSize".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_disabled() {
        let options = CacheOptions::default();
        assert!(!options.enabled);
        assert!(!options.has_budget());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_zero_budget_disables_cache() {
        assert!(!CacheOptions::bounded(0, 100).has_budget());
        assert!(!CacheOptions::bounded(100, 0).has_budget());
        assert!(CacheOptions::bounded(100, 10).has_budget());
        assert!(!CacheOptions::bounded(100, 10).with_enabled(false).has_budget());
    }

    #[test]
    fn test_validation() {
        assert!(CacheOptions::new().with_max_bytes(-1).validate().is_err());
        assert!(CacheOptions::bounded(10, 20).validate().is_err());
        assert!(CacheOptions::bounded(0, 20).validate().is_ok());
    }

    #[test]
    fn test_host_field_names() {
        let options: CacheOptions = serde_json::from_str(
            r#"{"useCache": true, "maxCacheSize": 1000, "maxCacheFileSize": 100}"#,
        )
        .unwrap();
        assert_eq!(options, CacheOptions::bounded(1000, 100));
    }
}
