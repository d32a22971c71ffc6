//! # Transport Cache
//!
//! Decides whether a source's data is read through the bounded disk cache,
//! and owns the destructive cache wipe and the pre-cache job contract.
//!
//! ## Overview
//!
//! - [`CacheConfigurator::configure`] is the pure wrap decision.
//! - [`CacheConfigurator::data_source_for`] turns a validated request into the
//!   [`DataSourceSpec`] handed to the engine.
//! - [`clear_cache`] wipes the cache directory with no session alive.
//! - [`precache::PreCacheService`] schedules background warm-up jobs.
//!
//! ## Architecture
//!
//! ```text
//! SourceRequest ──> CacheConfigurator ──> DataSourceSpec ──> MediaEngine
//!                         │
//!                         └─ content address: sha256(cacheKey | uri)
//! ```

pub mod config;
pub mod precache;

pub use bridge_traits::background::{cache_key_for, CACHE_DIR_NAME};
pub use config::CacheOptions;
pub use precache::{PreCacheRequest, PreCacheService};

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::source::{SourceLocation, SourceRequest};

/// How the engine should read a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSourceKind {
    /// Direct HTTP(S) reads.
    Network,
    /// Local file, asset or content URI.
    LocalFile,
    /// HTTP(S) reads through a size-capped disk cache.
    CachedNetwork { max_bytes: i64, max_file_bytes: i64 },
}

impl DataSourceKind {
    pub fn is_cached(&self) -> bool {
        matches!(self, DataSourceKind::CachedNetwork { .. })
    }
}

/// Fully resolved data source description for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSourceSpec {
    pub kind: DataSourceKind,
    /// Set for network sources.
    pub user_agent: Option<String>,
    pub headers: BTreeMap<String, String>,
    /// Set for cached sources.
    pub cache_dir: Option<PathBuf>,
    /// Content address of the source inside the cache.
    pub cache_key: String,
}

/// Cache wrap decisions for one cache root.
#[derive(Debug, Clone)]
pub struct CacheConfigurator {
    cache_root: PathBuf,
    default_user_agent: String,
}

impl CacheConfigurator {
    pub fn new(cache_root: impl Into<PathBuf>, default_user_agent: impl Into<String>) -> Self {
        Self {
            cache_root: cache_root.into(),
            default_user_agent: default_user_agent.into(),
        }
    }

    /// Directory holding cached media.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_root.join(CACHE_DIR_NAME)
    }

    /// Wrap decision.
    ///
    /// Only network sources with caching enabled and both budgets positive
    /// are wrapped.
    pub fn configure(
        is_network_source: bool,
        use_cache: bool,
        max_bytes: i64,
        max_file_bytes: i64,
    ) -> DataSourceKind {
        if !is_network_source {
            return DataSourceKind::LocalFile;
        }

        if use_cache && max_bytes > 0 && max_file_bytes > 0 {
            DataSourceKind::CachedNetwork {
                max_bytes,
                max_file_bytes,
            }
        } else {
            DataSourceKind::Network
        }
    }

    /// Resolve the data source for a validated request.
    pub fn data_source_for(
        &self,
        request: &SourceRequest,
        location: &SourceLocation,
    ) -> DataSourceSpec {
        let kind = Self::configure(
            location.is_network(),
            request.cache.enabled,
            request.cache.max_bytes,
            request.cache.max_file_bytes,
        );

        let (user_agent, headers) = if location.is_network() {
            (
                Some(request.user_agent(&self.default_user_agent).to_string()),
                request.headers.clone(),
            )
        } else {
            (None, BTreeMap::new())
        };

        let cache_key = cache_key_for(request.custom_cache_key(), location.as_str());
        debug!(kind = ?kind, cache_key = %cache_key, "Resolved data source");

        DataSourceSpec {
            kind,
            user_agent,
            headers,
            cache_dir: kind.is_cached().then(|| self.cache_dir()),
            cache_key,
        }
    }
}

/// Outcome of a best-effort cache wipe.
#[derive(Debug, Default)]
pub struct ClearCacheReport {
    pub removed_files: usize,
    pub removed_dirs: usize,
    /// Entries that could not be removed, with the reason.
    pub failures: Vec<(PathBuf, String)>,
}

impl ClearCacheReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn record_failure(&mut self, path: &Path, error: &io::Error) {
        warn!(path = %path.display(), error = %error, "Failed to delete cache entry");
        self.failures.push((path.to_path_buf(), error.to_string()));
    }
}

/// Delete the whole cache directory below `cache_root`.
///
/// Independent of any session. Failures are logged and collected, never
/// returned as errors; everything that can be deleted is deleted.
#[instrument(skip_all, fields(cache_root = %cache_root.display()))]
pub async fn clear_cache(cache_root: &Path) -> ClearCacheReport {
    let root = cache_root.join(CACHE_DIR_NAME);
    let mut report = ClearCacheReport::default();

    match fs::symlink_metadata(&root).await {
        Ok(metadata) if !metadata.is_dir() => {
            match fs::remove_file(&root).await {
                Ok(()) => report.removed_files += 1,
                Err(e) => report.record_failure(&root, &e),
            }
            return report;
        }
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Cache directory absent, nothing to clear");
            return report;
        }
        Err(e) => {
            report.record_failure(&root, &e);
            return report;
        }
    }

    // Directories are removed children-first once their files are gone.
    let mut visited = Vec::new();
    let mut pending = vec![root];

    while let Some(dir) = pending.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                report.record_failure(&dir, &e);
                continue;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    report.record_failure(&dir, &e);
                    break;
                }
            };

            let path = entry.path();
            match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => pending.push(path),
                Ok(_) => match fs::remove_file(&path).await {
                    Ok(()) => report.removed_files += 1,
                    Err(e) => report.record_failure(&path, &e),
                },
                Err(e) => report.record_failure(&path, &e),
            }
        }

        visited.push(dir);
    }

    for dir in visited.into_iter().rev() {
        match fs::remove_dir(&dir).await {
            Ok(()) => report.removed_dirs += 1,
            Err(e) => report.record_failure(&dir, &e),
        }
    }

    info!(
        removed_files = report.removed_files,
        removed_dirs = report.removed_dirs,
        failures = report.failures.len(),
        "Cache cleared"
    );
    report
}
