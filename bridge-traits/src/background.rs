//! Background Job Scheduling
//!
//! Contract for the host's out-of-band work queue (Android WorkManager,
//! BGTaskScheduler, a tokio worker pool on desktop). Jobs are one-shot,
//! tagged for bulk cancellation, and report progress through a watch
//! channel that the core observes until the job reaches a terminal state.

use std::collections::BTreeMap;
use std::fmt;

use sha2::{Digest, Sha256};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::Result;

/// Input key carrying the source (or artwork) URL.
pub const URL_PARAMETER: &str = "url";
/// Input key carrying the number of bytes to pre-cache.
pub const PRE_CACHE_SIZE_PARAMETER: &str = "preCacheSize";
/// Input key carrying the total cache budget in bytes.
pub const MAX_CACHE_SIZE_PARAMETER: &str = "maxCacheSize";
/// Input key carrying the per-file cache budget in bytes.
pub const MAX_CACHE_FILE_SIZE_PARAMETER: &str = "maxCacheFileSize";
/// Input key carrying an explicit cache key.
pub const CACHE_KEY_PARAMETER: &str = "cacheKey";
/// Prefix applied to every HTTP header forwarded to a job.
pub const HEADER_PARAMETER: &str = "header_";
/// Output key carrying the path of a produced file (decoded artwork).
pub const FILE_PATH_PARAMETER: &str = "filePath";

/// Cache subdirectory below the cache root. Playback reads and pre-cache
/// writes share it.
pub const CACHE_DIR_NAME: &str = "player_cache";

/// Content address of a cached source: sha256 of the custom key when
/// present, else of the URI.
///
/// `uri` must already be in canonical form (the serialization of the parsed
/// URL) so that playback and pre-cache agree on the address.
pub fn cache_key_for(custom_key: Option<&str>, uri: &str) -> String {
    let identity = custom_key.filter(|key| !key.is_empty()).unwrap_or(uri);
    hex::encode(Sha256::digest(identity.as_bytes()))
}

/// Job identifier assigned by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Kind of work a job performs. Hosts dispatch to a worker per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Fetch the head of a media source into the disk cache.
    PreCache,
    /// Fetch and downscale notification artwork.
    ArtworkFetch,
}

/// Job lifecycle as reported by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Enqueued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    /// Returns `true` once the job can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }
}

/// Value stored in a [`JobData`] bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobValue {
    Str(String),
    Long(i64),
}

/// Flat key/value bag used for job inputs and outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobData {
    values: BTreeMap<String, JobValue>,
}

impl JobData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_string(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), JobValue::Str(value.into()));
        self
    }

    pub fn put_long(mut self, key: impl Into<String>, value: i64) -> Self {
        self.values.insert(key.into(), JobValue::Long(value));
        self
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(JobValue::Str(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn get_long(&self, key: &str) -> Option<i64> {
        match self.values.get(key) {
            Some(JobValue::Long(value)) => Some(*value),
            _ => None,
        }
    }

    /// Iterate over entries whose key starts with `prefix`, yielding the
    /// key with the prefix stripped.
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a JobValue)> + 'a {
        self.values
            .iter()
            .filter_map(move |(key, value)| key.strip_prefix(prefix).map(|k| (k, value)))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One-shot job submission.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub kind: JobKind,
    /// Cancellation tag. Several jobs may share a tag.
    pub tag: String,
    pub inputs: JobData,
}

impl JobRequest {
    pub fn new(kind: JobKind, tag: impl Into<String>, inputs: JobData) -> Self {
        Self {
            kind,
            tag: tag.into(),
            inputs,
        }
    }
}

/// Snapshot of a job published on its watch channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub id: JobId,
    pub state: JobState,
    pub output: JobData,
    pub error: Option<String>,
}

impl JobInfo {
    pub fn enqueued(id: JobId) -> Self {
        Self {
            id,
            state: JobState::Enqueued,
            output: JobData::default(),
            error: None,
        }
    }
}

/// Host work queue.
///
/// Jobs run off the caller's thread. Completion is never pushed into the
/// caller; callers observe the job's watch channel instead.
pub trait JobScheduler: Send + Sync {
    /// Enqueue a job and return its identifier.
    fn enqueue(&self, request: JobRequest) -> Result<JobId>;

    /// Cancel every job carrying `tag`. Returns how many jobs were signalled.
    /// Unknown tags are not an error.
    fn cancel_by_tag(&self, tag: &str) -> Result<usize>;

    /// Subscribe to state updates for a job. The channel's current value is
    /// the latest known [`JobInfo`].
    fn observe(&self, id: &JobId) -> Result<watch::Receiver<JobInfo>>;
}
