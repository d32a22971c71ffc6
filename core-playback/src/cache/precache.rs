//! Background pre-caching: warm the transport cache for a URL before any
//! session plays it.

use std::collections::BTreeMap;
use std::sync::Arc;

use bridge_traits::background::{
    CACHE_KEY_PARAMETER, HEADER_PARAMETER, MAX_CACHE_FILE_SIZE_PARAMETER,
    MAX_CACHE_SIZE_PARAMETER, PRE_CACHE_SIZE_PARAMETER, URL_PARAMETER,
};
use bridge_traits::{JobData, JobKind, JobRequest, JobScheduler};
use tracing::{info, instrument};

use crate::error::{PlaybackError, Result};
use crate::source::parse_location;

/// Subset of a source request needed to warm the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreCacheRequest {
    pub url: String,
    /// Bytes to fetch from the start of the media.
    pub pre_cache_size: i64,
    pub max_cache_size: i64,
    pub max_cache_file_size: i64,
    pub headers: BTreeMap<String, String>,
    pub cache_key: Option<String>,
}

impl PreCacheRequest {
    pub fn new(url: impl Into<String>, pre_cache_size: i64) -> Self {
        Self {
            url: url.into(),
            pre_cache_size,
            ..Default::default()
        }
    }

    pub fn with_limits(mut self, max_cache_size: i64, max_cache_file_size: i64) -> Self {
        self.max_cache_size = max_cache_size;
        self.max_cache_file_size = max_cache_file_size;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_cache_key(mut self, cache_key: impl Into<String>) -> Self {
        self.cache_key = Some(cache_key.into());
        self
    }

    /// Job inputs in the scheduler's key/value contract. `url` is the
    /// canonical source URL, the same string playback derives its cache
    /// address from.
    fn job_data(&self, url: &str) -> JobData {
        let mut data = JobData::new()
            .put_string(URL_PARAMETER, url)
            .put_long(PRE_CACHE_SIZE_PARAMETER, self.pre_cache_size)
            .put_long(MAX_CACHE_SIZE_PARAMETER, self.max_cache_size)
            .put_long(MAX_CACHE_FILE_SIZE_PARAMETER, self.max_cache_file_size);

        if let Some(key) = &self.cache_key {
            data = data.put_string(CACHE_KEY_PARAMETER, key.as_str());
        }

        for (name, value) in &self.headers {
            data = data.put_string(format!("{HEADER_PARAMETER}{name}"), value.as_str());
        }

        data
    }

    /// Job request tagged with the URL as given, so `stop_pre_cache` with the
    /// same string finds it.
    pub fn to_job_request(&self) -> Result<JobRequest> {
        let location = parse_location(&self.url)?;
        if !location.is_network() {
            return Err(PlaybackError::Configuration(format!(
                "pre-cache needs a network url, got {}",
                self.url
            )));
        }

        if self.pre_cache_size <= 0 {
            return Err(PlaybackError::Configuration(
                "preCacheSize must be greater than 0".to_string(),
            ));
        }

        Ok(JobRequest::new(
            JobKind::PreCache,
            self.url.as_str(),
            self.job_data(location.as_str()),
        ))
    }
}

/// Session-independent pre-cache entry points.
#[derive(Clone)]
pub struct PreCacheService {
    scheduler: Arc<dyn JobScheduler>,
}

impl PreCacheService {
    pub fn new(scheduler: Arc<dyn JobScheduler>) -> Self {
        Self { scheduler }
    }

    /// Enqueue a pre-cache job. Returns the job tag, which is the URL.
    #[instrument(skip_all, fields(url = %request.url))]
    pub fn pre_cache(&self, request: &PreCacheRequest) -> Result<String> {
        let job = request.to_job_request()?;
        let tag = job.tag.clone();
        let id = self.scheduler.enqueue(job)?;
        info!(job_id = %id, bytes = request.pre_cache_size, "Pre-cache scheduled");
        Ok(tag)
    }

    /// Cancel every job tagged with `url`. Unknown URLs are ignored.
    #[instrument(skip(self))]
    pub fn stop_pre_cache(&self, url: &str) -> Result<usize> {
        let cancelled = self.scheduler.cancel_by_tag(url)?;
        info!(cancelled, "Pre-cache stopped");
        Ok(cancelled)
    }
}

impl std::fmt::Debug for PreCacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreCacheService").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::{BridgeError, JobId, JobInfo, JobValue};
    use mockall::mock;
    use tokio::sync::watch;

    mock! {
        Scheduler {}

        impl JobScheduler for Scheduler {
            fn enqueue(&self, request: JobRequest) -> bridge_traits::error::Result<JobId>;
            fn cancel_by_tag(&self, tag: &str) -> bridge_traits::error::Result<usize>;
            fn observe(&self, id: &JobId) -> bridge_traits::error::Result<watch::Receiver<JobInfo>>;
        }
    }

    #[test]
    fn test_job_data_contract() {
        let request = PreCacheRequest::new("https://cdn.example.com/v.mp4", 1_000)
            .with_limits(10_000, 2_000)
            .with_header("Authorization", "Bearer x")
            .with_cache_key("v1");

        let data = request.to_job_request().unwrap().inputs;
        assert_eq!(data.get_string("url"), Some("https://cdn.example.com/v.mp4"));
        assert_eq!(data.get_long("preCacheSize"), Some(1_000));
        assert_eq!(data.get_long("maxCacheSize"), Some(10_000));
        assert_eq!(data.get_long("maxCacheFileSize"), Some(2_000));
        assert_eq!(data.get_string("cacheKey"), Some("v1"));
        assert_eq!(data.get_string("header_Authorization"), Some("Bearer x"));

        let headers: Vec<_> = data.with_prefix("header_").collect();
        assert_eq!(headers.len(), 1);
        assert!(matches!(headers[0].1, JobValue::Str(v) if v == "Bearer x"));
    }

    #[test]
    fn test_cache_key_omitted_when_absent() {
        let data = PreCacheRequest::new("https://cdn.example.com/v.mp4", 1)
            .to_job_request()
            .unwrap()
            .inputs;
        assert!(data.get_string("cacheKey").is_none());
    }

    #[test]
    fn test_job_carries_canonical_url_but_raw_tag() {
        let job = PreCacheRequest::new("HTTPS://CDN.example.com", 1)
            .to_job_request()
            .unwrap();
        assert_eq!(job.tag, "HTTPS://CDN.example.com");
        assert_eq!(job.inputs.get_string("url"), Some("https://cdn.example.com/"));
    }

    #[test]
    fn test_pre_cache_tags_job_with_url() {
        let mut scheduler = MockScheduler::new();
        scheduler
            .expect_enqueue()
            .withf(|job| {
                job.kind == JobKind::PreCache && job.tag == "https://cdn.example.com/v.mp4"
            })
            .times(1)
            .returning(|_| Ok(JobId::new()));

        let service = PreCacheService::new(Arc::new(scheduler));
        let tag = service
            .pre_cache(&PreCacheRequest::new("https://cdn.example.com/v.mp4", 512))
            .unwrap();
        assert_eq!(tag, "https://cdn.example.com/v.mp4");
    }

    #[test]
    fn test_pre_cache_rejects_local_source() {
        let mut scheduler = MockScheduler::new();
        scheduler.expect_enqueue().never();

        let service = PreCacheService::new(Arc::new(scheduler));
        let result = service.pre_cache(&PreCacheRequest::new("file:///sdcard/v.mp4", 512));
        assert!(matches!(result, Err(PlaybackError::Configuration(_))));
    }

    #[test]
    fn test_stop_pre_cache_cancels_by_tag() {
        let mut scheduler = MockScheduler::new();
        scheduler
            .expect_cancel_by_tag()
            .withf(|tag: &str| tag == "https://cdn.example.com/v.mp4")
            .times(1)
            .returning(|_| Ok(2));

        let service = PreCacheService::new(Arc::new(scheduler));
        assert_eq!(
            service.stop_pre_cache("https://cdn.example.com/v.mp4").unwrap(),
            2
        );
    }

    #[test]
    fn test_scheduler_failure_surfaces_as_bridge_error() {
        let mut scheduler = MockScheduler::new();
        scheduler
            .expect_enqueue()
            .returning(|_| Err(BridgeError::OperationFailed("queue full".to_string())));

        let service = PreCacheService::new(Arc::new(scheduler));
        let result = service.pre_cache(&PreCacheRequest::new("https://cdn.example.com/v.mp4", 1));
        assert!(matches!(result, Err(PlaybackError::Bridge(_))));
    }
}
