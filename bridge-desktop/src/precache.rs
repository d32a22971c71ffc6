//! Pre-cache worker: fetch the head of a media source into the
//! content-addressed cache directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::background::{
    cache_key_for, CACHE_DIR_NAME, CACHE_KEY_PARAMETER, FILE_PATH_PARAMETER, HEADER_PARAMETER,
    MAX_CACHE_FILE_SIZE_PARAMETER, PRE_CACHE_SIZE_PARAMETER, URL_PARAMETER,
};
use bridge_traits::{JobData, JobValue};
use futures_util::StreamExt;
use reqwest::header::RANGE;
use reqwest::{Client, Response};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::background::JobWorker;
use crate::error::WorkerError;

/// Output key carrying the number of bytes written.
pub const CACHED_BYTES_PARAMETER: &str = "cachedBytes";

/// Bytes to fetch: the requested size, capped by the per-file budget when
/// one is set.
fn fetch_limit(inputs: &JobData) -> Result<u64, WorkerError> {
    let requested = inputs
        .get_long(PRE_CACHE_SIZE_PARAMETER)
        .ok_or(WorkerError::MissingInput(PRE_CACHE_SIZE_PARAMETER))?;
    if requested <= 0 {
        return Err(WorkerError::InvalidInput {
            name: PRE_CACHE_SIZE_PARAMETER,
            reason: format!("must be positive, got {requested}"),
        });
    }

    let limit = match inputs.get_long(MAX_CACHE_FILE_SIZE_PARAMETER) {
        Some(max_file) if max_file > 0 => requested.min(max_file),
        _ => requested,
    };
    Ok(limit as u64)
}

/// Forwarded request headers, prefix stripped.
fn forwarded_headers(inputs: &JobData) -> Vec<(String, String)> {
    inputs
        .with_prefix(HEADER_PARAMETER)
        .filter_map(|(name, value)| match value {
            JobValue::Str(value) => Some((name.to_string(), value.clone())),
            JobValue::Long(_) => None,
        })
        .collect()
}

pub struct HttpPreCacheWorker {
    client: Client,
    cache_root: PathBuf,
}

impl HttpPreCacheWorker {
    pub fn new(cache_root: impl Into<PathBuf>) -> Result<Self, WorkerError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self::with_client(client, cache_root))
    }

    pub fn with_client(client: Client, cache_root: impl Into<PathBuf>) -> Self {
        Self {
            client,
            cache_root: cache_root.into(),
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_root.join(CACHE_DIR_NAME)
    }

    /// File the job writes, at the same content address playback reads.
    pub fn cache_path(&self, inputs: &JobData) -> Result<PathBuf, WorkerError> {
        let url = inputs
            .get_string(URL_PARAMETER)
            .filter(|url| !url.is_empty())
            .ok_or(WorkerError::MissingInput(URL_PARAMETER))?;
        let name = cache_key_for(inputs.get_string(CACHE_KEY_PARAMETER), url);
        Ok(self.cache_dir().join(name))
    }
}

/// Copy at most `limit` bytes of the body into `path`.
///
/// Servers that ignore Range send the whole body; the copy stops at the limit.
async fn write_head(
    response: Response,
    path: &Path,
    limit: u64,
    cancel: &CancellationToken,
) -> Result<u64, WorkerError> {
    let mut file = fs::File::create(path).await?;
    let mut written: u64 = 0;
    let mut body = response.bytes_stream();
    while written < limit {
        let chunk = tokio::select! {
            chunk = body.next() => chunk,
            _ = cancel.cancelled() => {
                debug!(written, "Pre-cache cancelled mid-transfer");
                return Err(WorkerError::Cancelled);
            }
        };
        let Some(chunk) = chunk else { break };
        let chunk = chunk?;
        let take = chunk.len().min((limit - written) as usize);
        file.write_all(&chunk[..take]).await?;
        written += take as u64;
    }
    file.flush().await?;
    Ok(written)
}

#[async_trait]
impl JobWorker for HttpPreCacheWorker {
    async fn run(
        &self,
        inputs: JobData,
        cancel: CancellationToken,
    ) -> Result<JobData, WorkerError> {
        let url = inputs
            .get_string(URL_PARAMETER)
            .filter(|url| !url.is_empty())
            .ok_or(WorkerError::MissingInput(URL_PARAMETER))?;
        let limit = fetch_limit(&inputs)?;

        let mut request = self
            .client
            .get(url)
            .header(RANGE, format!("bytes=0-{}", limit - 1));
        for (name, value) in forwarded_headers(&inputs) {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WorkerError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let path = self.cache_path(&inputs)?;
        fs::create_dir_all(self.cache_dir()).await?;

        // A partial file at the content address would read as a cached head.
        let written = match write_head(response, &path, limit, &cancel).await {
            Ok(written) => written,
            Err(e) => {
                if let Err(remove) = fs::remove_file(&path).await {
                    if remove.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %path.display(), error = %remove, "Failed to remove partial cache file");
                    }
                }
                return Err(e);
            }
        };

        info!(url = %url, written, path = %path.display(), "Pre-cache complete");
        Ok(JobData::new()
            .put_string(FILE_PATH_PARAMETER, path.to_string_lossy())
            .put_long(CACHED_BYTES_PARAMETER, written as i64))
    }
}
