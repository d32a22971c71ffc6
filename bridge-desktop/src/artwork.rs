//! Notification artwork: fetch, downscale and decode.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::background::{FILE_PATH_PARAMETER, URL_PARAMETER};
use bridge_traits::{error::Result, Artwork, ArtworkDecoder, BridgeError, JobData};
use bytes::Bytes;
use image::{DynamicImage, ImageFormat};
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::background::JobWorker;
use crate::error::WorkerError;

/// Largest edge of a stored notification icon, in pixels.
pub const DEFAULT_ARTWORK_SIZE: u32 = 256;

/// Fetches artwork over HTTP and stores a small PNG for the notification.
///
/// Output: [`FILE_PATH_PARAMETER`] pointing at the stored file.
pub struct HttpArtworkWorker {
    client: Client,
    output_dir: PathBuf,
    max_size: u32,
}

impl HttpArtworkWorker {
    pub fn new(output_dir: impl Into<PathBuf>) -> std::result::Result<Self, WorkerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self::with_client(client, output_dir))
    }

    pub fn with_client(client: Client, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            output_dir: output_dir.into(),
            max_size: DEFAULT_ARTWORK_SIZE,
        }
    }

    pub fn with_max_size(mut self, max_size: u32) -> Self {
        self.max_size = max_size.max(1);
        self
    }

    /// Stored file for `url`.
    pub fn artwork_path(&self, url: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(url.as_bytes()));
        self.output_dir.join(format!("{digest}.png"))
    }

    async fn fetch(&self, url: &str) -> std::result::Result<Bytes, WorkerError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WorkerError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.bytes().await?)
    }
}

/// Decode `data`, shrink it to fit `max_size` and write it as PNG.
pub fn store_downscaled(
    data: &[u8],
    max_size: u32,
    path: &Path,
) -> std::result::Result<(u32, u32), WorkerError> {
    let img = image::load_from_memory(data)?;
    let img: DynamicImage = if img.width() > max_size || img.height() > max_size {
        img.thumbnail(max_size, max_size)
    } else {
        img
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    img.save_with_format(path, ImageFormat::Png)?;
    Ok((img.width(), img.height()))
}

#[async_trait]
impl JobWorker for HttpArtworkWorker {
    async fn run(
        &self,
        inputs: JobData,
        cancel: CancellationToken,
    ) -> std::result::Result<JobData, WorkerError> {
        let url = inputs
            .get_string(URL_PARAMETER)
            .filter(|url| !url.is_empty())
            .ok_or(WorkerError::MissingInput(URL_PARAMETER))?
            .to_string();

        let data = tokio::select! {
            data = self.fetch(&url) => data?,
            _ = cancel.cancelled() => return Err(WorkerError::Cancelled),
        };
        debug!(url = %url, bytes = data.len(), "Artwork downloaded");

        let path = self.artwork_path(&url);
        let max_size = self.max_size;
        let target = path.clone();
        let (width, height) =
            tokio::task::spawn_blocking(move || store_downscaled(&data, max_size, &target))
                .await
                .map_err(|e| WorkerError::Io(std::io::Error::other(e)))??;

        info!(url = %url, width, height, path = %path.display(), "Artwork stored");
        Ok(JobData::new().put_string(FILE_PATH_PARAMETER, path.to_string_lossy()))
    }
}

/// Decodes stored artwork with the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageArtworkDecoder;

impl ArtworkDecoder for ImageArtworkDecoder {
    fn decode(&self, path: &Path) -> Result<Artwork> {
        let img = image::open(path).map_err(|e| {
            BridgeError::OperationFailed(format!("Failed to decode {}: {e}", path.display()))
        })?;
        let rgba = img.to_rgba8();
        Ok(Artwork {
            width: rgba.width(),
            height: rgba.height(),
            pixels: Bytes::from(rgba.into_raw()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(width, height, Rgba([200u8, 10, 10, 255]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_large_artwork_is_downscaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cover.png");

        let size = store_downscaled(&png(1024, 512), 256, &path).unwrap();
        assert_eq!(size, (256, 128));

        let artwork = ImageArtworkDecoder.decode(&path).unwrap();
        assert_eq!((artwork.width, artwork.height), (256, 128));
        assert_eq!(artwork.pixels.len(), 256 * 128 * 4);
    }

    #[test]
    fn test_small_artwork_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("icon.png");

        assert_eq!(store_downscaled(&png(32, 48), 256, &path).unwrap(), (32, 48));
    }

    #[test]
    fn test_garbage_is_an_image_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = store_downscaled(b"not an image", 256, &dir.path().join("x.png"));
        assert!(matches!(result, Err(WorkerError::Image(_))));
    }

    #[test]
    fn test_decoder_reports_missing_file() {
        let result = ImageArtworkDecoder.decode(Path::new("/nonexistent/cover.png"));
        assert!(matches!(result, Err(BridgeError::OperationFailed(_))));
    }

    #[test]
    fn test_artwork_path_is_stable_per_url() {
        let worker = HttpArtworkWorker::with_client(Client::new(), "/tmp/artwork");
        let a = worker.artwork_path("https://img.example.com/a.png");
        assert_eq!(a, worker.artwork_path("https://img.example.com/a.png"));
        assert_ne!(a, worker.artwork_path("https://img.example.com/b.png"));
        assert_eq!(a.extension().and_then(|e| e.to_str()), Some("png"));
    }

    #[tokio::test]
    async fn test_missing_url_fails_without_network() {
        let worker = HttpArtworkWorker::with_client(Client::new(), "/tmp/artwork");
        let result = worker.run(JobData::new(), CancellationToken::new()).await;
        assert!(matches!(result, Err(WorkerError::MissingInput("url"))));
    }
}
