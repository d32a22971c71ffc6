//! Background jobs on the desktop scheduler: pre-caching and the artwork
//! pipeline from job submission to the notification icon.

mod common;

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_desktop::{
    store_downscaled, HttpPreCacheWorker, ImageArtworkDecoder, JobWorker, TokioJobScheduler,
    WorkerError,
};
use bridge_traits::background::{FILE_PATH_PARAMETER, URL_PARAMETER};
use bridge_traits::{JobData, JobKind};
use common::{
    EngineLog, FakeDrmProvider, FakeEngine, RecordingPresenter, RecordingSessionHost,
    SurfaceCall, SurfaceLog,
};
use core_playback::source::parse_location;
use core_playback::{
    spawn_session, CacheConfigurator, CacheOptions, ErrorKind, MediaEngine, NotificationConfig,
    PreCacheRequest, PreCacheService, SessionDeps, SourceRequest,
};
use core_runtime::config::PlayerConfig;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Holds every job until it is cancelled.
struct ParkedWorker;

#[async_trait]
impl JobWorker for ParkedWorker {
    async fn run(
        &self,
        _inputs: JobData,
        cancel: CancellationToken,
    ) -> Result<JobData, WorkerError> {
        cancel.cancelled().await;
        Err(WorkerError::Cancelled)
    }
}

/// Produces artwork locally instead of fetching it.
struct LocalArtworkWorker {
    dir: PathBuf,
}

#[async_trait]
impl JobWorker for LocalArtworkWorker {
    async fn run(
        &self,
        inputs: JobData,
        _cancel: CancellationToken,
    ) -> Result<JobData, WorkerError> {
        let url = inputs
            .get_string(URL_PARAMETER)
            .ok_or(WorkerError::MissingInput(URL_PARAMETER))?;

        let img = ImageBuffer::from_pixel(600, 300, Rgba([0u8, 90, 200, 255]));
        let mut png = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img).write_to(&mut png, ImageFormat::Png)?;

        let path = self.dir.join(format!("{}.png", url.len()));
        store_downscaled(png.get_ref(), 120, &path)?;
        Ok(JobData::new().put_string(FILE_PATH_PARAMETER, path.to_string_lossy()))
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never became true");
}

#[tokio::test]
async fn test_pre_cache_is_cancelled_by_url() {
    let scheduler = Arc::new(
        TokioJobScheduler::new().with_worker(JobKind::PreCache, Arc::new(ParkedWorker)),
    );
    let service = PreCacheService::new(scheduler.clone());
    let url = "https://cdn.example.com/next.mp4";

    let tag = service
        .pre_cache(&PreCacheRequest::new(url, 1024).with_limits(1 << 20, 1 << 16))
        .unwrap();
    assert_eq!(tag, url);
    assert_eq!(scheduler.active_jobs(), 1);

    assert_eq!(service.stop_pre_cache(url).unwrap(), 1);
    wait_until(|| scheduler.active_jobs() == 0).await;
    assert_eq!(service.stop_pre_cache(url).unwrap(), 0);
}

#[tokio::test]
async fn test_pre_cache_rejects_local_sources() {
    let scheduler = Arc::new(TokioJobScheduler::new());
    let service = PreCacheService::new(scheduler.clone());

    let error = service
        .pre_cache(&PreCacheRequest::new("file:///sdcard/a.mp4", 1024))
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Configuration);
    assert_eq!(scheduler.active_jobs(), 0);
}

#[test]
fn test_pre_cache_writes_where_playback_reads() {
    let root = tempfile::tempdir().unwrap();
    let configurator = CacheConfigurator::new(root.path(), "player-session");
    let worker = HttpPreCacheWorker::new(root.path()).unwrap();

    for (url, cache_key) in [
        ("HTTPS://CDN.Example.com", None),
        ("https://cdn.example.com/a b.mp4", None),
        ("https://cdn.example.com/a.mp4", Some("episode-1")),
    ] {
        let mut source = SourceRequest::new(url).with_cache(CacheOptions::bounded(1 << 20, 1 << 16));
        let mut pre_cache = PreCacheRequest::new(url, 1024);
        if let Some(key) = cache_key {
            source = source.with_cache_key(key);
            pre_cache = pre_cache.with_cache_key(key);
        }

        let location = parse_location(&source.uri).unwrap();
        let spec = configurator.data_source_for(&source, &location);
        let job = pre_cache.to_job_request().unwrap();

        assert_eq!(
            worker.cache_path(&job.inputs).unwrap(),
            configurator.cache_dir().join(&spec.cache_key),
            "cache address differs for {url}"
        );
    }
}

#[tokio::test]
async fn test_artwork_reaches_notification_through_desktop_scheduler() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = Arc::new(TokioJobScheduler::new().with_worker(
        JobKind::ArtworkFetch,
        Arc::new(LocalArtworkWorker {
            dir: dir.path().to_path_buf(),
        }),
    ));
    let surfaces = SurfaceLog::default();

    let config = PlayerConfig::builder()
        .cache_dir(dir.path())
        .job_scheduler(scheduler)
        .drm_provider(Arc::new(FakeDrmProvider::new(30)))
        .notification_presenter(Arc::new(RecordingPresenter {
            log: surfaces.clone(),
        }))
        .media_session_host(Arc::new(RecordingSessionHost::new(surfaces.clone())))
        .artwork_decoder(Arc::new(ImageArtworkDecoder))
        .build()
        .unwrap();

    let engine = Arc::new(Mutex::new(EngineLog::default()));
    let handle = spawn_session(SessionDeps::new(config), |_signals| {
        Box::new(FakeEngine::new(engine.clone())) as Box<dyn MediaEngine>
    })
    .unwrap();

    handle
        .setup_notification(
            NotificationConfig::new("Episode 1", "MainActivity")
                .with_image_url("https://img.example.com/cover.png"),
        )
        .await
        .unwrap();

    wait_until(|| {
        surfaces.lock().iter().any(|call| {
            *call
                == SurfaceCall::LargeIcon {
                    width: 120,
                    height: 60,
                }
        })
    })
    .await;

    handle.dispose().await;
}
