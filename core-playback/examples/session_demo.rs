//! # Playback Session Example
//!
//! Drives one session against a scripted engine on the desktop bridges:
//! load a cached network source, play it through, pre-cache the next one
//! and dispose.
//!
//! Run with: `cargo run --example session_demo --package core-playback`

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bridge_desktop::{HttpArtworkWorker, HttpPreCacheWorker, ImageArtworkDecoder, TokioJobScheduler};
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::time::LogLevel;
use bridge_traits::{BridgeError, DrmProvider, JobKind, KeySystem, KeySystemId};
use core_playback::config::LoadControlConfig;
use core_playback::drm::ContentProtectionSession;
use core_playback::tracks::{MappedTrackInfo, TrackOverride};
use core_playback::traits::{
    AudioAttributes, MediaItem, RepeatMode, TimelineWindow, TrackConstraints, VideoFormat,
};
use core_playback::{
    spawn_session, CacheOptions, EngineSignal, EngineSignalSender, EngineState, MediaEngine,
    PreCacheRequest, PreCacheService, SessionDeps, SourceRequest,
};
use core_runtime::config::PlayerConfig;
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_runtime::PlayerEvent;

// ============================================================================
// Scripted Engine
// ============================================================================

/// Engine that walks through buffering, ready and ended on its own.
struct ScriptedEngine {
    signals: EngineSignalSender,
    position_ms: i64,
    duration_ms: i64,
    playing: bool,
}

impl ScriptedEngine {
    fn new(signals: EngineSignalSender) -> Self {
        Self {
            signals,
            position_ms: 0,
            duration_ms: 0,
            playing: false,
        }
    }

    fn signal(&self, state: EngineState) {
        let _ = self.signals.send(EngineSignal::StateChanged(state));
    }
}

impl MediaEngine for ScriptedEngine {
    fn configure_load_control(&mut self, config: &LoadControlConfig) {
        println!("load control: {config:?}");
    }

    fn set_audio_attributes(&mut self, attributes: AudioAttributes, handle_audio_focus: bool) {
        println!("audio attributes: {attributes:?} (focus: {handle_audio_focus})");
    }

    fn set_media_item(
        &mut self,
        item: MediaItem,
        protection: Option<&ContentProtectionSession>,
    ) -> core_playback::Result<()> {
        println!(
            "media item: {} via {:?} (protected: {})",
            item.uri,
            item.data_source.kind,
            protection.is_some()
        );
        self.duration_ms = item.clip_end_ms.unwrap_or(90_000);
        Ok(())
    }

    fn prepare(&mut self) {
        self.signal(EngineState::Buffering);
        self.signal(EngineState::Ready);
    }

    fn set_play_when_ready(&mut self, play_when_ready: bool) {
        self.playing = play_when_ready;
        if play_when_ready {
            self.position_ms = self.duration_ms;
            self.signal(EngineState::Ended);
        }
    }

    fn set_repeat_mode(&mut self, _mode: RepeatMode) {}

    fn set_volume(&mut self, _volume: f32) {}

    fn set_playback_speed(&mut self, _speed: f32) {}

    fn seek_to(&mut self, position_ms: i64) {
        self.position_ms = position_ms;
    }

    fn current_position_ms(&self) -> i64 {
        self.position_ms
    }

    fn buffered_position_ms(&self) -> i64 {
        self.duration_ms / 2
    }

    fn content_duration_ms(&self) -> i64 {
        self.duration_ms
    }

    fn video_format(&self) -> Option<VideoFormat> {
        Some(VideoFormat {
            width: 1280,
            height: 720,
            rotation_degrees: 0,
        })
    }

    fn timeline_window(&self) -> Option<TimelineWindow> {
        None
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn is_playing_ad(&self) -> Option<bool> {
        Some(false)
    }

    fn set_track_constraints(&mut self, _constraints: TrackConstraints) {}

    fn mapped_tracks(&self) -> Option<MappedTrackInfo> {
        None
    }

    fn set_track_override(&mut self, _selection: TrackOverride) {}

    fn stop(&mut self) {
        self.playing = false;
    }

    fn release(&mut self) {
        println!("engine released");
    }
}

/// Desktop hosts have no DRM key systems.
struct NoDrm;

impl DrmProvider for NoDrm {
    fn api_level(&self) -> u32 {
        u32::MAX
    }

    fn open_key_system(&self, id: KeySystemId) -> BridgeResult<Box<dyn KeySystem>> {
        Err(BridgeError::Unsupported(format!("{id:?} on desktop")))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(
        LoggingConfig::default()
            .with_format(LogFormat::Compact)
            .with_level(LogLevel::Debug),
    )?;

    let cache_root = std::env::temp_dir().join("player-session-demo");
    let scheduler = Arc::new(
        TokioJobScheduler::new()
            .with_worker(
                JobKind::PreCache,
                Arc::new(HttpPreCacheWorker::new(&cache_root)?),
            )
            .with_worker(
                JobKind::ArtworkFetch,
                Arc::new(HttpArtworkWorker::new(cache_root.join("artwork"))?),
            ),
    );

    let config = PlayerConfig::builder()
        .cache_dir(&cache_root)
        .job_scheduler(scheduler.clone())
        .drm_provider(Arc::new(NoDrm))
        .artwork_decoder(Arc::new(ImageArtworkDecoder))
        .build()
        .context("building player config")?;

    let handle = spawn_session(SessionDeps::new(config), |signals| {
        Box::new(ScriptedEngine::new(signals)) as Box<dyn MediaEngine>
    })?;
    let mut events = handle.subscribe();

    handle
        .set_data_source(
            SourceRequest::new("https://cdn.example.com/episode-1.mp4")
                .with_key("episode-1")
                .with_cache(CacheOptions::bounded(100 * 1024 * 1024, 10 * 1024 * 1024)),
        )
        .await?;
    handle.play();

    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .context("waiting for player events")?
            .context("event stream closed")?;
        println!("event: {}", serde_json::to_string(&event)?);
        if matches!(event, PlayerEvent::Completed { .. }) {
            break;
        }
    }

    let precache = PreCacheService::new(scheduler);
    let tag = precache.pre_cache(
        &PreCacheRequest::new("https://cdn.example.com/episode-2.mp4", 512 * 1024)
            .with_limits(100 * 1024 * 1024, 10 * 1024 * 1024),
    )?;
    println!("pre-cache scheduled: {tag}");
    println!("stopped {} pre-cache job(s)", precache.stop_pre_cache(&tag)?);

    handle.dispose().await;
    println!("session {} disposed", handle.id());
    Ok(())
}
