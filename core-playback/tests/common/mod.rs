//! Shared fakes for the session integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    Artwork, ArtworkDecoder, BridgeError, DrmProvider, JobData, JobId, JobInfo, JobRequest,
    JobScheduler, JobState, KeySystem, KeySystemId, MediaSession, MediaSessionHost,
    NotificationPresenter, NotificationSpec, PlaybackStateSnapshot, RemoteCommand, SecurityLevel,
    SessionMetadata, SessionToken,
};
use bytes::Bytes;
use core_playback::config::LoadControlConfig;
use core_playback::drm::{ContentProtectionSession, DrmScheme};
use core_playback::tracks::{MappedTrackInfo, TrackOverride};
use core_playback::traits::{
    AudioAttributes, MediaEngine, MediaItem, RepeatMode, TimelineWindow, TrackConstraints,
    VideoFormat,
};
use core_playback::{spawn_session, EngineSignalSender, PlaybackError, SessionDeps, SessionHandle};
use core_runtime::config::PlayerConfig;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

// ============================================================================
// Fake Engine
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    LoadControl,
    AudioAttributes { handle_audio_focus: bool },
    SetMediaItem,
    Prepare,
    PlayWhenReady(bool),
    Repeat(RepeatMode),
    Volume(f32),
    Speed(f32),
    Seek(i64),
    Constraints(TrackConstraints),
    Override(TrackOverride),
    Stop,
    Release,
}

/// Engine state shared between the fake and the test body.
#[derive(Debug, Default)]
pub struct EngineLog {
    pub calls: Vec<EngineCall>,
    pub items: Vec<(MediaItem, Option<DrmScheme>)>,
    pub position_ms: i64,
    pub buffered_ms: i64,
    pub duration_ms: i64,
    pub video_format: Option<VideoFormat>,
    pub window: Option<TimelineWindow>,
    pub playing: bool,
    /// Consumed one per ad poll; `None` once exhausted.
    pub ad_samples: VecDeque<bool>,
    pub tracks: Option<MappedTrackInfo>,
    pub reject_media_item: bool,
}

impl EngineLog {
    pub fn count(&self, call: &EngineCall) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }
}

pub type SharedEngineLog = Arc<Mutex<EngineLog>>;

pub struct FakeEngine {
    log: SharedEngineLog,
}

impl FakeEngine {
    pub fn new(log: SharedEngineLog) -> Self {
        Self { log }
    }

    fn record(&self, call: EngineCall) {
        self.log.lock().calls.push(call);
    }
}

impl MediaEngine for FakeEngine {
    fn configure_load_control(&mut self, _config: &LoadControlConfig) {
        self.record(EngineCall::LoadControl);
    }

    fn set_audio_attributes(&mut self, _attributes: AudioAttributes, handle_audio_focus: bool) {
        self.record(EngineCall::AudioAttributes { handle_audio_focus });
    }

    fn set_media_item(
        &mut self,
        item: MediaItem,
        protection: Option<&ContentProtectionSession>,
    ) -> core_playback::Result<()> {
        let mut log = self.log.lock();
        if log.reject_media_item {
            return Err(PlaybackError::Engine("unsupported container".to_string()));
        }
        log.calls.push(EngineCall::SetMediaItem);
        log.items.push((item, protection.map(|p| p.scheme())));
        Ok(())
    }

    fn prepare(&mut self) {
        self.record(EngineCall::Prepare);
    }

    fn set_play_when_ready(&mut self, play_when_ready: bool) {
        self.record(EngineCall::PlayWhenReady(play_when_ready));
    }

    fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.record(EngineCall::Repeat(mode));
    }

    fn set_volume(&mut self, volume: f32) {
        self.record(EngineCall::Volume(volume));
    }

    fn set_playback_speed(&mut self, speed: f32) {
        self.record(EngineCall::Speed(speed));
    }

    fn seek_to(&mut self, position_ms: i64) {
        let mut log = self.log.lock();
        log.position_ms = position_ms;
        log.calls.push(EngineCall::Seek(position_ms));
    }

    fn current_position_ms(&self) -> i64 {
        self.log.lock().position_ms
    }

    fn buffered_position_ms(&self) -> i64 {
        self.log.lock().buffered_ms
    }

    fn content_duration_ms(&self) -> i64 {
        self.log.lock().duration_ms
    }

    fn video_format(&self) -> Option<VideoFormat> {
        self.log.lock().video_format
    }

    fn timeline_window(&self) -> Option<TimelineWindow> {
        self.log.lock().window
    }

    fn is_playing(&self) -> bool {
        self.log.lock().playing
    }

    fn is_playing_ad(&self) -> Option<bool> {
        self.log.lock().ad_samples.pop_front()
    }

    fn set_track_constraints(&mut self, constraints: TrackConstraints) {
        self.record(EngineCall::Constraints(constraints));
    }

    fn mapped_tracks(&self) -> Option<MappedTrackInfo> {
        self.log.lock().tracks.clone()
    }

    fn set_track_override(&mut self, selection: TrackOverride) {
        self.record(EngineCall::Override(selection));
    }

    fn stop(&mut self) {
        self.record(EngineCall::Stop);
    }

    fn release(&mut self) {
        self.record(EngineCall::Release);
    }
}

// ============================================================================
// Fake DRM
// ============================================================================

#[derive(Debug, Default)]
pub struct DrmLog {
    pub opened: Vec<KeySystemId>,
    pub levels: Vec<SecurityLevel>,
    pub released: usize,
}

pub struct FakeDrmProvider {
    pub api_level: u32,
    pub log: Arc<Mutex<DrmLog>>,
}

impl FakeDrmProvider {
    pub fn new(api_level: u32) -> Self {
        Self {
            api_level,
            log: Arc::default(),
        }
    }
}

struct FakeKeySystem {
    id: KeySystemId,
    log: Arc<Mutex<DrmLog>>,
}

impl KeySystem for FakeKeySystem {
    fn id(&self) -> KeySystemId {
        self.id
    }

    fn set_security_level(&mut self, level: SecurityLevel) -> BridgeResult<()> {
        self.log.lock().levels.push(level);
        Ok(())
    }

    fn release(&mut self) {
        self.log.lock().released += 1;
    }
}

impl DrmProvider for FakeDrmProvider {
    fn api_level(&self) -> u32 {
        self.api_level
    }

    fn open_key_system(&self, id: KeySystemId) -> BridgeResult<Box<dyn KeySystem>> {
        self.log.lock().opened.push(id);
        Ok(Box::new(FakeKeySystem {
            id,
            log: self.log.clone(),
        }))
    }
}

// ============================================================================
// Manual Job Scheduler
// ============================================================================

pub struct ScheduledJob {
    pub id: JobId,
    pub request: JobRequest,
    sender: watch::Sender<JobInfo>,
}

/// Scheduler whose jobs only change state when the test says so.
#[derive(Default)]
pub struct ManualScheduler {
    pub jobs: Mutex<Vec<ScheduledJob>>,
}

impl ManualScheduler {
    pub fn job_count(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn request(&self, index: usize) -> JobRequest {
        self.jobs.lock()[index].request.clone()
    }

    pub fn finish(&self, index: usize, state: JobState, output: JobData) {
        let jobs = self.jobs.lock();
        let job = &jobs[index];
        job.sender.send_replace(JobInfo {
            id: job.id,
            state,
            output,
            error: None,
        });
    }
}

impl JobScheduler for ManualScheduler {
    fn enqueue(&self, request: JobRequest) -> BridgeResult<JobId> {
        let id = JobId::new();
        let (sender, _) = watch::channel(JobInfo::enqueued(id));
        self.jobs.lock().push(ScheduledJob {
            id,
            request,
            sender,
        });
        Ok(id)
    }

    fn cancel_by_tag(&self, tag: &str) -> BridgeResult<usize> {
        let jobs = self.jobs.lock();
        let mut cancelled = 0;
        for job in jobs.iter().filter(|job| job.request.tag == tag) {
            job.sender.send_replace(JobInfo {
                id: job.id,
                state: JobState::Cancelled,
                output: JobData::new(),
                error: None,
            });
            cancelled += 1;
        }
        Ok(cancelled)
    }

    fn observe(&self, id: &JobId) -> BridgeResult<watch::Receiver<JobInfo>> {
        self.jobs
            .lock()
            .iter()
            .find(|job| job.id == *id)
            .map(|job| job.sender.subscribe())
            .ok_or_else(|| BridgeError::OperationFailed(format!("unknown job {id}")))
    }
}

// ============================================================================
// Now-Playing Surfaces
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    EnsureChannel(String),
    Attach(NotificationSpec),
    LargeIcon { width: u32, height: u32 },
    Detach,
    SessionCreated(String),
    SessionActive(bool),
    PlaybackState(PlaybackStateSnapshot),
    Metadata(SessionMetadata),
    SessionReleased,
}

pub type SurfaceLog = Arc<Mutex<Vec<SurfaceCall>>>;

pub struct RecordingPresenter {
    pub log: SurfaceLog,
}

impl NotificationPresenter for RecordingPresenter {
    fn ensure_channel(&self, channel_id: &str) -> BridgeResult<()> {
        self.log
            .lock()
            .push(SurfaceCall::EnsureChannel(channel_id.to_string()));
        Ok(())
    }

    fn attach(&self, spec: NotificationSpec) -> BridgeResult<()> {
        self.log.lock().push(SurfaceCall::Attach(spec));
        Ok(())
    }

    fn set_large_icon(&self, artwork: Artwork) {
        self.log.lock().push(SurfaceCall::LargeIcon {
            width: artwork.width,
            height: artwork.height,
        });
    }

    fn detach(&self) {
        self.log.lock().push(SurfaceCall::Detach);
    }
}

struct RecordingSession {
    token: String,
    log: SurfaceLog,
    released: bool,
}

impl MediaSession for RecordingSession {
    fn token(&self) -> SessionToken {
        SessionToken(self.token.clone())
    }

    fn set_active(&mut self, active: bool) {
        self.log.lock().push(SurfaceCall::SessionActive(active));
    }

    fn set_playback_state(&mut self, snapshot: PlaybackStateSnapshot) {
        self.log.lock().push(SurfaceCall::PlaybackState(snapshot));
    }

    fn set_metadata(&mut self, metadata: SessionMetadata) {
        self.log.lock().push(SurfaceCall::Metadata(metadata));
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.log.lock().push(SurfaceCall::SessionReleased);
        }
    }
}

/// Session host that keeps the remote-command sender so tests can play the
/// OS side.
pub struct RecordingSessionHost {
    pub log: SurfaceLog,
    pub remote: Mutex<Option<mpsc::UnboundedSender<RemoteCommand>>>,
    created: Mutex<usize>,
}

impl RecordingSessionHost {
    pub fn new(log: SurfaceLog) -> Self {
        Self {
            log,
            remote: Mutex::new(None),
            created: Mutex::new(0),
        }
    }

    pub fn send_remote(&self, command: RemoteCommand) {
        if let Some(remote) = self.remote.lock().as_ref() {
            remote.send(command).unwrap();
        }
    }
}

impl MediaSessionHost for RecordingSessionHost {
    fn create_session(
        &self,
        tag: &str,
        commands: mpsc::UnboundedSender<RemoteCommand>,
    ) -> BridgeResult<Box<dyn MediaSession>> {
        let mut created = self.created.lock();
        *created += 1;
        *self.remote.lock() = Some(commands);
        self.log
            .lock()
            .push(SurfaceCall::SessionCreated(tag.to_string()));
        Ok(Box::new(RecordingSession {
            token: format!("session-{}", *created),
            log: self.log.clone(),
            released: false,
        }))
    }
}

pub struct FixedArtworkDecoder;

impl ArtworkDecoder for FixedArtworkDecoder {
    fn decode(&self, path: &Path) -> BridgeResult<Artwork> {
        if path.as_os_str().is_empty() {
            return Err(BridgeError::OperationFailed("empty path".to_string()));
        }
        Ok(Artwork {
            width: 2,
            height: 2,
            pixels: Bytes::from_static(&[0; 16]),
        })
    }
}

// ============================================================================
// Session Harness
// ============================================================================

pub struct Harness {
    pub handle: SessionHandle,
    pub engine: SharedEngineLog,
    pub signals: EngineSignalSender,
    pub scheduler: Arc<ManualScheduler>,
    pub drm: Arc<Mutex<DrmLog>>,
    pub surfaces: SurfaceLog,
    pub session_host: Arc<RecordingSessionHost>,
}

pub struct HarnessBuilder {
    cache_dir: PathBuf,
    api_level: u32,
    notifications: bool,
    engine: EngineLog,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            cache_dir: PathBuf::from("/tmp/player-session-tests"),
            api_level: 30,
            notifications: true,
            engine: EngineLog::default(),
        }
    }

    pub fn api_level(mut self, level: u32) -> Self {
        self.api_level = level;
        self
    }

    pub fn without_notifications(mut self) -> Self {
        self.notifications = false;
        self
    }

    pub fn engine(mut self, engine: EngineLog) -> Self {
        self.engine = engine;
        self
    }

    pub fn config(&self) -> (PlayerConfig, Arc<ManualScheduler>, Arc<Mutex<DrmLog>>, SurfaceLog, Arc<RecordingSessionHost>) {
        let scheduler = Arc::new(ManualScheduler::default());
        let drm = FakeDrmProvider::new(self.api_level);
        let drm_log = drm.log.clone();
        let surfaces = SurfaceLog::default();
        let session_host = Arc::new(RecordingSessionHost::new(surfaces.clone()));

        let mut builder = PlayerConfig::builder()
            .cache_dir(&self.cache_dir)
            .job_scheduler(scheduler.clone())
            .drm_provider(Arc::new(drm));
        if self.notifications {
            builder = builder
                .notification_presenter(Arc::new(RecordingPresenter {
                    log: surfaces.clone(),
                }))
                .media_session_host(session_host.clone())
                .artwork_decoder(Arc::new(FixedArtworkDecoder));
        }

        (builder.build().unwrap(), scheduler, drm_log, surfaces, session_host)
    }

    pub fn spawn(self) -> Harness {
        let (config, scheduler, drm, surfaces, session_host) = self.config();
        let engine = Arc::new(Mutex::new(self.engine));

        let mut captured = None;
        let handle = spawn_session(SessionDeps::new(config), |signals| {
            captured = Some(signals);
            Box::new(FakeEngine::new(engine.clone())) as Box<dyn MediaEngine>
        })
        .unwrap();

        Harness {
            handle,
            engine,
            signals: captured.unwrap(),
            scheduler,
            drm,
            surfaces,
            session_host,
        }
    }
}

/// Collect everything currently queued on `events` without waiting.
pub fn drain<T>(events: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
