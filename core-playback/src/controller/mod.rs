//! # Playback Controller
//!
//! Owns one [`MediaEngine`] for the lifetime of a session and everything
//! tied to it: the content-protection session, background job observers,
//! the notification and the ad-state poll.
//!
//! ## Overview
//!
//! The controller is synchronous and single-owner. The session loop in
//! [`crate::session`] feeds it host commands, engine signals, OS remote
//! commands, job completions and timer ticks one at a time, which gives the
//! ordering guarantees of the event stream without internal locking.
//!
//! ## Disposal
//!
//! [`PlaybackController::dispose`] releases the engine; from then on every
//! transport command is a no-op and reads return `0`. Disposal is
//! idempotent.

pub mod state;

use std::sync::Arc;

use bridge_traits::{DrmProvider, RemoteCommand};
use core_runtime::config::PlayerConfig;
use core_runtime::{EventBridge, PlayerEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::cache::CacheConfigurator;
use crate::config::LoadControlConfig;
use crate::drm::{ContentProtectionSession, DrmConfigurator};
use crate::error::{PlaybackError, Result};
use crate::jobs::{BackgroundJobCoordinator, JobCompletion, JobCompletionReceiver};
use crate::notification::{NotificationConfig, NotificationSessionManager};
use crate::source::SourceRequest;
use crate::tracks::{TrackOverride, TrackSelectionManager};
use crate::traits::{
    AudioAttributes, EngineSignal, MediaEngine, MediaItem, RepeatMode, TrackConstraints,
};

pub use state::{EngineSnapshot, PlaybackState, SessionState};

/// Audio is mixed with other apps until the host says otherwise.
const DEFAULT_MIX_WITH_OTHERS: bool = true;

pub struct PlaybackController {
    engine: Option<Box<dyn MediaEngine>>,
    events: Arc<EventBridge>,
    state: SessionState,
    is_playing_ad: bool,
    ad_poll_active: bool,
    track_constraints: TrackConstraints,

    protection: Option<ContentProtectionSession>,
    drm: DrmConfigurator,
    drm_provider: Arc<dyn DrmProvider>,
    cache: CacheConfigurator,
    tracks: TrackSelectionManager,
    jobs: BackgroundJobCoordinator,
    notifications: Option<NotificationSessionManager>,
}

impl PlaybackController {
    /// Wire a freshly created engine into a session.
    ///
    /// Applies the load control and the default audio attributes. OS remote
    /// commands for the media session are sent on `remote_commands`; job
    /// completions arrive on the returned receiver.
    pub fn new(
        config: &PlayerConfig,
        load_control: &LoadControlConfig,
        mut engine: Box<dyn MediaEngine>,
        events: Arc<EventBridge>,
        remote_commands: mpsc::UnboundedSender<RemoteCommand>,
    ) -> (Self, JobCompletionReceiver) {
        engine.configure_load_control(load_control);
        engine.set_audio_attributes(AudioAttributes::movie(), !DEFAULT_MIX_WITH_OTHERS);

        let (jobs, completions) = BackgroundJobCoordinator::new(config.job_scheduler.clone());
        let notifications = NotificationSessionManager::from_config(config, remote_commands);

        let controller = Self {
            engine: Some(engine),
            events,
            state: SessionState::default(),
            is_playing_ad: false,
            ad_poll_active: true,
            track_constraints: TrackConstraints::default(),
            protection: None,
            drm: DrmConfigurator::new(config.min_drm_api_level),
            drm_provider: config.drm_provider.clone(),
            cache: CacheConfigurator::new(&config.cache_dir, config.user_agent.clone()),
            tracks: TrackSelectionManager::default(),
            jobs,
            notifications,
        };
        (controller, completions)
    }

    /// Replace the track selection heuristics.
    pub fn with_track_selection(mut self, tracks: TrackSelectionManager) -> Self {
        self.tracks = tracks;
        self
    }

    /// Engine accessor; `None` once disposed.
    fn engine(&self) -> Option<&dyn MediaEngine> {
        self.engine.as_deref()
    }

    fn engine_mut(&mut self) -> Option<&mut (dyn MediaEngine + 'static)> {
        self.engine.as_deref_mut()
    }

    fn emit(&self, event: PlayerEvent) {
        debug!(event = %event, "Emitting player event");
        self.events.emit(event);
    }

    // ------------------------------------------------------------------
    // Source loading
    // ------------------------------------------------------------------

    /// Load a new source.
    ///
    /// Validation happens before anything is built. Session state and the
    /// previous content-protection session change only once the engine has
    /// accepted the new item.
    #[instrument(skip_all, fields(uri = %core_runtime::logging::redact_url(&request.uri)))]
    pub fn set_data_source(&mut self, request: SourceRequest) -> Result<()> {
        if self.engine.is_none() {
            return Err(PlaybackError::Disposed);
        }
        if self.state.phase.is_terminal() {
            return Err(PlaybackError::Engine(
                "session stopped after a fatal engine error; create a new session".to_string(),
            ));
        }

        let location = request.validate()?;
        let protection = self.drm.configure(&request.drm, self.drm_provider.as_ref())?;
        let data_source = self.cache.data_source_for(&request, &location);

        let item = MediaItem {
            uri: location.as_str().to_string(),
            ad_tag_uri: request.ad_tag().map(str::to_string),
            data_source,
            clip_end_ms: (request.overridden_duration_ms > 0)
                .then_some(request.overridden_duration_ms),
            custom_cache_key: request.custom_cache_key().map(str::to_string),
        };

        // A rejected item leaves the loaded source and its protection intact;
        // the new protection is released when dropped here.
        let Some(engine) = self.engine.as_deref_mut() else {
            return Err(PlaybackError::Disposed);
        };
        engine.set_media_item(item, protection.as_ref())?;

        if let Some(mut previous) = std::mem::replace(&mut self.protection, protection) {
            previous.release();
        }
        self.state.begin_source(request.key.clone());
        engine.prepare();

        info!(
            key = ?self.state.key,
            protected = self.protection.is_some(),
            "Source prepared"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    pub fn play(&mut self) {
        if let Some(engine) = self.engine_mut() {
            engine.set_play_when_ready(true);
        }
    }

    pub fn pause(&mut self) {
        if let Some(engine) = self.engine_mut() {
            engine.set_play_when_ready(false);
        }
    }

    /// Loop the whole source, never a single item.
    pub fn set_looping(&mut self, looping: bool) {
        let mode = if looping {
            RepeatMode::All
        } else {
            RepeatMode::Off
        };
        if let Some(engine) = self.engine_mut() {
            engine.set_repeat_mode(mode);
        }
    }

    pub fn set_volume(&mut self, volume: f64) {
        let volume = volume.clamp(0.0, 1.0) as f32;
        if let Some(engine) = self.engine_mut() {
            engine.set_volume(volume);
        }
    }

    /// Unclamped; the engine decides what it supports.
    pub fn set_speed(&mut self, speed: f64) {
        if let Some(engine) = self.engine_mut() {
            engine.set_playback_speed(speed as f32);
        }
    }

    pub fn seek_to(&mut self, position_ms: i64) {
        if let Some(engine) = self.engine_mut() {
            engine.seek_to(position_ms);
        }
    }

    /// Cap video selection. All zero clears every cap.
    pub fn set_track_parameters(&mut self, width: u32, height: u32, bitrate: u32) {
        let Some(engine) = self.engine.as_deref_mut() else {
            return;
        };
        self.track_constraints = self.track_constraints.apply(width, height, bitrate);
        engine.set_track_constraints(self.track_constraints);
    }

    pub fn track_constraints(&self) -> TrackConstraints {
        self.track_constraints
    }

    pub fn position(&self) -> i64 {
        self.engine().map_or(0, |engine| engine.current_position_ms())
    }

    /// Position plus the live window start, when the timeline has one.
    pub fn absolute_position(&self) -> i64 {
        let Some(engine) = self.engine() else {
            return 0;
        };
        let position = engine.current_position_ms();
        match engine.timeline_window() {
            Some(window) => window.window_start_ms + position,
            None => position,
        }
    }

    /// Select an audio track by label and group. Returns the override
    /// applied, if any rule matched.
    pub fn set_audio_track(&mut self, name: &str, group_index: usize) -> Option<TrackOverride> {
        let engine = self.engine.as_deref_mut()?;
        let mapped = engine.mapped_tracks()?;

        let selection = self.tracks.select_audio_track(&mapped, name, group_index);
        match selection {
            Some(selection) => {
                engine.set_track_override(selection);
                debug!(track = name, group_index, ?selection, "Audio track selected");
            }
            None => debug!(track = name, group_index, "No audio track matched"),
        }
        selection
    }

    /// `true` shares audio focus with other apps.
    pub fn set_mix_with_others(&mut self, mix_with_others: bool) {
        if let Some(engine) = self.engine_mut() {
            engine.set_audio_attributes(AudioAttributes::movie(), !mix_with_others);
        }
    }

    pub fn on_picture_in_picture_changed(&mut self, in_pip: bool) {
        self.emit(if in_pip {
            PlayerEvent::PipStart
        } else {
            PlayerEvent::PipStop
        });
    }

    // ------------------------------------------------------------------
    // Notification
    // ------------------------------------------------------------------

    pub fn setup_notification(&mut self, config: &NotificationConfig) -> Result<()> {
        let notifications = self.notifications.as_mut().ok_or_else(|| {
            PlaybackError::Capability(
                "notifications need a presenter and a media session host".to_string(),
            )
        })?;
        let Some(engine) = self.engine.as_deref_mut() else {
            return Err(PlaybackError::Disposed);
        };
        notifications.setup(config, engine, &mut self.jobs)
    }

    pub fn dispose_notification(&mut self) {
        if let Some(notifications) = self.notifications.as_mut() {
            notifications.teardown();
        }
    }

    /// Whether the loop should run the notification sync timer.
    pub fn wants_notification_sync(&self) -> bool {
        self.engine.is_some()
            && self
                .notifications
                .as_ref()
                .is_some_and(NotificationSessionManager::is_syncing)
    }

    pub fn on_notification_tick(&mut self) {
        if let (Some(engine), Some(notifications)) =
            (self.engine.as_deref(), self.notifications.as_mut())
        {
            notifications.sync_playback_state(engine);
        }
    }

    pub fn on_remote_command(&mut self, command: RemoteCommand) {
        let (Some(engine), Some(notifications)) =
            (self.engine.as_deref_mut(), self.notifications.as_mut())
        else {
            return;
        };
        let event = notifications.on_remote_command(command, engine);
        self.emit(event);
    }

    // ------------------------------------------------------------------
    // Loop inputs
    // ------------------------------------------------------------------

    /// Translate one engine signal into events.
    pub fn on_engine_signal(&mut self, signal: EngineSignal) {
        let Some(engine) = self.engine.as_deref() else {
            return;
        };

        let snapshot = EngineSnapshot {
            duration_ms: engine.content_duration_ms(),
            buffered_position_ms: engine.buffered_position_ms(),
            video_format: engine.video_format(),
        };
        let events = self.state.on_signal(&signal, &snapshot);

        if let EngineSignal::Error(detail) = &signal {
            warn!(detail = %detail, "Engine reported a fatal error");
        }
        if matches!(signal, EngineSignal::StateChanged(_)) {
            if let Some(notifications) = self.notifications.as_mut() {
                notifications.on_engine_state_changed(engine);
            }
        }

        for event in events {
            self.emit(event);
        }
    }

    /// Ad-state poll and buffered-range refresh, once per tick.
    pub fn on_ad_poll_tick(&mut self) {
        if !self.ad_poll_active {
            return;
        }
        let Some(engine) = self.engine.as_deref() else {
            return;
        };

        if let Some(playing_ad) = engine.is_playing_ad() {
            if playing_ad != self.is_playing_ad {
                self.is_playing_ad = playing_ad;
                let event = PlayerEvent::PlayingAdChanged {
                    is_playing_ad: playing_ad,
                    duration: engine.content_duration_ms(),
                };
                info!(playing_ad, "Ad playback state changed");
                self.events.emit(event);
            }
        }

        let loaded = !matches!(self.state.phase, PlaybackState::Idle | PlaybackState::Error);
        if loaded {
            let buffered = engine.buffered_position_ms();
            if let Some(event) = self.state.buffering_update(buffered, false) {
                self.events.emit(event);
            }
        }
    }

    /// Emit a buffered-range update regardless of change.
    pub fn request_buffering_update(&mut self) {
        let Some(engine) = self.engine.as_deref() else {
            return;
        };
        let buffered = engine.buffered_position_ms();
        if let Some(event) = self.state.buffering_update(buffered, true) {
            self.emit(event);
        }
    }

    pub fn on_job_completion(&mut self, completion: JobCompletion) {
        let Some(completion) = self.jobs.on_completion(completion) else {
            return;
        };
        if let Some(notifications) = self.notifications.as_mut() {
            notifications.on_job_completion(&completion);
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Release everything the session owns.
    ///
    /// Order: event consumer, engine, ad poll, notification and media
    /// session, job observers, content protection. Safe to call repeatedly.
    #[instrument(skip(self))]
    pub fn dispose(&mut self) {
        let Some(mut engine) = self.engine.take() else {
            debug!("Session already disposed");
            return;
        };

        self.events.detach();

        if self.state.initialized {
            engine.stop();
        }
        engine.release();
        drop(engine);

        self.ad_poll_active = false;

        if let Some(notifications) = self.notifications.as_mut() {
            notifications.teardown();
        }

        self.jobs.detach_all();

        if let Some(mut protection) = self.protection.take() {
            protection.release();
        }

        info!("Session disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.engine.is_none()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_playing_ad(&self) -> bool {
        self.is_playing_ad
    }

    pub fn is_ad_poll_active(&self) -> bool {
        self.ad_poll_active
    }

    pub fn has_protection(&self) -> bool {
        self.protection.is_some()
    }

    pub fn job_observer_count(&self) -> usize {
        self.jobs.observer_count()
    }

    pub fn notifications(&self) -> Option<&NotificationSessionManager> {
        self.notifications.as_ref()
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("state", &self.state)
            .field("disposed", &self.engine.is_none())
            .field("is_playing_ad", &self.is_playing_ad)
            .field("protected", &self.protection.is_some())
            .finish_non_exhaustive()
    }
}
