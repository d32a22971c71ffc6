//! # Now-Playing Notification
//!
//! Binds the playback notification, the external media session and the
//! notification artwork to one player session.
//!
//! ## Lifecycle
//!
//! [`NotificationSessionManager::setup`] ensures the channel, replaces the
//! external media session, attaches the presenter, starts the periodic state
//! sync and requests artwork. [`NotificationSessionManager::teardown`] undoes
//! all of it and may be called any number of times.
//!
//! The sync timer itself lives on the session loop; the manager only reports
//! whether it wants ticks through [`NotificationSessionManager::is_syncing`].

use std::path::Path;
use std::sync::Arc;

use bridge_traits::background::{FILE_PATH_PARAMETER, URL_PARAMETER};
use bridge_traits::{
    Artwork, ArtworkDecoder, JobData, JobId, JobKind, JobRequest, MediaSession, MediaSessionHost,
    NotificationPresenter, NotificationSpec, PlaybackStateSnapshot, RemoteCommand, SessionActions,
    SessionMetadata, SessionPlaybackState, SessionToken,
};
use core_runtime::config::PlayerConfig;
use core_runtime::PlayerEvent;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{PlaybackError, Result};
use crate::jobs::{BackgroundJobCoordinator, JobCompletion};
use crate::traits::MediaEngine;

/// Tag under which the external media session is registered.
pub const MEDIA_SESSION_TAG: &str = "PlayerSession";

/// Host-supplied notification content.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationConfig {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Channel to post on; the default channel is created when absent.
    #[serde(default)]
    pub channel_name: Option<String>,
    pub activity_name: String,
}

impl NotificationConfig {
    pub fn new(title: impl Into<String>, activity_name: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            activity_name: activity_name.into(),
            ..Default::default()
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel_name = Some(channel.into());
        self
    }

    fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref().filter(|url| !url.is_empty())
    }
}

#[derive(Debug)]
struct CachedArtwork {
    url: String,
    artwork: Artwork,
}

#[derive(Debug)]
struct PendingArtwork {
    job: JobId,
    url: String,
}

pub struct NotificationSessionManager {
    presenter: Arc<dyn NotificationPresenter>,
    session_host: Arc<dyn MediaSessionHost>,
    artwork_decoder: Option<Arc<dyn ArtworkDecoder>>,
    default_channel: String,
    notification_id: u32,
    remote_commands: mpsc::UnboundedSender<RemoteCommand>,

    media_session: Option<Box<dyn MediaSession>>,
    presenter_attached: bool,
    engine_listener: bool,
    syncing: bool,
    artwork: Option<CachedArtwork>,
    pending_artwork: Option<PendingArtwork>,
}

impl NotificationSessionManager {
    pub fn new(
        presenter: Arc<dyn NotificationPresenter>,
        session_host: Arc<dyn MediaSessionHost>,
        remote_commands: mpsc::UnboundedSender<RemoteCommand>,
    ) -> Self {
        Self {
            presenter,
            session_host,
            artwork_decoder: None,
            default_channel: core_runtime::config::DEFAULT_NOTIFICATION_CHANNEL.to_string(),
            notification_id: core_runtime::config::DEFAULT_NOTIFICATION_ID,
            remote_commands,
            media_session: None,
            presenter_attached: false,
            engine_listener: false,
            syncing: false,
            artwork: None,
            pending_artwork: None,
        }
    }

    /// Build from the player configuration. `None` when the host did not
    /// provide both a presenter and a media-session host.
    pub fn from_config(
        config: &PlayerConfig,
        remote_commands: mpsc::UnboundedSender<RemoteCommand>,
    ) -> Option<Self> {
        let presenter = config.notification_presenter.clone()?;
        let session_host = config.media_session_host.clone()?;

        let mut manager = Self::new(presenter, session_host, remote_commands);
        manager.artwork_decoder = config.artwork_decoder.clone();
        manager.default_channel = config.notification_channel.clone();
        manager.notification_id = config.notification_id;
        Some(manager)
    }

    pub fn with_artwork_decoder(mut self, decoder: Arc<dyn ArtworkDecoder>) -> Self {
        self.artwork_decoder = Some(decoder);
        self
    }

    /// Show the notification for the current source.
    ///
    /// Re-issuing setup replaces the previous notification and media session
    /// but keeps artwork already decoded for the same image URL.
    pub fn setup(
        &mut self,
        config: &NotificationConfig,
        engine: &mut dyn MediaEngine,
        jobs: &mut BackgroundJobCoordinator,
    ) -> Result<()> {
        if self.presenter_attached {
            self.presenter.detach();
            self.presenter_attached = false;
        }

        let channel_id = match config.channel_name.as_deref().filter(|c| !c.is_empty()) {
            Some(channel) => channel.to_string(),
            None => {
                self.presenter.ensure_channel(&self.default_channel)?;
                self.default_channel.clone()
            }
        };

        let token = self.create_media_session()?;

        let attached = self.presenter.attach(NotificationSpec {
            channel_id,
            notification_id: self.notification_id,
            title: config.title.clone(),
            author: config.author.clone(),
            activity_name: config.activity_name.clone(),
            use_next_action: false,
            use_previous_action: false,
            use_stop_action: false,
            session_token: Some(token),
        });
        if let Err(e) = attached {
            // Nothing of this setup may outlive the failure.
            self.engine_listener = false;
            self.syncing = false;
            self.release_media_session();
            return Err(e.into());
        }
        self.presenter_attached = true;
        self.engine_listener = true;
        self.syncing = true;

        self.request_artwork(config.image_url(), jobs);

        engine.seek_to(0);
        info!(title = %config.title, "Notification attached");
        Ok(())
    }

    /// Replace the external media session, releasing the previous one.
    fn create_media_session(&mut self) -> Result<SessionToken> {
        self.release_media_session();

        let mut session = self
            .session_host
            .create_session(MEDIA_SESSION_TAG, self.remote_commands.clone())?;
        session.set_active(true);
        let token = session.token();
        self.media_session = Some(session);
        debug!(token = %token.0, "Media session created");
        Ok(token)
    }

    fn request_artwork(&mut self, image_url: Option<&str>, jobs: &mut BackgroundJobCoordinator) {
        let Some(url) = image_url else {
            return;
        };

        if let Some(cached) = self.artwork.as_ref().filter(|cached| cached.url == url) {
            self.presenter.set_large_icon(cached.artwork.clone());
            return;
        }
        if self.pending_artwork.as_ref().is_some_and(|pending| pending.url == url) {
            return;
        }

        let request = JobRequest::new(
            JobKind::ArtworkFetch,
            url,
            JobData::new().put_string(URL_PARAMETER, url),
        );
        match jobs.schedule(request) {
            Ok(job) => {
                self.pending_artwork = Some(PendingArtwork {
                    job,
                    url: url.to_string(),
                })
            }
            // Artwork is cosmetic; the notification stays up without it.
            Err(e) => warn!(url = %url, error = %e, "Failed to schedule artwork fetch"),
        }
    }

    /// Consume an artwork job result. Returns `true` if the job was ours.
    pub fn on_job_completion(&mut self, completion: &JobCompletion) -> bool {
        let ours = self
            .pending_artwork
            .as_ref()
            .is_some_and(|pending| pending.job == completion.id());
        if !ours {
            return false;
        }
        let Some(pending) = self.pending_artwork.take() else {
            return false;
        };

        if !completion.succeeded() {
            debug!(url = %pending.url, state = ?completion.info.state, "Artwork fetch did not succeed");
            return true;
        }

        let Some(path) = completion.info.output.get_string(FILE_PATH_PARAMETER) else {
            warn!(url = %pending.url, "Artwork job succeeded without a file path");
            return true;
        };

        match self.decode_artwork(Path::new(path)) {
            Ok(artwork) => {
                self.presenter.set_large_icon(artwork.clone());
                self.artwork = Some(CachedArtwork {
                    url: pending.url,
                    artwork,
                });
            }
            Err(e) => warn!(path = %path, error = %e, "Failed to decode artwork"),
        }
        true
    }

    fn decode_artwork(&self, path: &Path) -> Result<Artwork> {
        let decoder = self.artwork_decoder.as_ref().ok_or_else(|| {
            PlaybackError::Capability("no artwork decoder configured".to_string())
        })?;
        Ok(decoder.decode(path)?)
    }

    /// Periodic push of play/pause state and position.
    pub fn sync_playback_state(&mut self, engine: &dyn MediaEngine) {
        if !self.syncing {
            return;
        }
        let Some(session) = self.media_session.as_mut() else {
            return;
        };

        let state = if engine.is_playing() {
            SessionPlaybackState::Playing
        } else {
            SessionPlaybackState::Paused
        };
        session.set_playback_state(PlaybackStateSnapshot {
            state,
            position_ms: engine.current_position_ms(),
            speed: 1.0,
            actions: SessionActions { seek_to: true },
        });
    }

    /// Engine state changed: refresh the duration shown by the OS.
    pub fn on_engine_state_changed(&mut self, engine: &dyn MediaEngine) {
        if !self.engine_listener {
            return;
        }
        if let Some(session) = self.media_session.as_mut() {
            session.set_metadata(SessionMetadata {
                duration_ms: engine.content_duration_ms(),
            });
        }
    }

    /// Apply an OS transport command and return the event echoing it.
    pub fn on_remote_command(
        &mut self,
        command: RemoteCommand,
        engine: &mut dyn MediaEngine,
    ) -> PlayerEvent {
        match command {
            RemoteCommand::SeekTo(position) => {
                engine.seek_to(position);
                PlayerEvent::Seek { position }
            }
        }
    }

    /// Tear everything down.
    ///
    /// Order: engine listener, sync timer, presenter binding, external
    /// session, cached artwork.
    pub fn teardown(&mut self) {
        self.engine_listener = false;
        self.syncing = false;

        if self.presenter_attached {
            self.presenter.detach();
            self.presenter_attached = false;
        }

        self.release_media_session();
        self.pending_artwork = None;
        self.artwork = None;
    }

    pub fn release_media_session(&mut self) {
        if let Some(mut session) = self.media_session.take() {
            session.release();
            debug!("Media session released");
        }
    }

    /// Whether the loop should run the state-sync timer.
    pub fn is_syncing(&self) -> bool {
        self.syncing
    }

    pub fn is_attached(&self) -> bool {
        self.presenter_attached
    }

    pub fn has_media_session(&self) -> bool {
        self.media_session.is_some()
    }

    pub fn cached_artwork(&self) -> Option<&Artwork> {
        self.artwork.as_ref().map(|cached| &cached.artwork)
    }
}

impl Drop for NotificationSessionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for NotificationSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationSessionManager")
            .field("presenter_attached", &self.presenter_attached)
            .field("syncing", &self.syncing)
            .field("has_media_session", &self.media_session.is_some())
            .field("pending_artwork", &self.pending_artwork)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_config_reads_host_record() {
        let config: NotificationConfig = serde_json::from_value(serde_json::json!({
            "title": "Episode 1",
            "author": "Studio",
            "imageUrl": "https://img.example.com/a.png",
            "activityName": "MainActivity"
        }))
        .unwrap();

        assert_eq!(config.title, "Episode 1");
        assert_eq!(config.channel_name, None);
        assert_eq!(config.image_url(), Some("https://img.example.com/a.png"));
    }

    #[test]
    fn empty_image_url_is_ignored() {
        let config = NotificationConfig::new("t", "MainActivity").with_image_url("");
        assert_eq!(config.image_url(), None);
    }
}
