//! # Player Configuration
//!
//! Settings and injected host bridges shared by every playback session.
//!
//! ## Overview
//!
//! [`PlayerConfig`] is built with [`PlayerConfigBuilder`], which enforces
//! fail-fast validation: a session is never constructed against a host that
//! is missing a required capability.
//!
//! ## Required Dependencies
//!
//! - `JobScheduler` - pre-cache and artwork jobs
//! - `DrmProvider` - native key systems for protected content
//!
//! ## Optional Dependencies
//!
//! - `MediaSessionHost` - external media session (lock screen controls)
//! - `NotificationPresenter` - playback notification
//! - `ArtworkDecoder` - notification large icon
//!
//! Notification setup is rejected at runtime when the optional now-playing
//! bridges are absent; playback itself works without them.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::PlayerConfig;
//! use std::sync::Arc;
//!
//! let config = PlayerConfig::builder()
//!     .cache_dir("/path/to/cache")
//!     .user_agent("my-app/2.1")
//!     .job_scheduler(Arc::new(MyScheduler))
//!     .drm_provider(Arc::new(MyDrm))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    ArtworkDecoder, DrmProvider, JobScheduler, MediaSessionHost, NotificationPresenter,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Channel created when the host does not name one.
pub const DEFAULT_NOTIFICATION_CHANNEL: &str = "PLAYER_SESSION_NOTIFICATION";

/// Notification id shared by every session of the process.
pub const DEFAULT_NOTIFICATION_ID: u32 = 20772077;

/// Lowest host DRM API level that can open a key system.
pub const DEFAULT_MIN_DRM_API_LEVEL: u32 = 18;

pub const DEFAULT_USER_AGENT: &str = "player-session";

const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Shared configuration for playback sessions.
///
/// Use [`PlayerConfig::builder`] to construct instances.
#[derive(Clone)]
pub struct PlayerConfig {
    /// Root directory for the transport cache and job artifacts
    pub cache_dir: PathBuf,

    /// Default `User-Agent` for network sources without one
    pub user_agent: String,

    /// Period of the ad-state poll
    pub ad_poll_interval: Duration,

    /// Period of the external session state push
    pub notification_sync_interval: Duration,

    pub min_drm_api_level: u32,

    pub notification_channel: String,

    pub notification_id: u32,

    pub job_scheduler: Arc<dyn JobScheduler>,

    pub drm_provider: Arc<dyn DrmProvider>,

    pub media_session_host: Option<Arc<dyn MediaSessionHost>>,

    pub notification_presenter: Option<Arc<dyn NotificationPresenter>>,

    pub artwork_decoder: Option<Arc<dyn ArtworkDecoder>>,
}

impl std::fmt::Debug for PlayerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerConfig")
            .field("cache_dir", &self.cache_dir)
            .field("user_agent", &self.user_agent)
            .field("ad_poll_interval", &self.ad_poll_interval)
            .field("notification_sync_interval", &self.notification_sync_interval)
            .field("min_drm_api_level", &self.min_drm_api_level)
            .field("notification_channel", &self.notification_channel)
            .field("notification_id", &self.notification_id)
            .field("job_scheduler", &"JobScheduler { ... }")
            .field("drm_provider", &"DrmProvider { ... }")
            .field(
                "media_session_host",
                &self
                    .media_session_host
                    .as_ref()
                    .map(|_| "MediaSessionHost { ... }"),
            )
            .field(
                "notification_presenter",
                &self
                    .notification_presenter
                    .as_ref()
                    .map(|_| "NotificationPresenter { ... }"),
            )
            .field(
                "artwork_decoder",
                &self
                    .artwork_decoder
                    .as_ref()
                    .map(|_| "ArtworkDecoder { ... }"),
            )
            .finish()
    }
}

impl PlayerConfig {
    pub fn builder() -> PlayerConfigBuilder {
        PlayerConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::Config("Cache directory cannot be empty".to_string()));
        }

        if self.user_agent.trim().is_empty() {
            return Err(Error::InvalidValue {
                field: "user_agent",
                message: "must not be blank".to_string(),
            });
        }

        if self.ad_poll_interval.is_zero() {
            return Err(Error::InvalidValue {
                field: "ad_poll_interval",
                message: "must be greater than zero".to_string(),
            });
        }

        if self.notification_sync_interval.is_zero() {
            return Err(Error::InvalidValue {
                field: "notification_sync_interval",
                message: "must be greater than zero".to_string(),
            });
        }

        if self.notification_channel.is_empty() {
            return Err(Error::InvalidValue {
                field: "notification_channel",
                message: "must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// True when every bridge needed by notification setup is present.
    pub fn supports_notifications(&self) -> bool {
        self.media_session_host.is_some()
            && self.notification_presenter.is_some()
            && self.artwork_decoder.is_some()
    }
}

fn job_scheduler_missing_error() -> Error {
    Error::capability_missing(
        "JobScheduler",
        "JobScheduler implementation is required for pre-caching and artwork fetch. \
         Desktop: use bridge_desktop::TokioJobScheduler. \
         Mobile: wrap the platform work manager.",
    )
}

fn drm_provider_missing_error() -> Error {
    Error::capability_missing(
        "DrmProvider",
        "DrmProvider implementation is required to open key systems. \
         Hosts without content protection should inject a provider that reports \
         Unsupported for every key system.",
    )
}

/// Builder for [`PlayerConfig`].
#[derive(Default)]
pub struct PlayerConfigBuilder {
    cache_dir: Option<PathBuf>,
    user_agent: Option<String>,
    ad_poll_interval: Option<Duration>,
    notification_sync_interval: Option<Duration>,
    min_drm_api_level: Option<u32>,
    notification_channel: Option<String>,
    notification_id: Option<u32>,
    job_scheduler: Option<Arc<dyn JobScheduler>>,
    drm_provider: Option<Arc<dyn DrmProvider>>,
    media_session_host: Option<Arc<dyn MediaSessionHost>>,
    notification_presenter: Option<Arc<dyn NotificationPresenter>>,
    artwork_decoder: Option<Arc<dyn ArtworkDecoder>>,
}

impl PlayerConfigBuilder {
    /// Sets the cache root. The transport cache lives in a subdirectory.
    pub fn cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    /// Default: [`DEFAULT_USER_AGENT`]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Default: 1 second
    pub fn ad_poll_interval(mut self, interval: Duration) -> Self {
        self.ad_poll_interval = Some(interval);
        self
    }

    /// Default: 1 second
    pub fn notification_sync_interval(mut self, interval: Duration) -> Self {
        self.notification_sync_interval = Some(interval);
        self
    }

    /// Default: [`DEFAULT_MIN_DRM_API_LEVEL`]
    pub fn min_drm_api_level(mut self, level: u32) -> Self {
        self.min_drm_api_level = Some(level);
        self
    }

    pub fn notification_channel(mut self, channel: impl Into<String>) -> Self {
        self.notification_channel = Some(channel.into());
        self
    }

    pub fn notification_id(mut self, id: u32) -> Self {
        self.notification_id = Some(id);
        self
    }

    pub fn job_scheduler(mut self, scheduler: Arc<dyn JobScheduler>) -> Self {
        self.job_scheduler = Some(scheduler);
        self
    }

    pub fn drm_provider(mut self, provider: Arc<dyn DrmProvider>) -> Self {
        self.drm_provider = Some(provider);
        self
    }

    pub fn media_session_host(mut self, host: Arc<dyn MediaSessionHost>) -> Self {
        self.media_session_host = Some(host);
        self
    }

    pub fn notification_presenter(mut self, presenter: Arc<dyn NotificationPresenter>) -> Self {
        self.notification_presenter = Some(presenter);
        self
    }

    pub fn artwork_decoder(mut self, decoder: Arc<dyn ArtworkDecoder>) -> Self {
        self.artwork_decoder = Some(decoder);
        self
    }

    /// Builds the final [`PlayerConfig`].
    ///
    /// Returns an error if:
    /// - The cache directory is missing
    /// - A required bridge (`JobScheduler`, `DrmProvider`) is missing
    /// - Any interval or name is invalid
    pub fn build(self) -> Result<PlayerConfig> {
        let cache_dir = self.cache_dir.ok_or_else(|| {
            Error::Config("Cache directory is required. Use .cache_dir() to set it.".to_string())
        })?;

        let job_scheduler = self.job_scheduler.ok_or_else(job_scheduler_missing_error)?;
        let drm_provider = self.drm_provider.ok_or_else(drm_provider_missing_error)?;

        let config = PlayerConfig {
            cache_dir,
            user_agent: self
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            ad_poll_interval: self.ad_poll_interval.unwrap_or(DEFAULT_TICK),
            notification_sync_interval: self.notification_sync_interval.unwrap_or(DEFAULT_TICK),
            min_drm_api_level: self
                .min_drm_api_level
                .unwrap_or(DEFAULT_MIN_DRM_API_LEVEL),
            notification_channel: self
                .notification_channel
                .unwrap_or_else(|| DEFAULT_NOTIFICATION_CHANNEL.to_string()),
            notification_id: self.notification_id.unwrap_or(DEFAULT_NOTIFICATION_ID),
            job_scheduler,
            drm_provider,
            media_session_host: self.media_session_host,
            notification_presenter: self.notification_presenter,
            artwork_decoder: self.artwork_decoder,
        };

        config.validate()?;

        Ok(config)
    }
}
