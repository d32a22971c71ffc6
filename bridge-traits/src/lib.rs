//! # Host Bridge Traits
//!
//! Platform abstraction traits that each host must implement for the playback
//! session core.
//!
//! ## Overview
//!
//! The session controller owns decision logic and lifecycle. Everything that
//! touches a platform API lives behind one of these traits:
//!
//! ### Content protection
//! - [`DrmProvider`](drm::DrmProvider) / [`KeySystem`](drm::KeySystem) - native key systems (Widevine, ClearKey)
//!
//! ### Background work
//! - [`JobScheduler`](background::JobScheduler) - tagged one-shot jobs with observable state
//!
//! ### Now playing
//! - [`MediaSessionHost`](media_session::MediaSessionHost) / [`MediaSession`](media_session::MediaSession) - lock-screen / OS media session
//! - [`NotificationPresenter`](media_session::NotificationPresenter) - playback notification
//! - [`ArtworkDecoder`](media_session::ArtworkDecoder) - artwork file to pixels
//!
//! ### Utilities
//! - [`LoggerSink`](time::LoggerSink) - forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors into it with an actionable message.
//!
//! ## Thread Safety
//!
//! Shared capabilities are `Send + Sync`; per-session handles
//! ([`MediaSession`](media_session::MediaSession), [`KeySystem`](drm::KeySystem))
//! are owned by exactly one session and only need `Send`.

pub mod background;
pub mod drm;
pub mod error;
pub mod media_session;
pub mod time;

pub use error::BridgeError;

pub use background::{
    JobData, JobId, JobInfo, JobKind, JobRequest, JobScheduler, JobState, JobValue,
};
pub use drm::{DrmProvider, KeySystem, KeySystemId, SecurityLevel};
pub use media_session::{
    Artwork, ArtworkDecoder, MediaSession, MediaSessionHost, NotificationPresenter,
    NotificationSpec, PlaybackStateSnapshot, RemoteCommand, SessionActions, SessionMetadata,
    SessionPlaybackState, SessionToken,
};
pub use time::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
