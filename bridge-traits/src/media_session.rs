//! Now-playing surfaces: the external media session (lock screen, headset
//! buttons, OS media overlay), the playback notification and the artwork
//! decoder that feeds it.

use std::path::Path;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;

/// Transport command raised by the OS against an external media session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand {
    /// Absolute seek in milliseconds.
    SeekTo(i64),
}

/// Coarse playback state published to the external session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPlaybackState {
    Playing,
    Paused,
}

/// Actions the external session advertises as available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionActions {
    pub seek_to: bool,
}

/// Periodic state push to the external session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackStateSnapshot {
    pub state: SessionPlaybackState,
    pub position_ms: i64,
    pub speed: f32,
    pub actions: SessionActions,
}

/// Metadata pushed to the external session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionMetadata {
    pub duration_ms: i64,
}

/// Opaque token identifying an external session to the notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(pub String);

/// Handle to a live external media session.
pub trait MediaSession: Send {
    fn token(&self) -> SessionToken;

    fn set_active(&mut self, active: bool);

    fn set_playback_state(&mut self, snapshot: PlaybackStateSnapshot);

    fn set_metadata(&mut self, metadata: SessionMetadata);

    /// Release the OS session. Must be idempotent.
    fn release(&mut self);
}

/// Factory for external media sessions.
pub trait MediaSessionHost: Send + Sync {
    /// Create a session. Transport commands raised by the OS are delivered on
    /// `commands`; the core drains them on its own loop.
    fn create_session(
        &self,
        tag: &str,
        commands: mpsc::UnboundedSender<RemoteCommand>,
    ) -> Result<Box<dyn MediaSession>>;
}

/// Data contract for the playback notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationSpec {
    pub channel_id: String,
    pub notification_id: u32,
    pub title: String,
    pub author: Option<String>,
    /// Host activity/window opened when the notification is tapped.
    pub activity_name: String,
    pub use_next_action: bool,
    pub use_previous_action: bool,
    pub use_stop_action: bool,
    pub session_token: Option<SessionToken>,
}

/// Decoded RGBA8 artwork.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artwork {
    pub width: u32,
    pub height: u32,
    pub pixels: Bytes,
}

/// Host notification manager.
pub trait NotificationPresenter: Send + Sync {
    /// Create the channel if it does not exist yet.
    fn ensure_channel(&self, channel_id: &str) -> Result<()>;

    /// Bind the notification to the player and show it.
    fn attach(&self, spec: NotificationSpec) -> Result<()>;

    /// Replace the large icon of the attached notification.
    fn set_large_icon(&self, artwork: Artwork);

    /// Unbind the notification from the player. Must be idempotent.
    fn detach(&self);
}

/// Turns an artwork file produced by a background job into pixels.
pub trait ArtworkDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<Artwork>;
}
