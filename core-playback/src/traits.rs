//! # Media Engine Abstraction
//!
//! The session core drives an engine it does not implement: decoding,
//! rendering, transport and ad insertion all live behind [`MediaEngine`].
//!
//! ## Signals
//!
//! Engines report asynchronous state through an [`EngineSignalSender`]
//! handed to them at construction. Signals are processed on the session's
//! loop in the order they were sent; an engine must never call back into
//! the controller directly.
//!
//! ## Threading Model
//!
//! The engine is owned by exactly one session loop and is only touched from
//! it, so implementations need `Send` but not `Sync`.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use core_playback::session::spawn_session;
//!
//! let handle = spawn_session(deps, |signals| {
//!     Box::new(NativeEngine::new(signals)) as Box<dyn MediaEngine>
//! })?;
//! ```

use tokio::sync::mpsc;

use crate::cache::DataSourceSpec;
use crate::config::LoadControlConfig;
use crate::drm::ContentProtectionSession;
use crate::error::Result;
use crate::tracks::{MappedTrackInfo, TrackOverride};

// ============================================================================
// Engine Signals
// ============================================================================

/// Playback state reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No source prepared, or reset after a stop.
    Idle,
    Buffering,
    /// Enough data to play.
    Ready,
    /// End of stream.
    Ended,
}

/// Asynchronous notification from the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineSignal {
    StateChanged(EngineState),
    /// Fatal playback failure with the engine's diagnostic.
    Error(String),
}

pub type EngineSignalSender = mpsc::UnboundedSender<EngineSignal>;
pub type EngineSignalReceiver = mpsc::UnboundedReceiver<EngineSignal>;

// ============================================================================
// Engine Parameters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioContentType {
    Movie,
    Music,
    Speech,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioAttributes {
    pub content_type: AudioContentType,
}

impl AudioAttributes {
    pub fn movie() -> Self {
        Self {
            content_type: AudioContentType::Movie,
        }
    }
}

/// Natural video dimensions plus the rotation the player must apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub rotation_degrees: u32,
}

impl VideoFormat {
    /// Dimensions as displayed: swapped for portrait-rotated streams.
    pub fn display_size(&self) -> (u32, u32) {
        match self.rotation_degrees % 360 {
            90 | 270 => (self.height, self.width),
            _ => (self.width, self.height),
        }
    }
}

/// First window of the current timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineWindow {
    /// Wall-clock start of the window (live streams), in milliseconds.
    pub window_start_ms: i64,
}

/// Video track constraints applied by the engine's track selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackConstraints {
    pub max_video_size: Option<(u32, u32)>,
    pub max_video_bitrate: Option<u32>,
}

impl TrackConstraints {
    /// Fold one `setTrackParameters` call into the current constraints.
    ///
    /// All zero clears both caps. Otherwise a non-zero bitrate caps the
    /// bitrate and a non-zero width together with a non-zero height caps the
    /// size; caps not mentioned are kept.
    pub fn apply(mut self, width: u32, height: u32, bitrate: u32) -> Self {
        if width == 0 && height == 0 && bitrate == 0 {
            return Self::default();
        }
        if width != 0 && height != 0 {
            self.max_video_size = Some((width, height));
        }
        if bitrate != 0 {
            self.max_video_bitrate = Some(bitrate);
        }
        self
    }

    pub fn is_unconstrained(&self) -> bool {
        self.max_video_size.is_none() && self.max_video_bitrate.is_none()
    }
}

/// Everything the engine needs to load one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub uri: String,
    pub ad_tag_uri: Option<String>,
    pub data_source: DataSourceSpec,
    /// End of the clipped range, when the host overrides the duration.
    pub clip_end_ms: Option<i64>,
    pub custom_cache_key: Option<String>,
}

// ============================================================================
// Media Engine
// ============================================================================

/// Native playback engine.
///
/// Query methods return engine-reported values; `0`/`None` when nothing is
/// loaded.
pub trait MediaEngine: Send {
    /// Buffer thresholds, applied once before the first source.
    fn configure_load_control(&mut self, config: &LoadControlConfig);

    /// `handle_audio_focus` makes the engine take exclusive audio focus.
    fn set_audio_attributes(&mut self, attributes: AudioAttributes, handle_audio_focus: bool);

    /// Replace the current source.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot build a media source for the
    /// item (unsupported scheme, protection session rejected).
    fn set_media_item(
        &mut self,
        item: MediaItem,
        protection: Option<&ContentProtectionSession>,
    ) -> Result<()>;

    fn prepare(&mut self);

    fn set_play_when_ready(&mut self, play_when_ready: bool);

    fn set_repeat_mode(&mut self, mode: RepeatMode);

    /// Volume in `[0.0, 1.0]`.
    fn set_volume(&mut self, volume: f32);

    fn set_playback_speed(&mut self, speed: f32);

    fn seek_to(&mut self, position_ms: i64);

    fn current_position_ms(&self) -> i64;

    fn buffered_position_ms(&self) -> i64;

    fn content_duration_ms(&self) -> i64;

    fn video_format(&self) -> Option<VideoFormat>;

    fn timeline_window(&self) -> Option<TimelineWindow>;

    fn is_playing(&self) -> bool;

    /// `None` when ad state is unknown (no ad-enabled source loaded).
    fn is_playing_ad(&self) -> Option<bool>;

    fn set_track_constraints(&mut self, constraints: TrackConstraints);

    fn mapped_tracks(&self) -> Option<MappedTrackInfo>;

    fn set_track_override(&mut self, selection: TrackOverride);

    fn stop(&mut self);

    /// Free native resources. No other method is called afterwards.
    fn release(&mut self);
}

// ============================================================================
// Tests
// ============================================================================
