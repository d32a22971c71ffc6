//! # Playback Session Core
//!
//! Owns one native media engine per session and turns its callbacks into an
//! ordered [`PlayerEvent`](core_runtime::PlayerEvent) stream.
//!
//! ## Overview
//!
//! This crate handles:
//! - Source loading with DRM scheme selection ([`drm`]) and cache wrapping ([`cache`])
//! - The engine-signal state machine and transport commands ([`controller`])
//! - Audio track selection heuristics ([`tracks`])
//! - Notification, external media session and artwork ([`notification`])
//! - Background job observers scoped to the session ([`jobs`])
//! - The per-session event loop and host handle ([`session`])
//!
//! Session-independent entry points: [`cache::clear_cache`] and
//! [`cache::PreCacheService`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use core_playback::{spawn_session, SessionDeps, SourceRequest};
//!
//! let handle = spawn_session(SessionDeps::new(config), make_engine)?;
//! let mut events = handle.subscribe();
//! handle.set_data_source(SourceRequest::new(url)).await?;
//! handle.play();
//! ```

pub mod cache;
pub mod config;
pub mod controller;
pub mod drm;
pub mod error;
pub mod jobs;
pub mod notification;
pub mod session;
pub mod source;
pub mod tracks;
pub mod traits;

pub use cache::{clear_cache, CacheConfigurator, CacheOptions, PreCacheRequest, PreCacheService};
pub use config::LoadControlConfig;
pub use controller::{PlaybackController, PlaybackState};
pub use drm::{ContentProtectionSession, DrmConfigurator, DrmScheme};
pub use error::{CommandFailure, ErrorKind, PlaybackError, Result};
pub use notification::{NotificationConfig, NotificationSessionManager};
pub use session::{spawn_session, CommandResult, SessionDeps, SessionHandle};
pub use source::{DrmOptions, SourceRequest};
pub use tracks::{TrackAnomalyDetector, TrackSelectionManager};
pub use traits::{EngineSignal, EngineSignalSender, EngineState, MediaEngine};
