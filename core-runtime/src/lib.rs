//! # Core Runtime
//!
//! Foundational infrastructure shared by the playback session crates:
//! - Logging and tracing initialisation ([`logging`])
//! - Player configuration with injected host bridges ([`config`])
//! - The session event type and its buffering bridge ([`events`])
//!
//! ## Overview
//!
//! Nothing in this crate knows about a media engine. It establishes the
//! logging conventions, configuration validation and event delivery
//! guarantees that `core-playback` builds on.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{PlayerConfig, PlayerConfigBuilder};
pub use error::{Error, Result};
pub use events::{EventBridge, EventConsumer, PlayerEvent};
