//! Workspace facade crate.
//!
//! Exposes feature flags that map onto the individual workspace crates so a
//! host application can depend on `player-session-workspace` and pick the
//! pieces it needs (`session` for the controller core, `desktop-shims` for the
//! tokio-backed bridge implementations).

#[cfg(feature = "session")]
pub use core_playback as playback;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop as desktop;
