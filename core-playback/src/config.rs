//! # Load Control Configuration
//!
//! Buffer durations handed to the engine once, when it is constructed.

use serde::{Deserialize, Serialize};

/// Engine buffering thresholds, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadControlConfig {
    /// The engine always tries to keep at least this much media buffered.
    ///
    /// Default: 50 000 ms.
    #[serde(default = "default_min_buffer_ms")]
    pub min_buffer_ms: u32,

    /// The engine stops loading once this much media is buffered.
    ///
    /// Default: 50 000 ms.
    #[serde(default = "default_max_buffer_ms")]
    pub max_buffer_ms: u32,

    /// Media that must be buffered before playback starts after a seek or a
    /// new source.
    ///
    /// Default: 2 500 ms.
    #[serde(default = "default_buffer_for_playback_ms")]
    pub buffer_for_playback_ms: u32,

    /// Media that must be buffered before playback resumes after a rebuffer.
    ///
    /// Default: 5 000 ms.
    #[serde(default = "default_buffer_for_playback_after_rebuffer_ms")]
    pub buffer_for_playback_after_rebuffer_ms: u32,
}

impl Default for LoadControlConfig {
    fn default() -> Self {
        Self {
            min_buffer_ms: default_min_buffer_ms(),
            max_buffer_ms: default_max_buffer_ms(),
            buffer_for_playback_ms: default_buffer_for_playback_ms(),
            buffer_for_playback_after_rebuffer_ms: default_buffer_for_playback_after_rebuffer_ms(),
        }
    }
}

impl LoadControlConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_buffer_ms == 0 {
            return Err("max_buffer_ms must be > 0".to_string());
        }

        if self.min_buffer_ms > self.max_buffer_ms {
            return Err("min_buffer_ms cannot exceed max_buffer_ms".to_string());
        }

        if self.buffer_for_playback_ms > self.min_buffer_ms {
            return Err("buffer_for_playback_ms cannot exceed min_buffer_ms".to_string());
        }

        if self.buffer_for_playback_after_rebuffer_ms > self.min_buffer_ms {
            return Err(
                "buffer_for_playback_after_rebuffer_ms cannot exceed min_buffer_ms".to_string(),
            );
        }

        Ok(())
    }
}

// Default value functions for serde

fn default_min_buffer_ms() -> u32 {
    50_000
}

fn default_max_buffer_ms() -> u32 {
    50_000
}

fn default_buffer_for_playback_ms() -> u32 {
    2_500
}

fn default_buffer_for_playback_after_rebuffer_ms() -> u32 {
    5_000
}
