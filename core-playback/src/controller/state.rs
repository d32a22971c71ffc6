//! Engine signal → player event state machine.
//!
//! ```text
//!            prepare            ready (first)
//!   Idle ───────────> Preparing ─────────────> Ready <──────┐
//!                         │                      │          │ ready
//!                         │ buffering            │ buffering│
//!                         └──────────────────> Buffering ───┘
//!                                                │ ended
//!                                                v
//!                                              Ended
//!
//!   any non-terminal ── error ──> Error (terminal)
//! ```

use core_runtime::PlayerEvent;

use crate::traits::{EngineSignal, EngineState, VideoFormat};

/// Controller-side session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    /// Source set, waiting for the first ready.
    Preparing,
    Ready,
    Buffering,
    Ended,
    /// Fatal engine error. Only disposal is meaningful afterwards.
    Error,
}

impl PlaybackState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlaybackState::Error)
    }
}

/// Engine readings taken when a signal is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineSnapshot {
    pub duration_ms: i64,
    pub buffered_position_ms: i64,
    pub video_format: Option<VideoFormat>,
}

/// Per-source state mutated only by [`SessionState::on_signal`] and source
/// loading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub key: Option<String>,
    pub initialized: bool,
    pub phase: PlaybackState,
    pub last_buffered_position_ms: i64,
}

impl SessionState {
    /// Reset for a newly loaded source.
    pub fn begin_source(&mut self, key: Option<String>) {
        self.key = key;
        self.initialized = false;
        self.phase = PlaybackState::Preparing;
        self.last_buffered_position_ms = 0;
    }

    /// Apply one engine signal and return the events to emit, in order.
    pub fn on_signal(&mut self, signal: &EngineSignal, engine: &EngineSnapshot) -> Vec<PlayerEvent> {
        if self.phase.is_terminal() {
            return Vec::new();
        }

        match signal {
            EngineSignal::StateChanged(EngineState::Idle) => Vec::new(),
            EngineSignal::StateChanged(EngineState::Buffering) => {
                self.phase = PlaybackState::Buffering;
                let mut events = vec![PlayerEvent::BufferingStart];
                events.extend(self.buffering_update(engine.buffered_position_ms, true));
                events
            }
            EngineSignal::StateChanged(EngineState::Ready) => {
                self.phase = PlaybackState::Ready;
                if self.initialized {
                    return vec![PlayerEvent::BufferingEnd {
                        duration: engine.duration_ms,
                    }];
                }

                self.initialized = true;
                let (width, height) = match engine.video_format {
                    Some(format) => {
                        let (width, height) = format.display_size();
                        (Some(width), Some(height))
                    }
                    None => (None, None),
                };
                vec![PlayerEvent::Initialized {
                    key: self.key.clone(),
                    duration: engine.duration_ms,
                    width,
                    height,
                }]
            }
            EngineSignal::StateChanged(EngineState::Ended) => {
                self.phase = PlaybackState::Ended;
                vec![PlayerEvent::Completed {
                    key: self.key.clone(),
                }]
            }
            EngineSignal::Error(detail) => {
                self.phase = PlaybackState::Error;
                vec![PlayerEvent::engine_error(detail)]
            }
        }
    }

    /// Buffered-range event when `buffered_ms` moved, or always when
    /// `force` is set.
    pub fn buffering_update(&mut self, buffered_ms: i64, force: bool) -> Option<PlayerEvent> {
        if !force && buffered_ms == self.last_buffered_position_ms {
            return None;
        }
        self.last_buffered_position_ms = buffered_ms;
        Some(PlayerEvent::buffered_up_to(buffered_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(duration_ms: i64) -> EngineSnapshot {
        EngineSnapshot {
            duration_ms,
            ..Default::default()
        }
    }

    #[test]
    fn first_ready_initializes_then_buffering_end() {
        let mut state = SessionState::default();
        state.begin_source(Some("k".to_string()));

        let ready = EngineSignal::StateChanged(EngineState::Ready);
        assert_eq!(
            state.on_signal(&ready, &snapshot(5_000)),
            vec![PlayerEvent::Initialized {
                key: Some("k".to_string()),
                duration: 5_000,
                width: None,
                height: None,
            }]
        );
        assert!(state.initialized);
        assert_eq!(
            state.on_signal(&ready, &snapshot(5_000)),
            vec![PlayerEvent::BufferingEnd { duration: 5_000 }]
        );
    }

    #[test]
    fn rotated_stream_reports_display_size() {
        let mut state = SessionState::default();
        state.begin_source(None);

        let engine = EngineSnapshot {
            duration_ms: 1_000,
            buffered_position_ms: 0,
            video_format: Some(VideoFormat {
                width: 1080,
                height: 1920,
                rotation_degrees: 90,
            }),
        };
        let events = state.on_signal(&EngineSignal::StateChanged(EngineState::Ready), &engine);
        assert!(matches!(
            events.as_slice(),
            [PlayerEvent::Initialized {
                width: Some(1920),
                height: Some(1080),
                ..
            }]
        ));
    }

    #[test]
    fn buffering_start_forces_range_update() {
        let mut state = SessionState::default();
        state.begin_source(None);
        state.last_buffered_position_ms = 700;

        let engine = EngineSnapshot {
            buffered_position_ms: 700,
            ..Default::default()
        };
        let events = state.on_signal(&EngineSignal::StateChanged(EngineState::Buffering), &engine);
        assert_eq!(
            events,
            vec![PlayerEvent::BufferingStart, PlayerEvent::buffered_up_to(700)]
        );
        assert_eq!(state.phase, PlaybackState::Buffering);

        assert_eq!(state.buffering_update(700, false), None);
        assert_eq!(
            state.buffering_update(900, false),
            Some(PlayerEvent::buffered_up_to(900))
        );
    }

    #[test]
    fn new_source_resets_buffered_position() {
        let mut state = SessionState::default();
        state.begin_source(Some("a".to_string()));
        assert!(state.buffering_update(3_000, false).is_some());

        state.begin_source(Some("b".to_string()));
        assert_eq!(state.last_buffered_position_ms, 0);
        assert_eq!(state.buffering_update(0, false), None);
    }

    #[test]
    fn ended_and_idle() {
        let mut state = SessionState::default();
        state.begin_source(Some("k".to_string()));

        assert!(state
            .on_signal(&EngineSignal::StateChanged(EngineState::Idle), &snapshot(0))
            .is_empty());
        assert_eq!(
            state.on_signal(&EngineSignal::StateChanged(EngineState::Ended), &snapshot(0)),
            vec![PlayerEvent::Completed {
                key: Some("k".to_string())
            }]
        );
    }

    #[test]
    fn error_is_terminal() {
        let mut state = SessionState::default();
        state.begin_source(None);

        let events = state.on_signal(&EngineSignal::Error("decoder died".to_string()), &snapshot(0));
        assert_eq!(events, vec![PlayerEvent::engine_error("decoder died")]);
        assert!(state.phase.is_terminal());

        assert!(state
            .on_signal(&EngineSignal::StateChanged(EngineState::Ready), &snapshot(0))
            .is_empty());
    }
}
