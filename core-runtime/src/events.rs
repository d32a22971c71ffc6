//! # Session Event Stream
//!
//! Typed events published by a playback session and the [`EventBridge`]
//! that carries them to the host.
//!
//! ## Overview
//!
//! - **[`PlayerEvent`]**: closed set of session events. Each one serializes to
//!   a flat record with an `event` discriminator, the shape host UIs consume.
//! - **[`EventBridge`]**: FIFO queue with a single detachable consumer.
//!   Events emitted while no consumer is attached are buffered and flushed,
//!   in order, on the next [`attach`](EventBridge::attach).
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   emit   ┌─────────────┐  deliver  ┌──────────┐
//! │ Controller ├─────────>│ EventBridge ├──────────>│ Consumer │
//! └────────────┘          │  (pending)  │           └──────────┘
//!                         └─────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBridge, PlayerEvent};
//! use tokio::sync::mpsc;
//!
//! let bridge = EventBridge::new();
//! bridge.emit(PlayerEvent::BufferingStart);
//!
//! let (tx, mut rx) = mpsc::unbounded_channel();
//! bridge.attach(tx);
//! assert_eq!(rx.try_recv().unwrap(), PlayerEvent::BufferingStart);
//! ```
//!
//! ## Thread Safety
//!
//! `emit`, `attach` and `detach` are serialized by one lock, so a consumer
//! attaching mid-stream never observes a live event ahead of a buffered one.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;

/// Error code attached to engine failures.
pub const VIDEO_ERROR_CODE: &str = "VideoError";

// ============================================================================
// Event Types
// ============================================================================

/// Events produced by a playback session, in emission order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum PlayerEvent {
    BufferingStart,
    BufferingEnd {
        /// Content duration in milliseconds.
        duration: i64,
    },
    /// First ready state of a source. `width`/`height` are display
    /// dimensions (already rotated) and absent for audio-only content.
    Initialized {
        key: Option<String>,
        duration: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
    },
    Completed {
        key: Option<String>,
    },
    /// Fatal engine failure.
    Error {
        code: String,
        message: String,
    },
    /// Seek triggered from outside the host UI (lock screen, headset).
    Seek {
        position: i64,
    },
    PipStart,
    PipStop,
    #[serde(rename = "isPlayingAd")]
    PlayingAdChanged {
        #[serde(rename = "isPlayingAd")]
        is_playing_ad: bool,
        duration: i64,
    },
    /// Buffered ranges as `[start, end]` pairs in milliseconds.
    BufferingUpdate {
        values: Vec<[i64; 2]>,
    },
}

impl PlayerEvent {
    /// Build the error event for an engine failure.
    pub fn engine_error(detail: impl fmt::Display) -> Self {
        PlayerEvent::Error {
            code: VIDEO_ERROR_CODE.to_string(),
            message: format!("Video player had error {}", detail),
        }
    }

    /// Single buffered range starting at zero.
    pub fn buffered_up_to(buffered_ms: i64) -> Self {
        PlayerEvent::BufferingUpdate {
            values: vec![[0, buffered_ms]],
        }
    }

    /// Value of the `event` discriminator.
    pub fn name(&self) -> &'static str {
        match self {
            PlayerEvent::BufferingStart => "bufferingStart",
            PlayerEvent::BufferingEnd { .. } => "bufferingEnd",
            PlayerEvent::Initialized { .. } => "initialized",
            PlayerEvent::Completed { .. } => "completed",
            PlayerEvent::Error { .. } => "error",
            PlayerEvent::Seek { .. } => "seek",
            PlayerEvent::PipStart => "pipStart",
            PlayerEvent::PipStop => "pipStop",
            PlayerEvent::PlayingAdChanged { .. } => "isPlayingAd",
            PlayerEvent::BufferingUpdate { .. } => "bufferingUpdate",
        }
    }

    /// Flat key/value record for hosts that consume untyped maps.
    pub fn to_record(&self) -> serde_json::Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => {
                let mut map = Map::new();
                map.insert("event".to_string(), other);
                Ok(map)
            }
        }
    }
}

impl fmt::Display for PlayerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Event Bridge
// ============================================================================

/// Receiving end of an [`EventBridge`].
///
/// A consumer that can no longer accept events hands the event back; the
/// bridge then detaches it and keeps the event buffered.
///
/// `deliver` runs while the bridge's lock is held. A consumer must not call
/// back into the same bridge (`emit`, `attach`, `detach`): that deadlocks.
pub trait EventConsumer<E>: Send {
    fn deliver(&mut self, event: E) -> Result<(), E>;
}

impl<E: Send> EventConsumer<E> for mpsc::UnboundedSender<E> {
    fn deliver(&mut self, event: E) -> Result<(), E> {
        self.send(event).map_err(|rejected| rejected.0)
    }
}

struct BridgeState<E> {
    consumer: Option<Box<dyn EventConsumer<E>>>,
    pending: VecDeque<E>,
}

/// FIFO event queue with a detachable single consumer.
///
/// [`emit`](Self::emit) never fails and never drops an event.
pub struct EventBridge<E = PlayerEvent> {
    state: Mutex<BridgeState<E>>,
}

impl<E: Send + fmt::Debug> EventBridge<E> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BridgeState {
                consumer: None,
                pending: VecDeque::new(),
            }),
        }
    }

    /// Deliver to the attached consumer, or buffer when there is none.
    pub fn emit(&self, event: E) {
        let mut state = self.state.lock();
        let Some(consumer) = state.consumer.as_mut() else {
            state.pending.push_back(event);
            return;
        };

        if let Err(rejected) = consumer.deliver(event) {
            debug!(event = ?rejected, "Event consumer closed, buffering");
            state.consumer = None;
            state.pending.push_back(rejected);
        }
    }

    /// Attach a consumer, flushing buffered events to it first.
    ///
    /// Replaces any consumer already attached. Returns the number of
    /// buffered events delivered. If the consumer rejects an event during
    /// the flush, it is not attached and the remaining events stay buffered.
    pub fn attach<C>(&self, consumer: C) -> usize
    where
        C: EventConsumer<E> + 'static,
    {
        let mut consumer: Box<dyn EventConsumer<E>> = Box::new(consumer);
        let mut state = self.state.lock();
        let mut flushed = 0;

        while let Some(event) = state.pending.pop_front() {
            if let Err(rejected) = consumer.deliver(event) {
                state.pending.push_front(rejected);
                state.consumer = None;
                debug!(flushed, "Consumer rejected buffered event during attach");
                return flushed;
            }
            flushed += 1;
        }

        state.consumer = Some(consumer);
        flushed
    }

    /// Detach the current consumer. Later events are buffered again.
    ///
    /// Returns `false` if no consumer was attached.
    pub fn detach(&self) -> bool {
        self.state.lock().consumer.take().is_some()
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().consumer.is_some()
    }

    /// Number of events waiting for a consumer.
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }
}

impl<E: Send + fmt::Debug> Default for EventBridge<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventBridge<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EventBridge")
            .field("attached", &state.consumer.is_some())
            .field("pending", &state.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn drain(rx: &mut mpsc::UnboundedReceiver<PlayerEvent>) -> Vec<PlayerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn test_buffered_events_flush_in_order() {
        let bridge = EventBridge::new();
        bridge.emit(PlayerEvent::BufferingStart);
        bridge.emit(PlayerEvent::buffered_up_to(100));
        bridge.emit(PlayerEvent::PipStart);
        assert_eq!(bridge.pending_len(), 3);

        let (tx, mut rx) = mpsc::unbounded_channel();
        assert_eq!(bridge.attach(tx), 3);
        bridge.emit(PlayerEvent::PipStop);

        assert_eq!(
            drain(&mut rx),
            vec![
                PlayerEvent::BufferingStart,
                PlayerEvent::buffered_up_to(100),
                PlayerEvent::PipStart,
                PlayerEvent::PipStop,
            ]
        );
        assert_eq!(bridge.pending_len(), 0);
    }

    #[test]
    fn test_reattach_does_not_replay_flushed_events() {
        let bridge = EventBridge::new();
        bridge.emit(PlayerEvent::PipStart);

        let (tx, mut rx) = mpsc::unbounded_channel();
        bridge.attach(tx);
        assert_eq!(drain(&mut rx), vec![PlayerEvent::PipStart]);

        assert!(bridge.detach());
        bridge.emit(PlayerEvent::PipStop);

        let (tx2, mut rx2) = mpsc::unbounded_channel();
        assert_eq!(bridge.attach(tx2), 1);
        assert_eq!(drain(&mut rx2), vec![PlayerEvent::PipStop]);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_detach_without_consumer() {
        let bridge: EventBridge = EventBridge::new();
        assert!(!bridge.detach());
        assert!(!bridge.is_attached());
    }

    #[test]
    fn test_closed_consumer_rebuffers_event() {
        let bridge = EventBridge::new();
        let (tx, rx) = mpsc::unbounded_channel();
        bridge.attach(tx);
        drop(rx);

        bridge.emit(PlayerEvent::Seek { position: 42 });
        assert!(!bridge.is_attached());
        assert_eq!(bridge.pending_len(), 1);

        let (tx2, mut rx2) = mpsc::unbounded_channel();
        bridge.attach(tx2);
        assert_eq!(drain(&mut rx2), vec![PlayerEvent::Seek { position: 42 }]);
    }

    #[test]
    fn test_attach_closed_consumer_keeps_buffer() {
        let bridge = EventBridge::new();
        bridge.emit(PlayerEvent::PipStart);
        bridge.emit(PlayerEvent::PipStop);

        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        assert_eq!(bridge.attach(tx), 0);
        assert!(!bridge.is_attached());
        assert_eq!(bridge.pending_len(), 2);
    }

    #[test]
    fn test_initialized_record_omits_missing_dimensions() {
        let event = PlayerEvent::Initialized {
            key: Some("clip".to_string()),
            duration: 1200,
            width: None,
            height: None,
        };
        let record = event.to_record().unwrap();
        assert_eq!(
            Value::Object(record),
            json!({"event": "initialized", "key": "clip", "duration": 1200})
        );
    }

    #[test]
    fn test_event_records() {
        let ad = PlayerEvent::PlayingAdChanged {
            is_playing_ad: true,
            duration: 30_000,
        };
        assert_eq!(
            serde_json::to_value(&ad).unwrap(),
            json!({"event": "isPlayingAd", "isPlayingAd": true, "duration": 30000})
        );

        assert_eq!(
            serde_json::to_value(PlayerEvent::buffered_up_to(500)).unwrap(),
            json!({"event": "bufferingUpdate", "values": [[0, 500]]})
        );

        assert_eq!(
            serde_json::to_value(PlayerEvent::Completed { key: None }).unwrap(),
            json!({"event": "completed", "key": null})
        );

        assert_eq!(
            serde_json::to_value(PlayerEvent::BufferingStart).unwrap(),
            json!({"event": "bufferingStart"})
        );
    }

    #[test]
    fn test_engine_error_payload() {
        let event = PlayerEvent::engine_error("Source error");
        assert_eq!(event.name(), "error");
        assert_eq!(
            event,
            PlayerEvent::Error {
                code: "VideoError".to_string(),
                message: "Video player had error Source error".to_string(),
            }
        );
    }

    #[test]
    fn test_name_matches_serialized_tag() {
        let events = [
            PlayerEvent::BufferingEnd { duration: 1 },
            PlayerEvent::Seek { position: 3 },
            PlayerEvent::PipStop,
            PlayerEvent::PlayingAdChanged {
                is_playing_ad: false,
                duration: 0,
            },
        ];
        for event in events {
            let record = event.to_record().unwrap();
            assert_eq!(record["event"], Value::String(event.name().to_string()));
        }
    }
}
