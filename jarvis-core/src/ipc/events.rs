//! Events broadcast by the live engine to whatever hosts the UI.
//!
//! | Event | Meaning |
//! |-------|---------|
//! | `EngineStatusEvent` | session lifecycle and device failures |
//! | `SpeakingEvent` | the assistant started / stopped producing sound |

use serde::{Deserialize, Serialize};

/// Emitted when the assistant's audible state flips.
///
/// `speaking` turns `false` only after the grace period that follows the last
/// scheduled segment, so back-to-back segments never flicker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakingEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    pub speaking: bool,
}

/// Emitted when the engine state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Current state of the live voice engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Engine created, no session yet.
    Idle,
    /// Capture and playback both active.
    Live,
    /// Microphone failed; playback keeps draining inbound audio.
    CaptureLost,
    /// Session ended; the engine may be restarted.
    Stopped,
    /// Session setup failed (e.g. no output device).
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_event_serializes_with_lowercase_status() {
        let event = EngineStatusEvent {
            status: EngineStatus::CaptureLost,
            detail: Some("microphone unplugged".into()),
        };

        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["status"], "capturelost");
        assert_eq!(json["detail"], "microphone unplugged");

        let round_trip: EngineStatusEvent =
            serde_json::from_value(json).expect("deserialize status event");
        assert_eq!(round_trip.status, EngineStatus::CaptureLost);
    }

    #[test]
    fn status_rejects_non_lowercase_values() {
        let err = serde_json::from_str::<EngineStatus>(r#""Live""#);
        assert!(err.is_err(), "expected invalid casing to fail");
    }

    #[test]
    fn speaking_event_shape() {
        let json = serde_json::to_value(SpeakingEvent {
            seq: 4,
            speaking: true,
        })
        .expect("serialize speaking event");
        assert_eq!(json["seq"], 4);
        assert_eq!(json["speaking"], true);
    }
}
