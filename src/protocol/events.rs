// Typed payloads of the inbound message types the engine consumes

use crate::timeline::export::{ExportDocument, SessionMessage};
use crate::timeline::markers::RecordingEdge;
use crate::types::{NeedleAction, Reading};
use serde::{Deserialize, Serialize};

/// Cumulative tone-arm motion reported with each meter event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToneArmMotion {
    #[serde(default)]
    pub total_down_motion: f64,
    #[serde(default)]
    pub total_up_motion: f64,
    #[serde(default)]
    pub net_motion: f64,
    #[serde(default, rename = "startTA")]
    pub start_ta: f64,
    #[serde(default, rename = "currentTA")]
    pub current_ta: f64,
}

/// Payload of `meter.event`: one telemetry tick from the instrument backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterEvent {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub needle_action: Option<NeedleAction>,
    #[serde(default)]
    pub position: Option<f64>,
    #[serde(default)]
    pub tone_arm: Option<f64>,
    #[serde(default)]
    pub sensitivity: Option<f64>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub ta_trend: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub hardware_connected: bool,
    #[serde(default)]
    pub samples_received: Option<u64>,
    #[serde(default)]
    pub raw_signal: Option<f64>,
    #[serde(default)]
    pub raw_unfiltered: Option<f64>,
    /// Backend clock reading of the last classification
    #[serde(default)]
    pub classified_at: Option<f64>,
    /// Length of the classification window in seconds
    #[serde(default)]
    pub classify_window: Option<f64>,
    #[serde(default)]
    pub ta_motion: Option<ToneArmMotion>,
}

impl MeterEvent {
    /// Sample fields carried by this event
    pub fn reading(&self) -> Reading {
        Reading {
            raw_filtered: self.raw_signal,
            raw_unfiltered: self.raw_unfiltered,
            position: self.position,
            tone_offset: self.tone_arm,
            classified_action: self.needle_action,
            confidence: self.confidence.unwrap_or(0.0),
            connected: self.hardware_connected,
        }
    }
}

/// Payload of `chat.message`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub speaker: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub turn_number: Option<u32>,
    /// Epoch seconds at which an auditor question was put to the subject
    #[serde(default)]
    pub question_dropped_at: Option<f64>,
}

impl ChatMessage {
    pub fn to_session_message(&self) -> SessionMessage {
        SessionMessage {
            speaker: self.speaker.clone(),
            text: self.text.clone(),
            timestamp: self.timestamp.clone(),
            turn_number: self.turn_number,
        }
    }
}

/// Payload of `session.started` and `session.ended`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLifecycle {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Payload of `session.recovered`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecovered {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<SessionMessage>,
    /// Previously exported buffer to restore, when the backend kept one
    #[serde(default)]
    pub snapshot: Option<ExportDocument>,
}

/// Payload of `recording.marker`: one edge of an operator recording interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingMarker {
    pub edge: RecordingEdge,
}

/// Payload of `error`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendError {
    #[serde(default)]
    pub message: String,
}
