// Wire protocol between the console and the instrument backend
//
// Every frame is a JSON object `{"type", "data", "correlationId"?}`. The backend
// names the correlation field `requestId`; both spellings are accepted inbound.
// Payloads are decoded into the tagged `InboundEvent` before they reach any
// consumer, so shape mismatches are rejected here and never trusted downstream.

pub mod events;

use crate::error::{TelemetryError, TelemetryResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use events::{
    BackendError, ChatMessage, MeterEvent, RecordingMarker, SessionLifecycle, SessionRecovered,
    ToneArmMotion,
};

/// Correlation id assigned to outbound requests and echoed by the backend
pub type CorrelationId = String;

/// Message type names understood by the engine
pub mod kinds {
    pub const METER_EVENT: &str = "meter.event";
    pub const CHAT_MESSAGE: &str = "chat.message";
    pub const SESSION_STARTED: &str = "session.started";
    pub const SESSION_ENDED: &str = "session.ended";
    pub const SESSION_RECOVERED: &str = "session.recovered";
    pub const RECORDING_MARKER: &str = "recording.marker";
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const ERROR: &str = "error";
}

/// One frame on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub data: Value,

    #[serde(default, alias = "requestId", skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
}

impl WireMessage {
    pub fn new(kind: impl Into<String>, data: Value, correlation_id: Option<CorrelationId>) -> Self {
        Self {
            kind: kind.into(),
            data,
            correlation_id,
        }
    }

    /// Parse a text frame
    pub fn parse(raw: &str) -> TelemetryResult<Self> {
        let msg: WireMessage = serde_json::from_str(raw)?;
        if msg.kind.is_empty() {
            return Err(TelemetryError::Malformed("missing message type".to_string()));
        }
        Ok(msg)
    }

    pub fn to_json(&self) -> TelemetryResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Inbound events, validated at the boundary
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Meter(MeterEvent),
    Chat(ChatMessage),
    SessionStarted(SessionLifecycle),
    SessionEnded(SessionLifecycle),
    SessionRecovered(Box<SessionRecovered>),
    Recording(RecordingMarker),
    Pong,
    Error(BackendError),
    /// A type the core does not interpret; delivered to subscribers untouched
    Other { kind: String, data: Value },
}

fn payload<T: serde::de::DeserializeOwned>(msg: &WireMessage) -> TelemetryResult<T> {
    // A missing payload decodes like an empty object so all-optional payloads pass
    let data = match &msg.data {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(data)
        .map_err(|e| TelemetryError::Malformed(format!("{} payload: {}", msg.kind, e)))
}

impl InboundEvent {
    /// Decode the payload of a wire message according to its type
    pub fn decode(msg: &WireMessage) -> TelemetryResult<Self> {
        let event = match msg.kind.as_str() {
            kinds::METER_EVENT => Self::Meter(payload(msg)?),
            kinds::CHAT_MESSAGE => Self::Chat(payload(msg)?),
            kinds::SESSION_STARTED => Self::SessionStarted(payload(msg)?),
            kinds::SESSION_ENDED => Self::SessionEnded(payload(msg)?),
            kinds::SESSION_RECOVERED => Self::SessionRecovered(Box::new(payload(msg)?)),
            kinds::RECORDING_MARKER => Self::Recording(payload(msg)?),
            kinds::PONG => Self::Pong,
            kinds::ERROR => Self::Error(payload(msg)?),
            other => Self::Other {
                kind: other.to_string(),
                data: msg.data.clone(),
            },
        };
        Ok(event)
    }

    /// Message type this event was decoded from
    pub fn kind(&self) -> &str {
        match self {
            Self::Meter(_) => kinds::METER_EVENT,
            Self::Chat(_) => kinds::CHAT_MESSAGE,
            Self::SessionStarted(_) => kinds::SESSION_STARTED,
            Self::SessionEnded(_) => kinds::SESSION_ENDED,
            Self::SessionRecovered(_) => kinds::SESSION_RECOVERED,
            Self::Recording(_) => kinds::RECORDING_MARKER,
            Self::Pong => kinds::PONG,
            Self::Error(_) => kinds::ERROR,
            Self::Other { kind, .. } => kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::RecordingEdge;
    use crate::types::NeedleAction;
    use serde_json::json;

    #[test]
    fn test_parse_accepts_request_id_alias() {
        let msg = WireMessage::parse(r#"{"type":"pong","data":{},"requestId":"abc"}"#).unwrap();
        assert_eq!(msg.kind, "pong");
        assert_eq!(msg.correlation_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_serialize_uses_correlation_id() {
        let msg = WireMessage::new("ping", json!({}), Some("id-1".to_string()));
        let text = msg.to_json().unwrap();
        assert!(text.contains("\"correlationId\":\"id-1\""));
        assert!(text.contains("\"type\":\"ping\""));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(WireMessage::parse("not json").is_err());
        assert!(WireMessage::parse(r#"{"data":{}}"#).is_err());
        assert!(WireMessage::parse(r#"{"type":"","data":{}}"#).is_err());
    }

    #[test]
    fn test_decode_meter_event() {
        let msg = WireMessage::new(
            kinds::METER_EVENT,
            json!({
                "needleAction": "fall",
                "position": 0.42,
                "toneArm": 2.5,
                "confidence": 0.8,
                "hardwareConnected": true,
                "samplesReceived": 1234,
                "rawSignal": 3_200_000.0,
                "rawUnfiltered": 3_200_010.0,
                "classifiedAt": 17.5,
                "classifyWindow": 2.0,
                "taTrend": "RISING",
                "taMotion": {"totalDownMotion": 0.1, "totalUpMotion": 0.3, "netMotion": 0.2,
                              "startTA": 2.0, "currentTA": 2.2}
            }),
            None,
        );

        let event = InboundEvent::decode(&msg).unwrap();
        let InboundEvent::Meter(meter) = event else {
            panic!("expected meter event");
        };
        assert_eq!(meter.needle_action, Some(NeedleAction::Fall));
        assert_eq!(meter.samples_received, Some(1234));
        assert_eq!(meter.ta_motion.as_ref().unwrap().current_ta, 2.2);

        let reading = meter.reading();
        assert_eq!(reading.raw_filtered, Some(3_200_000.0));
        assert_eq!(reading.tone_offset, Some(2.5));
        assert!(reading.connected);
    }

    #[test]
    fn test_decode_rejects_shape_mismatch() {
        let msg = WireMessage::new(kinds::METER_EVENT, json!({"rawSignal": "loud"}), None);
        assert!(matches!(
            InboundEvent::decode(&msg),
            Err(TelemetryError::Malformed(_))
        ));

        let msg = WireMessage::new(kinds::CHAT_MESSAGE, json!({"text": "no speaker"}), None);
        assert!(InboundEvent::decode(&msg).is_err());
    }

    #[test]
    fn test_decode_unknown_type_is_other() {
        let msg = WireMessage::new("pc.list.data", json!({"profiles": []}), None);
        let event = InboundEvent::decode(&msg).unwrap();
        assert_eq!(event.kind(), "pc.list.data");
        assert!(matches!(event, InboundEvent::Other { .. }));
    }

    #[test]
    fn test_decode_recording_edge() {
        let msg = WireMessage::new(kinds::RECORDING_MARKER, json!({"edge": "start"}), None);
        let InboundEvent::Recording(marker) = InboundEvent::decode(&msg).unwrap() else {
            panic!("expected recording marker");
        };
        assert_eq!(marker.edge, RecordingEdge::Start);

        let msg = WireMessage::new(kinds::RECORDING_MARKER, json!({"edge": "sideways"}), None);
        assert!(InboundEvent::decode(&msg).is_err());
    }

    #[test]
    fn test_decode_lifecycle_without_payload() {
        let msg = WireMessage::new(kinds::SESSION_STARTED, Value::Null, None);
        assert!(matches!(
            InboundEvent::decode(&msg).unwrap(),
            InboundEvent::SessionStarted(_)
        ));
    }
}
