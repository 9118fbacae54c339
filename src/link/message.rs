//! Companion link wire format.
//!
//! Every message travels as a JSON envelope:
//!
//! ```text
//! { "messageType": "sensorData" | "startMapping" | "startNormal" | "stopSession",
//!   "payload": { ... } }            // optional
//! ```
//!
//! Only `sensorData` carries a payload, `{"data": [frame, ...]}`. Parsing and
//! serialization happen here; the rest of the crate sees [`LinkMessage`].

use crate::frame::SensorFrame;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    SensorData,
    StartMapping,
    StartNormal,
    StopSession,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::SensorData => "sensorData",
            MessageType::StartMapping => "startMapping",
            MessageType::StartNormal => "startNormal",
            MessageType::StopSession => "stopSession",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sensorData" => Some(MessageType::SensorData),
            "startMapping" => Some(MessageType::StartMapping),
            "startNormal" => Some(MessageType::StartNormal),
            "stopSession" => Some(MessageType::StopSession),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message exchanged with the companion device.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkMessage {
    /// A batch of frames in capture order
    SensorData(Vec<SensorFrame>),
    StartMapping,
    StartNormal,
    StopSession,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "messageType")]
    message_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SensorDataPayload {
    data: Vec<SensorFrame>,
}

impl LinkMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            LinkMessage::SensorData(_) => MessageType::SensorData,
            LinkMessage::StartMapping => MessageType::StartMapping,
            LinkMessage::StartNormal => MessageType::StartNormal,
            LinkMessage::StopSession => MessageType::StopSession,
        }
    }

    /// Build the JSON envelope.
    pub fn to_value(&self) -> Result<Value, MessageError> {
        let payload = match self {
            LinkMessage::SensorData(frames) => {
                let data = serde_json::to_value(frames)
                    .map_err(|e| MessageError::Malformed(e.to_string()))?;
                let mut map = Map::new();
                map.insert("data".to_string(), data);
                Some(map)
            }
            _ => None,
        };

        let envelope = Envelope {
            message_type: self.message_type().as_str().to_string(),
            payload,
        };
        serde_json::to_value(envelope).map_err(|e| MessageError::Malformed(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, MessageError> {
        self.to_value().map(|v| v.to_string())
    }

    /// Parse a JSON envelope. Payloads on command messages are ignored.
    pub fn from_value(value: &Value) -> Result<Self, MessageError> {
        let envelope: Envelope = serde_json::from_value(value.clone())
            .map_err(|e| MessageError::Malformed(e.to_string()))?;

        let message_type = MessageType::parse(&envelope.message_type)
            .ok_or_else(|| MessageError::UnknownType(envelope.message_type.clone()))?;

        match message_type {
            MessageType::SensorData => {
                let payload = envelope.payload.ok_or(MessageError::InvalidPayload {
                    message_type,
                    reason: "missing payload".to_string(),
                })?;
                let parsed: SensorDataPayload = serde_json::from_value(Value::Object(payload))
                    .map_err(|e| MessageError::InvalidPayload {
                        message_type,
                        reason: e.to_string(),
                    })?;
                Ok(LinkMessage::SensorData(parsed.data))
            }
            MessageType::StartMapping => Ok(LinkMessage::StartMapping),
            MessageType::StartNormal => Ok(LinkMessage::StartNormal),
            MessageType::StopSession => Ok(LinkMessage::StopSession),
        }
    }

    pub fn from_json(s: &str) -> Result<Self, MessageError> {
        let value: Value =
            serde_json::from_str(s).map_err(|e| MessageError::Malformed(e.to_string()))?;
        Self::from_value(&value)
    }
}

/// Wire-format errors.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageError {
    /// Not a JSON envelope
    Malformed(String),
    /// Envelope with a `messageType` this relay does not know
    UnknownType(String),
    InvalidPayload {
        message_type: MessageType,
        reason: String,
    },
}

impl std::fmt::Display for MessageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageError::Malformed(e) => write!(f, "malformed message: {e}"),
            MessageError::UnknownType(t) => write!(f, "unknown message type '{t}'"),
            MessageError::InvalidPayload {
                message_type,
                reason,
            } => write!(f, "invalid {message_type} payload: {reason}"),
        }
    }
}

impl std::error::Error for MessageError {}
