//! Event stream frame types.
//!
//! Every frame on the engine stream is `{"type": <tag>, "payload": {...}}`.
//! Decoding is two-step, like the channel/data split used for exchange
//! streams: read the envelope, then parse the payload for the known tag.

use crate::error::{WsError, WsResult};
use desk_core::{LogEntry, ProgressUpdate};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Tag of the liveness ping sent by the console.
pub const PING_TAG: &str = "ping";
/// Tag of the engine's liveness reply.
pub const PONG_TAG: &str = "pong";

// ============================================================================
// Inbound
// ============================================================================

/// Frame envelope before payload parsing.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFrame {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// `status` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusPush {
    pub message: String,
    /// Absent when the engine only changes the message.
    #[serde(default, rename = "isRunning", alias = "is_running")]
    pub is_running: Option<bool>,
}

/// `position_closed` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PositionClosed {
    #[serde(alias = "fullSymbol")]
    pub full_symbol: String,
    /// Fraction of the position that was closed, in `(0, 1]`.
    pub ratio: Decimal,
    /// Present only when the engine tags close events for deduplication.
    #[serde(default, alias = "eventId")]
    pub event_id: Option<String>,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Log(LogEntry),
    Status(StatusPush),
    Progress(ProgressUpdate),
    PositionClosed(PositionClosed),
    RefreshPositions,
    /// Liveness reply. Carries no state.
    Pong,
    /// Tag this console does not know. Carried for logging only.
    Unknown(String),
}

impl InboundEvent {
    /// Decode a text frame.
    pub fn decode(text: &str) -> WsResult<Self> {
        let raw: RawFrame = serde_json::from_str(text)?;
        Self::from_raw(raw)
    }

    /// Parse the payload of an already-split envelope.
    pub fn from_raw(raw: RawFrame) -> WsResult<Self> {
        let event = match raw.tag.as_str() {
            "log" => Self::Log(parse_payload(&raw.tag, raw.payload)?),
            "status" => Self::Status(parse_payload(&raw.tag, raw.payload)?),
            "progress_update" => Self::Progress(parse_payload(&raw.tag, raw.payload)?),
            "position_closed" => Self::PositionClosed(parse_payload(&raw.tag, raw.payload)?),
            "refresh_positions" => Self::RefreshPositions,
            PONG_TAG => Self::Pong,
            _ => Self::Unknown(raw.tag),
        };
        Ok(event)
    }

    /// Wire tag of this event.
    pub fn tag(&self) -> &str {
        match self {
            Self::Log(_) => "log",
            Self::Status(_) => "status",
            Self::Progress(_) => "progress_update",
            Self::PositionClosed(_) => "position_closed",
            Self::RefreshPositions => "refresh_positions",
            Self::Pong => PONG_TAG,
            Self::Unknown(tag) => tag,
        }
    }
}

fn parse_payload<T: DeserializeOwned>(tag: &str, payload: serde_json::Value) -> WsResult<T> {
    serde_json::from_value(payload).map_err(|e| WsError::ParseError(format!("{tag} payload: {e}")))
}

// ============================================================================
// Outbound
// ============================================================================

/// Frame sent by the console.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundFrame {
    #[serde(rename = "type")]
    pub tag: &'static str,
}

impl OutboundFrame {
    /// Liveness ping.
    pub fn ping() -> Self {
        Self { tag: PING_TAG }
    }

    pub fn to_json(&self) -> WsResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use desk_core::LogLevel;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decode_status_with_running_flag() {
        let event =
            InboundEvent::decode(r#"{"type":"status","payload":{"message":"Ready","isRunning":false}}"#)
                .unwrap();
        assert_eq!(
            event,
            InboundEvent::Status(StatusPush {
                message: "Ready".to_string(),
                is_running: Some(false),
            })
        );
    }

    #[test]
    fn test_decode_status_without_running_flag() {
        let event =
            InboundEvent::decode(r#"{"type":"status","payload":{"message":"Stopping..."}}"#).unwrap();
        match event {
            InboundEvent::Status(push) => assert_eq!(push.is_running, None),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_log() {
        let event = InboundEvent::decode(
            r#"{"type":"log","payload":{"message":"filled","level":"success","timestamp":"12:00:01"}}"#,
        )
        .unwrap();
        match event {
            InboundEvent::Log(entry) => {
                assert_eq!(entry.level, LogLevel::Success);
                assert_eq!(entry.timestamp, "12:00:01");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_position_closed() {
        let event = InboundEvent::decode(
            r#"{"type":"position_closed","payload":{"full_symbol":"SOL/USDT:USDT","ratio":0.25}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            InboundEvent::PositionClosed(PositionClosed {
                full_symbol: "SOL/USDT:USDT".to_string(),
                ratio: dec!(0.25),
                event_id: None,
            })
        );
    }

    #[test]
    fn test_decode_refresh_without_payload() {
        let event = InboundEvent::decode(r#"{"type":"refresh_positions"}"#).unwrap();
        assert_eq!(event, InboundEvent::RefreshPositions);
    }

    #[test]
    fn test_decode_pong_and_unknown() {
        assert_eq!(InboundEvent::decode(r#"{"type":"pong"}"#).unwrap(), InboundEvent::Pong);
        assert_eq!(
            InboundEvent::decode(r#"{"type":"plan_ready","payload":{}}"#).unwrap(),
            InboundEvent::Unknown("plan_ready".to_string())
        );
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(InboundEvent::decode("not json"), Err(WsError::Json(_))));
        assert!(matches!(
            InboundEvent::decode(r#"{"type":"progress_update","payload":{"total":"many"}}"#),
            Err(WsError::ParseError(_))
        ));
    }

    #[test]
    fn test_ping_frame() {
        assert_eq!(OutboundFrame::ping().to_json().unwrap(), r#"{"type":"ping"}"#);
    }
}
