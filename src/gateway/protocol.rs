//! Realtime sync messages and the rules an inbound message must satisfy
//! before the hub accepts it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::events::{opcode, GatewayMessage};
use crate::models::{CursorPosition, Participant, ParticipantInfo};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncMessage {
    CodeUpdate(CodeUpdate),
    CursorUpdate(CursorUpdate),
    ParticipantJoin(ParticipantJoin),
    ParticipantLeave(ParticipantLeave),
    ExecutionResult(ExecutionResultEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeUpdate {
    pub session_id: String,
    pub code: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorUpdate {
    pub session_id: String,
    pub user_id: String,
    pub user_name: String,
    pub color: String,
    pub position: CursorPosition,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantJoin {
    pub session_id: String,
    pub participant: ParticipantInfo,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantLeave {
    pub session_id: String,
    pub participant_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResultEvent {
    pub session_id: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time: f64,
    pub timestamp: DateTime<Utc>,
}

pub const CODE_UPDATE: &str = "code_update";
pub const CURSOR_UPDATE: &str = "cursor_update";
pub const PARTICIPANT_JOIN: &str = "participant_join";
pub const PARTICIPANT_LEAVE: &str = "participant_leave";
pub const EXECUTION_RESULT: &str = "execution_result";

/// Required top-level fields per message type.
fn required_fields(message_type: &str) -> Option<&'static [&'static str]> {
    let fields: &'static [&'static str] = match message_type {
        CODE_UPDATE => &["sessionId", "timestamp", "code", "userId"],
        CURSOR_UPDATE => &[
            "sessionId",
            "timestamp",
            "userId",
            "userName",
            "color",
            "position",
        ],
        PARTICIPANT_JOIN => &["sessionId", "timestamp", "participant"],
        PARTICIPANT_LEAVE => &["sessionId", "timestamp", "participantId"],
        EXECUTION_RESULT => &["sessionId", "timestamp", "output", "executionTime"],
        _ => return None,
    };
    Some(fields)
}

impl SyncMessage {
    pub fn message_type(&self) -> &'static str {
        match self {
            SyncMessage::CodeUpdate(_) => CODE_UPDATE,
            SyncMessage::CursorUpdate(_) => CURSOR_UPDATE,
            SyncMessage::ParticipantJoin(_) => PARTICIPANT_JOIN,
            SyncMessage::ParticipantLeave(_) => PARTICIPANT_LEAVE,
            SyncMessage::ExecutionResult(_) => EXECUTION_RESULT,
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            SyncMessage::CodeUpdate(m) => &m.session_id,
            SyncMessage::CursorUpdate(m) => &m.session_id,
            SyncMessage::ParticipantJoin(m) => &m.session_id,
            SyncMessage::ParticipantLeave(m) => &m.session_id,
            SyncMessage::ExecutionResult(m) => &m.session_id,
        }
    }

    pub fn code_update(session_id: &str, code: &str, user_id: &str) -> Self {
        SyncMessage::CodeUpdate(CodeUpdate {
            session_id: session_id.to_string(),
            code: code.to_string(),
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
        })
    }

    pub fn participant_join(session_id: &str, participant: &Participant) -> Self {
        SyncMessage::ParticipantJoin(ParticipantJoin {
            session_id: session_id.to_string(),
            participant: participant.into(),
            timestamp: Utc::now(),
        })
    }

    pub fn participant_leave(session_id: &str, participant_id: &str) -> Self {
        SyncMessage::ParticipantLeave(ParticipantLeave {
            session_id: session_id.to_string(),
            participant_id: participant_id.to_string(),
            timestamp: Utc::now(),
        })
    }

    /// Decode and structurally validate an inbound EVENT payload.
    pub fn parse(data: serde_json::Value) -> Result<Self, ProtocolError> {
        let message_type = match data.get("type") {
            None => return Err(ProtocolError::MissingField("type")),
            Some(serde_json::Value::String(t)) => t.clone(),
            Some(_) => {
                return Err(ProtocolError::InvalidField {
                    field: "type",
                    reason: "must be a string".into(),
                })
            }
        };
        let required =
            required_fields(&message_type).ok_or(ProtocolError::UnknownType(message_type.clone()))?;
        for field in required {
            if data.get(*field).map_or(true, serde_json::Value::is_null) {
                return Err(ProtocolError::MissingField(field));
            }
        }

        let message: SyncMessage =
            serde_json::from_value(data).map_err(|e| ProtocolError::Malformed {
                message_type,
                reason: e.to_string(),
            })?;
        message.validate()?;
        Ok(message)
    }

    /// Value checks that the type system does not cover.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            SyncMessage::CursorUpdate(m) => {
                if m.position.line < 1 {
                    return Err(ProtocolError::InvalidField {
                        field: "position.line",
                        reason: format!("must be >= 1, got {}", m.position.line),
                    });
                }
                if m.position.column < 1 {
                    return Err(ProtocolError::InvalidField {
                        field: "position.column",
                        reason: format!("must be >= 1, got {}", m.position.column),
                    });
                }
            }
            SyncMessage::ExecutionResult(m) => {
                if !m.execution_time.is_finite() || m.execution_time < 0.0 {
                    return Err(ProtocolError::InvalidField {
                        field: "executionTime",
                        reason: "must be a non-negative number".into(),
                    });
                }
            }
            SyncMessage::CodeUpdate(_)
            | SyncMessage::ParticipantJoin(_)
            | SyncMessage::ParticipantLeave(_) => {}
        }
        Ok(())
    }

    /// Check that a client on `session_id`, joined as `participant_id`, may send this.
    pub fn check_origin(&self, session_id: &str, participant_id: &str) -> Result<(), ProtocolError> {
        if self.session_id() != session_id {
            return Err(ProtocolError::InvalidField {
                field: "sessionId",
                reason: "does not match the connected session".into(),
            });
        }
        let user_id = match self {
            SyncMessage::CodeUpdate(m) => &m.user_id,
            SyncMessage::CursorUpdate(m) => &m.user_id,
            SyncMessage::ParticipantJoin(_) | SyncMessage::ParticipantLeave(_) => {
                return Err(ProtocolError::ServerOnly(self.message_type()))
            }
            SyncMessage::ExecutionResult(_) => return Ok(()),
        };
        if user_id != participant_id {
            return Err(ProtocolError::InvalidField {
                field: "userId",
                reason: "does not match the joined participant".into(),
            });
        }
        Ok(())
    }

    /// Wrap in an EVENT frame carrying the session sequence number.
    pub fn to_frame(&self, seq: u64) -> GatewayMessage {
        GatewayMessage {
            op: opcode::EVENT,
            seq: Some(seq),
            event_type: Some(self.message_type().to_string()),
            data: serde_json::to_value(self).ok(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame could not be decoded: {0}")]
    Decode(String),
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    #[error("malformed {message_type} message: {reason}")]
    Malformed {
        message_type: String,
        reason: String,
    },
    #[error("invalid `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("{0} is sent by the server only")]
    ServerOnly(&'static str),
    #[error("connection has not joined the session")]
    NotJoined,
    #[error("connection has already joined the session")]
    AlreadyJoined,
}

impl ProtocolError {
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::Decode(_) => "decode_error",
            ProtocolError::UnknownOpcode(_) => "unknown_opcode",
            ProtocolError::MissingField(_) => "missing_field",
            ProtocolError::UnknownType(_) => "unknown_type",
            ProtocolError::Malformed { .. } => "malformed_message",
            ProtocolError::InvalidField { .. } => "invalid_field",
            ProtocolError::ServerOnly(_) => "server_only",
            ProtocolError::NotJoined => "not_joined",
            ProtocolError::AlreadyJoined => "already_joined",
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            ProtocolError::MissingField(field) => Some(field),
            ProtocolError::InvalidField { field, .. } => Some(field),
            ProtocolError::UnknownType(_) => Some("type"),
            _ => None,
        }
    }

    pub fn to_frame(&self) -> GatewayMessage {
        let mut data = serde_json::json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        if let Some(field) = self.field() {
            data["field"] = serde_json::json!(field);
        }
        GatewayMessage::with_data(opcode::ERROR, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn code_update_json() -> serde_json::Value {
        json!({
            "type": "code_update",
            "sessionId": "s1",
            "code": "x=1",
            "userId": "u1",
            "timestamp": "2025-01-01T00:00:00Z"
        })
    }

    fn cursor_json(line: i64, column: i64) -> serde_json::Value {
        json!({
            "type": "cursor_update",
            "sessionId": "s1",
            "userId": "u1",
            "userName": "Ada",
            "color": "#3B82F6",
            "position": { "line": line, "column": column },
            "timestamp": "2025-01-01T00:00:00Z"
        })
    }

    #[test]
    fn test_parse_code_update() {
        let msg = SyncMessage::parse(code_update_json()).unwrap();
        match msg {
            SyncMessage::CodeUpdate(m) => {
                assert_eq!(m.code, "x=1");
                assert_eq!(m.user_id, "u1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = SyncMessage::parse(json!({ "type": "language_update", "sessionId": "s1" }))
            .unwrap_err();
        assert_eq!(err, ProtocolError::UnknownType("language_update".into()));
        assert_eq!(err.field(), Some("type"));
    }

    #[test]
    fn test_missing_type_and_fields() {
        assert_eq!(
            SyncMessage::parse(json!({ "sessionId": "s1" })).unwrap_err(),
            ProtocolError::MissingField("type")
        );
        let mut value = code_update_json();
        value.as_object_mut().unwrap().remove("code");
        assert_eq!(
            SyncMessage::parse(value).unwrap_err(),
            ProtocolError::MissingField("code")
        );
    }

    #[test]
    fn test_wrong_field_type_is_malformed() {
        let mut value = code_update_json();
        value["code"] = json!(42);
        let err = SyncMessage::parse(value).unwrap_err();
        assert_eq!(err.code(), "malformed_message");
    }

    #[test]
    fn test_bad_timestamp_is_malformed() {
        let mut value = code_update_json();
        value["timestamp"] = json!("yesterday");
        assert!(matches!(
            SyncMessage::parse(value),
            Err(ProtocolError::Malformed { .. })
        ));
    }

    #[test]
    fn test_cursor_must_be_one_based() {
        assert!(SyncMessage::parse(cursor_json(1, 1)).is_ok());
        assert_eq!(
            SyncMessage::parse(cursor_json(0, 4)).unwrap_err().field(),
            Some("position.line")
        );
        assert_eq!(
            SyncMessage::parse(cursor_json(2, -1)).unwrap_err().field(),
            Some("position.column")
        );
    }

    #[test]
    fn test_cursor_far_past_document_is_accepted() {
        assert!(SyncMessage::parse(cursor_json(1_000_000, 5_000)).is_ok());
    }

    #[test]
    fn test_fractional_cursor_is_malformed() {
        let mut value = cursor_json(1, 1);
        value["position"]["line"] = json!(1.5);
        assert!(matches!(
            SyncMessage::parse(value),
            Err(ProtocolError::Malformed { .. })
        ));
    }

    #[test]
    fn test_negative_execution_time_rejected() {
        let value = json!({
            "type": "execution_result",
            "sessionId": "s1",
            "output": "",
            "executionTime": -3.0,
            "timestamp": "2025-01-01T00:00:00Z"
        });
        assert_eq!(
            SyncMessage::parse(value).unwrap_err().field(),
            Some("executionTime")
        );
    }

    #[test]
    fn test_check_origin() {
        let msg = SyncMessage::parse(code_update_json()).unwrap();
        assert!(msg.check_origin("s1", "u1").is_ok());
        assert_eq!(
            msg.check_origin("s2", "u1").unwrap_err().field(),
            Some("sessionId")
        );
        assert_eq!(
            msg.check_origin("s1", "u2").unwrap_err().field(),
            Some("userId")
        );

        let leave = SyncMessage::participant_leave("s1", "u1");
        assert_eq!(
            leave.check_origin("s1", "u1").unwrap_err(),
            ProtocolError::ServerOnly(PARTICIPANT_LEAVE)
        );
    }

    #[test]
    fn test_event_frame_shape() {
        let msg = SyncMessage::participant_leave("s1", "p1");
        let frame: serde_json::Value =
            serde_json::from_str(&msg.to_frame(7).to_text()).unwrap();
        assert_eq!(frame["op"], 0);
        assert_eq!(frame["seq"], 7);
        assert_eq!(frame["type"], "participant_leave");
        assert_eq!(frame["data"]["type"], "participant_leave");
        assert_eq!(frame["data"]["participantId"], "p1");
        assert_eq!(frame["data"]["sessionId"], "s1");
        assert!(frame["data"]["timestamp"].is_string());
    }

    #[test]
    fn test_error_frame_names_field() {
        let frame = ProtocolError::MissingField("code").to_frame();
        let data = frame.data.unwrap();
        assert_eq!(frame.op, opcode::ERROR);
        assert_eq!(data["code"], "missing_field");
        assert_eq!(data["field"], "code");
    }
}
