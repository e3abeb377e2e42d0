use serde::{Deserialize, Serialize};

use crate::models::{ExecutionResult, Participant, Session};

/// Opcodes for gateway frames.
pub mod opcode {
    pub const EVENT: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const JOIN: u8 = 2;
    pub const READY: u8 = 3;
    pub const HEARTBEAT_ACK: u8 = 4;
    pub const HELLO: u8 = 5;
    pub const ERROR: u8 = 6;
    pub const INVALID_SESSION: u8 = 7;
}

/// Close codes.
pub mod close_code {
    pub const SESSION_TIMED_OUT: u16 = 4009;
}

/// Gateway frame envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct GatewayMessage {
    pub op: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl GatewayMessage {
    pub fn new(op: u8) -> Self {
        Self {
            op,
            seq: None,
            event_type: None,
            data: None,
        }
    }

    pub fn with_data(op: u8, data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            ..Self::new(op)
        }
    }

    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// JOIN payload data.
#[derive(Debug, Default, Deserialize)]
pub struct JoinData {
    pub name: Option<String>,
}

impl JoinData {
    pub fn display_name(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => "Anonymous".to_string(),
        }
    }
}

/// READY payload data.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyData {
    pub connection_id: String,
    pub participant: Participant,
    pub session: Session,
    pub executions: Vec<ExecutionResult>,
    pub heartbeat_interval: u64,
}
