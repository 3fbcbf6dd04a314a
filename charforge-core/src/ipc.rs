use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Inbound events from the chat gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CharforgeRequest {
    Ping,
    Health,
    ListWorldviews,
    ViewWorldview {
        name: String,
    },
    CreateWorldview {
        name: String,
        description: String,
    },
    EditWorldview {
        name: String,
        description: String,
    },
    Start {
        owner: String,
        worldview: String,
    },
    Message {
        owner: String,
        text: String,
        #[serde(default)]
        private_channel: bool,
    },
    Generate {
        owner: String,
    },
    Quit {
        owner: String,
    },
    SaveProfile {
        owner: String,
        character_name: String,
        #[serde(default)]
        overwrite: bool,
    },
    ListProfiles {
        owner: String,
    },
    LoadProfile {
        owner: String,
        character_name: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CharforgeResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub version: String,
}

impl CharforgeResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    /// Failure with a user-facing reply attached; `error` carries the
    /// machine-readable kind.
    pub fn rejected(kind: &str, reply: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: Some(serde_json::json!({
                "reply": reply.into(),
                "ephemeral": true,
            })),
            error: Some(kind.to_string()),
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    pub fn pong() -> Self {
        Self::ok(serde_json::json!({"pong": true}))
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
