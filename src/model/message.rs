use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{now, ROLE_GENERAL};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum MessagePayload {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        mime: String,
        filename: String,
        source_url: String,
        thumbnail_url: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    File {
        mime: String,
        filename: String,
        source_url: String,
        size: i64,
    },
    IndicatorStart,
    IndicatorEnd,
    UpdateRoomUser {
        users: Vec<String>,
    },
}

impl MessagePayload {
    pub fn type_name(&self) -> &'static str {
        use MessagePayload::*;
        match self {
            Text { .. } => "text",
            Image { .. } => "image",
            File { .. } => "file",
            IndicatorStart => "indicatorStart",
            IndicatorEnd => "indicatorEnd",
            UpdateRoomUser { .. } => "updateRoomUser",
        }
    }

    /// Content messages bump unread counters and become the room's last message.
    pub fn is_content(&self) -> bool {
        matches!(self, Self::Text { .. } | Self::Image { .. } | Self::File { .. })
    }

    pub fn summary(&self) -> String {
        use MessagePayload::*;
        match self {
            Text { text } => text.clone(),
            Image { .. } => "[image]".to_owned(),
            File { filename, .. } => format!("[file] {filename}"),
            _ => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: String,
    pub room_id: String,
    pub user_id: String,
    #[serde(flatten)]
    pub payload: MessagePayload,
    pub role: i64,
    pub created: i64,
    pub modified: i64,
    #[serde(skip)]
    pub deleted: i64,
}

impl Message {
    pub fn new(room_id: impl Into<String>, user_id: impl Into<String>, payload: MessagePayload) -> Self {
        Self {
            message_id: String::new(),
            room_id: room_id.into(),
            user_id: user_id.into(),
            payload,
            role: 0,
            created: 0,
            modified: 0,
            deleted: 0,
        }
    }

    /// Fills the id, role and timestamps a caller left unset.
    pub fn before_save(&mut self) {
        if self.message_id.is_empty() {
            self.message_id = Uuid::now_v7().to_string();
        }
        if self.role == 0 {
            self.role = ROLE_GENERAL;
        }
        let now = now();
        if self.created == 0 {
            self.created = now;
        }
        if self.modified == 0 {
            self.modified = now;
        }
    }
}

/// Storage shape of a message; the payload is kept as JSON text.
#[derive(Debug, Clone, FromRow)]
pub struct MessageRow {
    pub message_id: String,
    pub room_id: String,
    pub user_id: String,
    pub message_type: String,
    pub payload: String,
    pub role: i64,
    pub created: i64,
    pub modified: i64,
    pub deleted: i64,
}

impl TryFrom<MessageRow> for Message {
    type Error = serde_json::Error;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            message_id: row.message_id,
            room_id: row.room_id,
            user_id: row.user_id,
            payload: serde_json::from_str(&row.payload)?,
            role: row.role,
            created: row.created,
            modified: row.modified,
            deleted: row.deleted,
        })
    }
}

impl TryFrom<&Message> for MessageRow {
    type Error = serde_json::Error;

    fn try_from(msg: &Message) -> Result<Self, Self::Error> {
        Ok(MessageRow {
            message_id: msg.message_id.clone(),
            room_id: msg.room_id.clone(),
            user_id: msg.user_id.clone(),
            message_type: msg.payload.type_name().to_owned(),
            payload: serde_json::to_string(&msg.payload)?,
            role: msg.role,
            created: msg.created,
            modified: msg.modified,
            deleted: msg.deleted,
        })
    }
}
