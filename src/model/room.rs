use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::UnknownCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum RoomType {
    OneOnOne = 1,
    PrivateRoom = 2,
    PublicRoom = 3,
    NoticeRoom = 4,
}

impl TryFrom<i64> for RoomType {
    type Error = UnknownCode;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        use RoomType::*;
        match code {
            1 => Ok(OneOnOne),
            2 => Ok(PrivateRoom),
            3 => Ok(PublicRoom),
            4 => Ok(NoticeRoom),
            code => Err(UnknownCode { what: "room type", code }),
        }
    }
}

impl From<RoomType> for i64 {
    fn from(room_type: RoomType) -> i64 {
        room_type as i64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub room_id: String,
    /// Creator of the room.
    pub user_id: String,
    pub name: String,
    pub picture_url: Option<String>,
    pub information_url: Option<String>,
    pub meta_data: String,
    #[sqlx(try_from = "i64")]
    pub room_type: RoomType,
    pub notification_topic_id: Option<String>,
    pub last_message: String,
    pub last_message_updated: i64,
    pub created: i64,
    pub modified: i64,
    #[serde(skip)]
    pub deleted: i64,
}

impl Room {
    pub fn new(room_id: impl Into<String>, user_id: impl Into<String>, room_type: RoomType) -> Self {
        Self {
            room_id: room_id.into(),
            user_id: user_id.into(),
            name: String::new(),
            picture_url: None,
            information_url: None,
            meta_data: "{}".to_owned(),
            room_type,
            notification_topic_id: None,
            last_message: String::new(),
            last_message_updated: 0,
            created: 0,
            modified: 0,
            deleted: 0,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}
