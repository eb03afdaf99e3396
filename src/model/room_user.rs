use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::ROLE_GENERAL;

/// Membership of one user in one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RoomUser {
    #[serde(skip)]
    pub id: i64,
    pub room_id: String,
    pub user_id: String,
    pub unread_count: i64,
    pub role: i64,
    pub display: i64,
    pub created: i64,
    pub modified: i64,
    #[serde(skip)]
    pub deleted: i64,
}

impl RoomUser {
    pub fn new(room_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: 0,
            room_id: room_id.into(),
            user_id: user_id.into(),
            unread_count: 0,
            role: ROLE_GENERAL,
            display: 1,
            created: 0,
            modified: 0,
            deleted: 0,
        }
    }

    pub fn with_role(mut self, role: i64) -> Self {
        self.role = role;
        self
    }
}
