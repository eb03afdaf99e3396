use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Platform;

/// A device's registration on a room topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(skip)]
    pub id: i64,
    pub room_id: String,
    pub user_id: String,
    #[sqlx(try_from = "i64")]
    pub platform: Platform,
    pub notification_subscription_id: Option<String>,
    pub created: i64,
    pub modified: i64,
    pub deleted: i64,
}

impl Subscription {
    pub fn new(room_id: impl Into<String>, user_id: impl Into<String>, platform: Platform) -> Self {
        Self {
            id: 0,
            room_id: room_id.into(),
            user_id: user_id.into(),
            platform,
            notification_subscription_id: None,
            created: 0,
            modified: 0,
            deleted: 0,
        }
    }

    pub fn with_notification_subscription_id(mut self, id: impl Into<String>) -> Self {
        self.notification_subscription_id = Some(id.into());
        self
    }

    pub fn is_active(&self) -> bool {
        self.deleted == 0
    }
}
