use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: String,
    pub name: String,
    pub picture_url: Option<String>,
    pub information_url: Option<String>,
    /// Free-form JSON object, stored as text.
    pub meta_data: String,
    pub is_public: i64,
    pub can_block: i64,
    pub lang: String,
    /// Sum of the user's active room unread counters, never stored.
    #[sqlx(skip)]
    pub unread_count: i64,
    pub created: i64,
    pub modified: i64,
    #[serde(skip)]
    pub deleted: i64,
}

impl User {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            picture_url: None,
            information_url: None,
            meta_data: "{}".to_owned(),
            is_public: 0,
            can_block: 1,
            lang: String::new(),
            unread_count: 0,
            created: 0,
            modified: 0,
            deleted: 0,
        }
    }
}
