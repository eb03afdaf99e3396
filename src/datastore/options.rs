//! Option structs passed into the "many" store calls.
//!
//! Each struct is plain data with chainable setters: a later call overrides
//! an earlier one for the same field. Setters never validate; the consuming
//! operation calls `validate()` first so a bulk select or delete with no
//! identifying filter fails with [`StoreError::Validation`] before anything
//! reaches the backend.

use crate::{model::Platform, StoreError, StoreResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

/// Logical deletion stamps `deleted` with a timestamp; physical removes the rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeleteMode {
    #[default]
    Physical,
    Logical(i64),
}

fn require(any_filter: bool, what: &str, filters: &str) -> StoreResult<()> {
    if any_filter {
        Ok(())
    } else {
        Err(StoreError::Validation(format!(
            "An error occurred while {what}. Be sure to specify either {filters}"
        )))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SelectDevicesOptions {
    pub user_id: Option<String>,
    pub platform: Option<Platform>,
    pub token: Option<String>,
}

impl SelectDevicesOptions {
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn validate(&self) -> StoreResult<()> {
        require(
            self.user_id.is_some() || self.platform.is_some() || self.token.is_some(),
            "getting devices",
            "userId or platform or token",
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeleteDevicesOptions {
    pub mode: DeleteMode,
    pub user_id: Option<String>,
    pub platform: Option<Platform>,
    pub token: Option<String>,
}

impl DeleteDevicesOptions {
    pub fn logical_deleted(mut self, deleted: i64) -> Self {
        self.mode = DeleteMode::Logical(deleted);
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn validate(&self) -> StoreResult<()> {
        require(
            self.user_id.is_some() || self.platform.is_some() || self.token.is_some(),
            "deleting devices",
            "userId or platform or token",
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct SelectRoomUsersOptions {
    pub room_id: Option<String>,
    pub user_ids: Option<Vec<String>>,
    pub roles: Option<Vec<i64>>,
}

impl SelectRoomUsersOptions {
    pub fn room_id(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    pub fn user_ids<I, S>(mut self, user_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.user_ids = Some(user_ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn roles(mut self, roles: impl IntoIterator<Item = i64>) -> Self {
        self.roles = Some(roles.into_iter().collect());
        self
    }

    pub fn validate(&self) -> StoreResult<()> {
        require(
            self.room_id.is_some() || self.user_ids.as_ref().is_some_and(|ids| !ids.is_empty()),
            "getting room users",
            "roomId or userIds",
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeleteRoomUsersOptions {
    pub mode: DeleteMode,
    pub room_id: Option<String>,
    pub user_ids: Option<Vec<String>>,
}

impl DeleteRoomUsersOptions {
    pub fn logical_deleted(mut self, deleted: i64) -> Self {
        self.mode = DeleteMode::Logical(deleted);
        self
    }

    pub fn room_id(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    pub fn user_ids<I, S>(mut self, user_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.user_ids = Some(user_ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn validate(&self) -> StoreResult<()> {
        require(
            self.room_id.is_some() || self.user_ids.as_ref().is_some_and(|ids| !ids.is_empty()),
            "deleting room users",
            "roomId or userIds",
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct SelectSubscriptionsOptions {
    pub room_id: Option<String>,
    pub user_id: Option<String>,
    pub platform: Option<Platform>,
}

impl SelectSubscriptionsOptions {
    pub fn room_id(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn validate(&self) -> StoreResult<()> {
        require(
            self.room_id.is_some() || self.user_id.is_some() || self.platform.is_some(),
            "getting subscriptions",
            "roomId or userId or platform",
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeleteSubscriptionsOptions {
    pub mode: DeleteMode,
    pub room_id: Option<String>,
    pub user_id: Option<String>,
    pub user_ids: Option<Vec<String>>,
    pub platform: Option<Platform>,
    pub ids: Option<Vec<i64>>,
}

impl DeleteSubscriptionsOptions {
    pub fn logical_deleted(mut self, deleted: i64) -> Self {
        self.mode = DeleteMode::Logical(deleted);
        self
    }

    pub fn room_id(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn user_ids<I, S>(mut self, user_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.user_ids = Some(user_ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Targets subscriptions by row id, as the unsubscribe sweep does.
    pub fn ids(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.ids = Some(ids.into_iter().collect());
        self
    }

    pub fn validate(&self) -> StoreResult<()> {
        require(
            self.room_id.is_some()
                || self.user_id.is_some()
                || self.user_ids.as_ref().is_some_and(|ids| !ids.is_empty())
                || self.platform.is_some()
                || self.ids.as_ref().is_some_and(|ids| !ids.is_empty()),
            "deleting subscriptions",
            "roomId or userId or platform or ids",
        )
    }
}

#[derive(Debug, Clone)]
pub struct PageOptions {
    pub limit: i64,
    pub offset: i64,
    pub order: Order,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self { limit: 10, offset: 0, order: Order::Asc }
    }
}

impl PageOptions {
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.limit <= 0 || self.offset < 0 {
            return Err(StoreError::Validation(format!(
                "limit must be positive and offset non-negative, got limit={} offset={}",
                self.limit, self.offset
            )));
        }
        Ok(())
    }
}

pub type SelectUsersOptions = PageOptions;
pub type SelectRoomsOptions = PageOptions;

#[derive(Debug, Clone, Default)]
pub struct SelectMessagesOptions {
    pub room_id: Option<String>,
    pub roles: Option<Vec<i64>>,
    pub page: PageOptions,
}

impl SelectMessagesOptions {
    pub fn room_id(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    pub fn roles(mut self, roles: impl IntoIterator<Item = i64>) -> Self {
        self.roles = Some(roles.into_iter().collect());
        self
    }

    pub fn page(mut self, page: PageOptions) -> Self {
        self.page = page;
        self
    }

    pub fn validate(&self) -> StoreResult<()> {
        require(self.room_id.is_some(), "getting messages", "roomId")?;
        self.page.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn empty_device_filters_are_rejected() {
        let err = SelectDevicesOptions::default().validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(DeleteDevicesOptions::default().validate().unwrap_err().kind(), ErrorKind::Validation);

        // mode alone is not a filter
        assert!(DeleteDevicesOptions::default().logical_deleted(10).validate().is_err());
        assert!(DeleteDevicesOptions::default().platform(Platform::Ios).validate().is_ok());
    }

    #[test]
    fn later_setters_override_earlier_ones() {
        let opts = SelectDevicesOptions::default()
            .user_id("u1")
            .platform(Platform::Ios)
            .user_id("u2");
        assert_eq!(opts.user_id.as_deref(), Some("u2"));
        assert_eq!(opts.platform, Some(Platform::Ios));

        let opts = DeleteRoomUsersOptions::default().logical_deleted(5).logical_deleted(9);
        assert_eq!(opts.mode, DeleteMode::Logical(9));
    }

    #[test]
    fn empty_user_list_is_not_a_filter() {
        let none: [&str; 0] = [];
        assert!(DeleteRoomUsersOptions::default().user_ids(none).validate().is_err());
        assert!(SelectRoomUsersOptions::default().user_ids(["u1"]).validate().is_ok());
    }

    #[test]
    fn messages_require_room_and_sane_paging() {
        assert!(SelectMessagesOptions::default().validate().is_err());
        assert!(SelectMessagesOptions::default().room_id("r1").validate().is_ok());
        let bad = SelectMessagesOptions::default()
            .room_id("r1")
            .page(PageOptions::default().limit(0));
        assert!(bad.validate().is_err());
    }
}
