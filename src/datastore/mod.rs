//! Storage provider abstraction.
//!
//! Callers hold an `Arc<dyn Provider>` picked once at startup by [`connect`].
//! Every backend shares the relational executor in [`rdb`]; the backends
//! differ only in how their pools are opened and which SQL dialect their
//! schema is written in.

mod async_store;
mod gcp_sql;
mod mysql;
pub mod options;
mod query;
pub mod rdb;
mod sqlite;
pub mod tx;

use std::sync::Arc;

use async_trait::async_trait;

pub use async_store::{AsyncStore, StoreChannel};
pub use gcp_sql::GcpSqlProvider;
pub use mysql::MysqlProvider;
pub use sqlite::SqliteProvider;

use crate::{
    config::{BackendKind, DatastoreConfig},
    model::{CascadeOutcome, Device, Message, Platform, Room, RoomUser, Subscription, User},
    Ctx, StoreResult,
};
use options::*;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, ctx: &Ctx, user: &User) -> StoreResult<User>;
    /// Active users only; `None` when absent.
    async fn select_user(&self, ctx: &Ctx, user_id: &str) -> StoreResult<Option<User>>;
    async fn select_users(&self, ctx: &Ctx, opts: &SelectUsersOptions) -> StoreResult<Vec<User>>;
    /// The subset of `user_ids` that exist and are active.
    async fn select_user_ids_of_user(&self, ctx: &Ctx, user_ids: &[String]) -> StoreResult<Vec<String>>;
    /// `None` when no active user matched.
    async fn update_user(&self, ctx: &Ctx, user: &User) -> StoreResult<Option<User>>;
    /// Soft-deletes the user and, in the same transaction, its memberships,
    /// subscriptions and devices.
    async fn delete_user(&self, ctx: &Ctx, user_id: &str) -> StoreResult<CascadeOutcome>;
}

#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Inserts the room and its initial members together.
    async fn insert_room(&self, ctx: &Ctx, room: &Room, members: &[RoomUser]) -> StoreResult<Room>;
    async fn select_room(&self, ctx: &Ctx, room_id: &str) -> StoreResult<Option<Room>>;
    async fn select_rooms(&self, ctx: &Ctx, opts: &SelectRoomsOptions) -> StoreResult<Vec<Room>>;
    async fn update_room(&self, ctx: &Ctx, room: &Room) -> StoreResult<Option<Room>>;
    async fn delete_room(&self, ctx: &Ctx, room_id: &str) -> StoreResult<CascadeOutcome>;
}

#[async_trait]
pub trait RoomUserStore: Send + Sync {
    async fn insert_room_users(&self, ctx: &Ctx, room_users: &[RoomUser]) -> StoreResult<()>;
    /// Makes `members` the complete membership of `room_id`.
    async fn replace_room_users(&self, ctx: &Ctx, room_id: &str, members: &[RoomUser]) -> StoreResult<CascadeOutcome>;
    async fn select_room_user(&self, ctx: &Ctx, room_id: &str, user_id: &str) -> StoreResult<Option<RoomUser>>;
    /// Active rows in insertion order.
    async fn select_room_users(&self, ctx: &Ctx, opts: &SelectRoomUsersOptions) -> StoreResult<Vec<RoomUser>>;
    async fn select_user_ids_of_room_user(&self, ctx: &Ctx, opts: &SelectRoomUsersOptions) -> StoreResult<Vec<String>>;
    async fn update_room_user(&self, ctx: &Ctx, room_user: &RoomUser) -> StoreResult<Option<RoomUser>>;
    async fn delete_room_users(&self, ctx: &Ctx, opts: &DeleteRoomUsersOptions) -> StoreResult<CascadeOutcome>;
    async fn mark_all_as_read(&self, ctx: &Ctx, user_id: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn insert_device(&self, ctx: &Ctx, device: &Device) -> StoreResult<Device>;
    async fn select_device(&self, ctx: &Ctx, user_id: &str, platform: Platform) -> StoreResult<Option<Device>>;
    async fn select_devices(&self, ctx: &Ctx, opts: &SelectDevicesOptions) -> StoreResult<Vec<Device>>;
    /// Invalidates the (user, platform) subscriptions and writes the new
    /// token/endpoint atomically. Returns the stored row with what the update
    /// invalidated, or `None` when there is no such device.
    async fn update_device(&self, ctx: &Ctx, device: &Device) -> StoreResult<Option<(Device, CascadeOutcome)>>;
    async fn delete_devices(&self, ctx: &Ctx, opts: &DeleteDevicesOptions) -> StoreResult<CascadeOutcome>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn insert_subscription(&self, ctx: &Ctx, subscription: &Subscription) -> StoreResult<Subscription>;
    async fn select_subscription(
        &self,
        ctx: &Ctx,
        room_id: &str,
        user_id: &str,
        platform: Platform,
    ) -> StoreResult<Option<Subscription>>;
    async fn select_subscriptions(&self, ctx: &Ctx, opts: &SelectSubscriptionsOptions) -> StoreResult<Vec<Subscription>>;
    /// Logically deleted rows still waiting for the push provider to forget them.
    /// An empty filter returns all of them.
    async fn select_deleted_subscriptions(
        &self,
        ctx: &Ctx,
        opts: &SelectSubscriptionsOptions,
    ) -> StoreResult<Vec<Subscription>>;
    async fn delete_subscriptions(&self, ctx: &Ctx, opts: &DeleteSubscriptionsOptions) -> StoreResult<u64>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Inserts the message, refreshes the room summary and bumps the other
    /// members' unread counters in one transaction.
    async fn insert_message(&self, ctx: &Ctx, message: &Message) -> StoreResult<Message>;
    async fn select_message(&self, ctx: &Ctx, message_id: &str) -> StoreResult<Option<Message>>;
    /// A page of messages plus the total count for the filter.
    async fn select_messages(&self, ctx: &Ctx, opts: &SelectMessagesOptions) -> StoreResult<(Vec<Message>, i64)>;
    async fn update_message(&self, ctx: &Ctx, message: &Message) -> StoreResult<Option<Message>>;
    async fn delete_message(&self, ctx: &Ctx, message_id: &str) -> StoreResult<()>;
}

/// The capability interface every backend presents.
#[async_trait]
pub trait Provider:
    UserStore + RoomStore + RoomUserStore + DeviceStore + SubscriptionStore + MessageStore + Send + Sync
{
    fn kind(&self) -> BackendKind;

    /// Creates every table if it does not exist yet.
    async fn init(&self, ctx: &Ctx) -> StoreResult<()>;

    /// Drops every table. Test harnesses only.
    async fn drop_database(&self, ctx: &Ctx) -> StoreResult<()>;

    async fn close(&self);
}

/// Opens the backend named by `cfg`. Called once per process.
pub async fn connect(cfg: &DatastoreConfig) -> StoreResult<Arc<dyn Provider>> {
    sqlx::any::install_default_drivers();
    tracing::info!(target: "datastore", provider = %cfg.provider, "connecting datastore");

    Ok(match cfg.provider {
        BackendKind::Sqlite => Arc::new(SqliteProvider::connect(cfg).await?),
        BackendKind::Mysql => Arc::new(MysqlProvider::connect(cfg).await?),
        BackendKind::GcpSql => Arc::new(GcpSqlProvider::connect(cfg).await?),
    })
}
