//! Relational executor shared by every backend.
//!
//! The per-entity modules implement the store traits once for anything that
//! is [`RdbBacked`]; a backend only decides how its pools are opened and which
//! [`Dialect`] its DDL is written in.

mod device;
mod message;
mod room;
mod room_user;
mod subscription;
mod user;

use sqlx::AnyPool;
use tracing::instrument;

use crate::{error::SqlxResultExt, Ctx, StoreResult};

pub(crate) const TABLE_USER: &str = "user";
pub(crate) const TABLE_ROOM: &str = "room";
pub(crate) const TABLE_ROOM_USER: &str = "room_user";
pub(crate) const TABLE_DEVICE: &str = "device";
pub(crate) const TABLE_SUBSCRIPTION: &str = "subscription";
pub(crate) const TABLE_MESSAGE: &str = "message";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Mysql,
}

impl Dialect {
    fn auto_id(self) -> &'static str {
        match self {
            Dialect::Sqlite => "id INTEGER PRIMARY KEY AUTOINCREMENT",
            Dialect::Mysql => "id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY",
        }
    }

    fn table_options(self) -> &'static str {
        match self {
            Dialect::Sqlite => "",
            Dialect::Mysql => " ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
        }
    }

    /// `CREATE TABLE IF NOT EXISTS` for every table, so running them twice is harmless.
    pub fn create_statements(self) -> Vec<String> {
        let id = self.auto_id();
        let opts = self.table_options();
        vec![
            format!(
                "CREATE TABLE IF NOT EXISTS {TABLE_USER} (
                    user_id VARCHAR(255) NOT NULL PRIMARY KEY,
                    name VARCHAR(255) NOT NULL,
                    picture_url VARCHAR(255) NULL,
                    information_url VARCHAR(255) NULL,
                    meta_data TEXT NOT NULL,
                    is_public BIGINT NOT NULL DEFAULT 0,
                    can_block BIGINT NOT NULL DEFAULT 1,
                    lang VARCHAR(16) NOT NULL,
                    created BIGINT NOT NULL,
                    modified BIGINT NOT NULL,
                    deleted BIGINT NOT NULL DEFAULT 0
                ){opts}"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {TABLE_ROOM} (
                    room_id VARCHAR(255) NOT NULL PRIMARY KEY,
                    user_id VARCHAR(255) NOT NULL,
                    name VARCHAR(255) NOT NULL,
                    picture_url VARCHAR(255) NULL,
                    information_url VARCHAR(255) NULL,
                    meta_data TEXT NOT NULL,
                    room_type BIGINT NOT NULL,
                    notification_topic_id VARCHAR(255) NULL,
                    last_message TEXT NOT NULL,
                    last_message_updated BIGINT NOT NULL DEFAULT 0,
                    created BIGINT NOT NULL,
                    modified BIGINT NOT NULL,
                    deleted BIGINT NOT NULL DEFAULT 0
                ){opts}"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {TABLE_ROOM_USER} (
                    {id},
                    room_id VARCHAR(255) NOT NULL,
                    user_id VARCHAR(255) NOT NULL,
                    unread_count BIGINT NOT NULL DEFAULT 0,
                    role BIGINT NOT NULL,
                    display BIGINT NOT NULL DEFAULT 1,
                    created BIGINT NOT NULL,
                    modified BIGINT NOT NULL,
                    deleted BIGINT NOT NULL DEFAULT 0,
                    UNIQUE (room_id, user_id)
                ){opts}"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {TABLE_DEVICE} (
                    user_id VARCHAR(255) NOT NULL,
                    platform BIGINT NOT NULL,
                    token VARCHAR(255) NOT NULL,
                    notification_device_id VARCHAR(255) NULL,
                    created BIGINT NOT NULL,
                    modified BIGINT NOT NULL,
                    deleted BIGINT NOT NULL DEFAULT 0,
                    PRIMARY KEY (user_id, platform),
                    UNIQUE (token),
                    UNIQUE (notification_device_id)
                ){opts}"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {TABLE_SUBSCRIPTION} (
                    {id},
                    room_id VARCHAR(255) NOT NULL,
                    user_id VARCHAR(255) NOT NULL,
                    platform BIGINT NOT NULL,
                    notification_subscription_id VARCHAR(255) NULL,
                    created BIGINT NOT NULL,
                    modified BIGINT NOT NULL,
                    deleted BIGINT NOT NULL DEFAULT 0
                ){opts}"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {TABLE_MESSAGE} (
                    {id},
                    message_id VARCHAR(255) NOT NULL,
                    room_id VARCHAR(255) NOT NULL,
                    user_id VARCHAR(255) NOT NULL,
                    message_type VARCHAR(32) NOT NULL,
                    payload TEXT NOT NULL,
                    role BIGINT NOT NULL,
                    created BIGINT NOT NULL,
                    modified BIGINT NOT NULL,
                    deleted BIGINT NOT NULL DEFAULT 0,
                    UNIQUE (message_id)
                ){opts}"
            ),
        ]
    }

    pub fn drop_statements(self) -> Vec<String> {
        [
            TABLE_MESSAGE,
            TABLE_SUBSCRIPTION,
            TABLE_DEVICE,
            TABLE_ROOM_USER,
            TABLE_ROOM,
            TABLE_USER,
        ]
        .iter()
        .map(|table| format!("DROP TABLE IF EXISTS {table}"))
        .collect()
    }
}

/// Pool handles of one backend: writes go to master, reads to the replica
/// when one is configured.
#[derive(Debug, Clone)]
pub struct RdbStore {
    master: AnyPool,
    replica: Option<AnyPool>,
    dialect: Dialect,
}

impl RdbStore {
    pub fn new(master: AnyPool, replica: Option<AnyPool>, dialect: Dialect) -> Self {
        Self { master, replica, dialect }
    }

    pub fn master(&self) -> &AnyPool {
        &self.master
    }

    pub fn replica(&self) -> &AnyPool {
        self.replica.as_ref().unwrap_or(&self.master)
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    #[instrument(target = "datastore", skip_all, err)]
    pub async fn create_tables(&self, ctx: &Ctx) -> StoreResult<()> {
        for stmt in self.dialect.create_statements() {
            ctx.run(async {
                sqlx::query(&stmt)
                    .execute(&self.master)
                    .await
                    .or_backend("An error occurred while creating table")
            })
            .await?;
        }
        Ok(())
    }

    #[instrument(target = "datastore", skip_all, err)]
    pub async fn drop_tables(&self, ctx: &Ctx) -> StoreResult<()> {
        for stmt in self.dialect.drop_statements() {
            ctx.run(async {
                sqlx::query(&stmt)
                    .execute(&self.master)
                    .await
                    .or_backend("An error occurred while dropping table")
            })
            .await?;
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.master.close().await;
        if let Some(replica) = &self.replica {
            replica.close().await;
        }
    }
}

/// Implemented by every backend; gives it all the entity stores.
pub trait RdbBacked: Send + Sync {
    fn rdb(&self) -> &RdbStore;
}

impl RdbBacked for RdbStore {
    fn rdb(&self) -> &RdbStore {
        self
    }
}
