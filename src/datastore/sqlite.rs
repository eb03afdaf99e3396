use async_trait::async_trait;
use sqlx::any::AnyPoolOptions;
use tracing::info;

use super::{
    rdb::{Dialect, RdbBacked, RdbStore},
    Provider,
};
use crate::{config::{BackendKind, DatastoreConfig}, Ctx, StoreError, StoreResult};

/// Embedded single-file backend. No replica; one pooled connection so writes
/// never contend for the file lock.
#[derive(Debug, Clone)]
pub struct SqliteProvider {
    rdb: RdbStore,
}

impl SqliteProvider {
    pub async fn connect(cfg: &DatastoreConfig) -> StoreResult<Self> {
        sqlx::any::install_default_drivers();

        let url = match cfg.sqlite_path.as_str() {
            ":memory:" => "sqlite::memory:".to_owned(),
            path => format!("sqlite://{path}?mode=rwc"),
        };
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .map_err(|err| StoreError::backend(format!("An error occurred while opening {}", cfg.sqlite_path), err))?;

        info!(target: "datastore", path = %cfg.sqlite_path, "sqlite datastore opened");
        Ok(Self { rdb: RdbStore::new(pool, None, Dialect::Sqlite) })
    }
}

impl RdbBacked for SqliteProvider {
    fn rdb(&self) -> &RdbStore {
        &self.rdb
    }
}

#[async_trait]
impl Provider for SqliteProvider {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn init(&self, ctx: &Ctx) -> StoreResult<()> {
        self.rdb.create_tables(ctx).await
    }

    async fn drop_database(&self, ctx: &Ctx) -> StoreResult<()> {
        self.rdb.drop_tables(ctx).await
    }

    async fn close(&self) {
        self.rdb.close().await;
    }
}
