use async_trait::async_trait;
use reqwest::Url;
use sqlx::{any::AnyPoolOptions, AnyPool};
use tracing::info;

use super::{
    rdb::{Dialect, RdbBacked, RdbStore},
    Provider,
};
use crate::{
    config::{BackendKind, DatastoreConfig, Endpoint},
    Ctx, StoreError, StoreResult,
};

/// Client TLS material handed to the mysql driver as connection parameters.
#[derive(Debug, Clone, Default)]
pub(super) struct Tls<'a> {
    pub(super) mode: &'static str,
    pub(super) server_ca: Option<&'a str>,
    pub(super) client_cert: Option<&'a str>,
    pub(super) client_key: Option<&'a str>,
}

impl<'a> Tls<'a> {
    fn from_config(cfg: &'a DatastoreConfig) -> Self {
        if !cfg.use_ssl {
            return Self { mode: "DISABLED", ..Default::default() };
        }
        Self {
            mode: if cfg.server_ca.is_some() { "VERIFY_CA" } else { "REQUIRED" },
            server_ca: cfg.server_ca.as_deref(),
            client_cert: cfg.client_cert.as_deref(),
            client_key: cfg.client_key.as_deref(),
        }
    }
}

pub(super) fn mysql_url(cfg: &DatastoreConfig, endpoint: &Endpoint, tls: &Tls) -> StoreResult<Url> {
    let mut url = Url::parse(&format!("mysql://{}:{}/{}", endpoint.host, endpoint.port, cfg.database))
        .map_err(|err| StoreError::Config(format!("invalid datastore address {}: {err}", endpoint.host)))?;
    url.set_username(&cfg.user)
        .map_err(|()| StoreError::Config("datastore user cannot be set on the url".into()))?;
    if !cfg.password.is_empty() {
        url.set_password(Some(&cfg.password))
            .map_err(|()| StoreError::Config("datastore password cannot be set on the url".into()))?;
    }

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("ssl-mode", tls.mode);
        for (key, value) in [
            ("ssl-ca", tls.server_ca),
            ("ssl-cert", tls.client_cert),
            ("ssl-key", tls.client_key),
        ] {
            if let Some(value) = value {
                query.append_pair(key, value);
            }
        }
    }
    Ok(url)
}

async fn open_pool(cfg: &DatastoreConfig, endpoint: &Endpoint, tls: &Tls<'_>) -> StoreResult<AnyPool> {
    let url = mysql_url(cfg, endpoint, tls)?;
    AnyPoolOptions::new()
        .max_connections(cfg.max_open_connection.max(1))
        .idle_timeout(cfg.idle_timeout())
        .connect(url.as_str())
        .await
        .map_err(|err| {
            StoreError::backend(
                format!("An error occurred while connecting to {}:{}", endpoint.host, endpoint.port),
                err,
            )
        })
}

/// Opens the master pool and, when configured, the replica pool.
pub(super) async fn open(cfg: &DatastoreConfig, tls: &Tls<'_>) -> StoreResult<RdbStore> {
    sqlx::any::install_default_drivers();

    let master = open_pool(cfg, &cfg.master, tls).await?;
    let replica = match &cfg.replica {
        Some(endpoint) => Some(open_pool(cfg, endpoint, tls).await?),
        None => None,
    };

    info!(
        target: "datastore",
        master = %cfg.master.host,
        replica = cfg.replica.as_ref().map(|r| r.host.as_str()),
        ssl_mode = tls.mode,
        "mysql datastore connected"
    );
    Ok(RdbStore::new(master, replica, Dialect::Mysql))
}

/// Self-hosted MySQL cluster: writes on master, reads on the replica.
#[derive(Debug, Clone)]
pub struct MysqlProvider {
    rdb: RdbStore,
}

impl MysqlProvider {
    pub async fn connect(cfg: &DatastoreConfig) -> StoreResult<Self> {
        let rdb = open(cfg, &Tls::from_config(cfg)).await?;
        Ok(Self { rdb })
    }
}

impl RdbBacked for MysqlProvider {
    fn rdb(&self) -> &RdbStore {
        &self.rdb
    }
}

#[async_trait]
impl Provider for MysqlProvider {
    fn kind(&self) -> BackendKind {
        BackendKind::Mysql
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
