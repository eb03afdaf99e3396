use async_trait::async_trait;

use super::{
    mysql::{self, Tls},
    rdb::{RdbBacked, RdbStore},
    Provider,
};
use crate::{
    config::{BackendKind, DatastoreConfig},
    Ctx, StoreError, StoreResult,
};

/// Managed MySQL. Same schema and statements as [`super::MysqlProvider`], but
/// every connection is mutually authenticated with the configured CA and
/// client certificate.
#[derive(Debug, Clone)]
pub struct GcpSqlProvider {
    rdb: RdbStore,
}

fn required<'a>(value: &'a Option<String>, name: &str) -> StoreResult<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| StoreError::Config(format!("gcpSql requires {name}")))
}

impl GcpSqlProvider {
    pub async fn connect(cfg: &DatastoreConfig) -> StoreResult<Self> {
        let tls = Tls {
            mode: "VERIFY_CA",
            server_ca: Some(required(&cfg.server_ca, "serverCa")?),
            client_cert: Some(required(&cfg.client_cert, "clientCert")?),
            client_key: Some(required(&cfg.client_key, "clientKey")?),
        };
        let rdb = mysql::open(cfg, &tls).await?;
        Ok(Self { rdb })
    }
}

impl RdbBacked for GcpSqlProvider {
    fn rdb(&self) -> &RdbStore {
        &self.rdb
    }
}

#[async_trait]
impl Provider for GcpSqlProvider {
    fn kind(&self) -> BackendKind {
        BackendKind::GcpSql
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[tokio::test]
    async fn missing_certificates_fail_before_connecting() {
        let cfg = DatastoreConfig {
            provider: BackendKind::GcpSql,
            server_ca: Some("/etc/ca.pem".into()),
            ..Default::default()
        };
        let err = GcpSqlProvider::connect(&cfg).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("clientCert"));
    }
}
