use std::{fmt, str::FromStr, time::Duration};

use serde::Deserialize;

use crate::{StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum BackendKind {
    #[serde(rename = "sqlite")]
    Sqlite,
    #[serde(rename = "mysql")]
    Mysql,
    #[serde(rename = "gcpSql")]
    GcpSql,
}

impl FromStr for BackendKind {
    type Err = StoreError;

    fn from_str(s: &str) -> StoreResult<Self> {
        use BackendKind::*;
        match s {
            "sqlite" => Ok(Sqlite),
            "mysql" => Ok(Mysql),
            "gcpSql" => Ok(GcpSql),
            _ => Err(StoreError::Config(format!("unknown datastore provider {s:?}"))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use BackendKind::*;
        f.write_str(match self {
            Sqlite => "sqlite",
            Mysql => "mysql",
            GcpSql => "gcpSql",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatastoreConfig {
    pub provider: BackendKind,
    pub sqlite_path: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub master: Endpoint,
    pub replica: Option<Endpoint>,
    pub max_open_connection: u32,
    pub max_idle_connection: u32,
    pub use_ssl: bool,
    pub server_ca: Option<String>,
    pub client_cert: Option<String>,
    pub client_key: Option<String>,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            provider: BackendKind::Sqlite,
            sqlite_path: "swagchat.db".to_owned(),
            user: String::new(),
            password: String::new(),
            database: "swagchat".to_owned(),
            master: Endpoint { host: "127.0.0.1".to_owned(), port: 3306 },
            replica: None,
            max_open_connection: 10,
            max_idle_connection: 10,
            use_ssl: false,
            server_ca: None,
            client_cert: None,
            client_key: None,
        }
    }
}

impl DatastoreConfig {
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            provider: BackendKind::Sqlite,
            sqlite_path: path.into(),
            ..Default::default()
        }
    }

    /// Reads `DATASTORE_*` variables, falling back to defaults for anything unset.
    pub fn from_env() -> StoreResult<Self> {
        let mut cfg = Self::default();

        if let Some(provider) = var("DATASTORE_PROVIDER") {
            cfg.provider = provider.parse()?;
        }
        if let Some(path) = var("DATASTORE_SQLITE_PATH") {
            cfg.sqlite_path = path;
        }
        if let Some(user) = var("DATASTORE_USER") {
            cfg.user = user;
        }
        if let Some(password) = var("DATASTORE_PASSWORD") {
            cfg.password = password;
        }
        if let Some(database) = var("DATASTORE_DATABASE") {
            cfg.database = database;
        }
        if let Some(host) = var("DATASTORE_MASTER_HOST") {
            cfg.master.host = host;
        }
        if let Some(port) = parsed("DATASTORE_MASTER_PORT")? {
            cfg.master.port = port;
        }
        if let Some(host) = var("DATASTORE_REPLICA_HOST") {
            cfg.replica = Some(Endpoint {
                host,
                port: parsed("DATASTORE_REPLICA_PORT")?.unwrap_or(cfg.master.port),
            });
        }
        if let Some(n) = parsed("DATASTORE_MAX_OPEN_CONNECTION")? {
            cfg.max_open_connection = n;
        }
        if let Some(n) = parsed("DATASTORE_MAX_IDLE_CONNECTION")? {
            cfg.max_idle_connection = n;
        }
        if let Some(use_ssl) = parsed("DATASTORE_USE_SSL")? {
            cfg.use_ssl = use_ssl;
        }
        cfg.server_ca = var("DATASTORE_SERVER_CA");
        cfg.client_cert = var("DATASTORE_CLIENT_CERT");
        cfg.client_key = var("DATASTORE_CLIENT_KEY");

        Ok(cfg)
    }

    /// Idle connections above `max_idle_connection` are reaped after this long.
    pub(crate) fn idle_timeout(&self) -> Option<Duration> {
        (self.max_idle_connection < self.max_open_connection).then(|| Duration::from_secs(60))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", tag = "provider")]
pub enum PushConfig {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "http")]
    Http { endpoint: String, application: String },
}

impl PushConfig {
    pub fn from_env() -> StoreResult<Self> {
        match var("PUSH_PROVIDER").as_deref() {
            None | Some("none") => Ok(Self::None),
            Some("http") => Ok(Self::Http {
                endpoint: var("PUSH_ENDPOINT")
                    .ok_or_else(|| StoreError::Config("expected PUSH_ENDPOINT".into()))?,
                application: var("PUSH_APPLICATION").unwrap_or_default(),
            }),
            Some(other) => Err(StoreError::Config(format!("unknown push provider {other:?}"))),
        }
    }
}

fn var(key: &str) -> Option<String> {
    dotenv::var(key).ok().filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(key: &str) -> StoreResult<Option<T>> {
    var(key)
        .map(|v| {
            v.parse()
                .map_err(|_| StoreError::Config(format!("expected {key} to be parsable, got {v:?}")))
        })
        .transpose()
}
