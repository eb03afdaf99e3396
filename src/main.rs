use std::time::Duration;

use anyhow::Context;
use swagstore::{
    notification::{provider_from_config, Fanout},
    Ctx, DatastoreConfig, PushConfig,
};
use tracing_subscriber::EnvFilter;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = DatastoreConfig::from_env().context("datastore config")?;
    let push_cfg = PushConfig::from_env().context("push config")?;

    let ctx = Ctx::background();
    let store = swagstore::connect(&cfg).await.context("connect datastore")?;
    store
        .init(&ctx.child().with_timeout(Duration::from_secs(30)))
        .await
        .context("create tables")?;
    tracing::info!(provider = %store.kind(), "datastore ready");

    let fanout = Fanout::new(store.clone(), provider_from_config(&push_cfg));
    let sweeper = fanout.spawn_sweeper(SWEEP_INTERVAL, ctx.child());

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    tracing::info!("shutting down");

    ctx.cancel();
    sweeper.await.context("join sweeper")?;
    store.close().await;
    Ok(())
}
