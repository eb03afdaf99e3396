use async_trait::async_trait;
use sqlx::{Any, AnyConnection, QueryBuilder};
use tracing::instrument;

use super::{subscription::invalidate_in, RdbBacked};
use crate::{
    datastore::{
        options::{DeleteDevicesOptions, DeleteMode, DeleteSubscriptionsOptions, SelectDevicesOptions},
        query::Filter,
        tx::transaction,
        DeviceStore,
    },
    error::SqlxResultExt,
    model::{now, CascadeOutcome, Device, Platform, Subscription},
    Ctx, StoreResult,
};

const COLUMNS: &str = "user_id, platform, token, notification_device_id, created, modified, deleted";

fn select_builder(user_id: Option<String>, platform: Option<Platform>, token: Option<String>) -> QueryBuilder<'static, Any> {
    let mut qb = QueryBuilder::<Any>::new(format!("SELECT {COLUMNS} FROM device"));
    Filter::new(&mut qb)
        .eq_opt("user_id", user_id)
        .eq_opt("platform", platform.map(i64::from))
        .eq_opt("token", token)
        .active();
    qb
}

/// Logically deletes the subscriptions hanging off one device.
async fn invalidate_device_subscriptions(
    conn: &mut AnyConnection,
    device: &Device,
    deleted: i64,
) -> StoreResult<Vec<Subscription>> {
    let opts = DeleteSubscriptionsOptions::default()
        .user_id(device.user_id.clone())
        .platform(device.platform);
    invalidate_in(conn, &opts, deleted)
        .await
        .map_err(|err| err.cascade("An error occurred while invalidating subscriptions of device"))
}

#[async_trait]
impl<T: RdbBacked> DeviceStore for T {
    #[instrument(target = "datastore", skip_all, err)]
    async fn insert_device(&self, ctx: &Ctx, device: &Device) -> StoreResult<Device> {
        let mut device = device.clone();
        let now = now();
        if device.created == 0 {
            device.created = now;
        }
        device.modified = now;

        transaction(ctx, self.rdb().master(), "insert device", move |conn| {
            Box::pin(async move {
                // logically deleted rows still hold the unique keys
                sqlx::query(
                    "DELETE FROM device WHERE deleted<>0 AND ((user_id=? AND platform=?) OR token=? OR notification_device_id=?)",
                )
                .bind(&device.user_id)
                .bind(i64::from(device.platform))
                .bind(&device.token)
                .bind(&device.notification_device_id)
                .execute(&mut *conn)
                .await
                .or_backend("An error occurred while inserting device")?;

                sqlx::query(
                    "INSERT INTO device (user_id, platform, token, notification_device_id, created, modified, deleted) VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&device.user_id)
                .bind(i64::from(device.platform))
                .bind(&device.token)
                .bind(&device.notification_device_id)
                .bind(device.created)
                .bind(device.modified)
                .bind(device.deleted)
                .execute(&mut *conn)
                .await
                .or_backend("An error occurred while inserting device")?;

                Ok(device)
            })
        })
        .await
    }

    #[instrument(target = "datastore", skip_all, err)]
    async fn select_device(&self, ctx: &Ctx, user_id: &str, platform: Platform) -> StoreResult<Option<Device>> {
        let mut qb = select_builder(Some(user_id.to_owned()), Some(platform), None);
        ctx.run(async {
            qb.build_query_as()
                .fetch_optional(self.rdb().replica())
                .await
                .or_backend("An error occurred while getting device")
        })
        .await
    }

    #[instrument(target = "datastore", skip_all, err)]
    async fn select_devices(&self, ctx: &Ctx, opts: &SelectDevicesOptions) -> StoreResult<Vec<Device>> {
        opts.validate()?;

        let mut qb = select_builder(opts.user_id.clone(), opts.platform, opts.token.clone());
        qb.push(" ORDER BY created");
        ctx.run(async {
            qb.build_query_as()
                .fetch_all(self.rdb().replica())
                .await
                .or_backend("An error occurred while getting devices")
        })
        .await
    }

    #[instrument(target = "datastore", skip_all, err)]
    async fn update_device(&self, ctx: &Ctx, device: &Device) -> StoreResult<Option<(Device, CascadeOutcome)>> {
        let mut device = device.clone();

        transaction(ctx, self.rdb().master(), "update device", move |conn| {
            Box::pin(async move {
                let mut qb = select_builder(Some(device.user_id.clone()), Some(device.platform), None);
                let previous: Option<Device> = qb
                    .build_query_as()
                    .fetch_optional(&mut *conn)
                    .await
                    .or_backend("An error occurred while getting device")?;
                let Some(previous) = previous else {
                    return Ok(None);
                };

                let modified = now().max(previous.modified);
                device.created = previous.created;
                device.modified = modified;
                device.deleted = 0;
                let subscriptions = invalidate_device_subscriptions(&mut *conn, &previous, modified).await?;

                sqlx::query(
                    "UPDATE device SET token=?, notification_device_id=?, modified=? WHERE user_id=? AND platform=?",
                )
                .bind(&device.token)
                .bind(&device.notification_device_id)
                .bind(modified)
                .bind(&device.user_id)
                .bind(i64::from(device.platform))
                .execute(&mut *conn)
                .await
                .or_backend("An error occurred while updating device")?;

                // only a replaced endpoint has to be torn down at the push provider
                let devices = if previous.notification_device_id != device.notification_device_id {
                    vec![previous]
                } else {
                    Vec::new()
                };
                Ok(Some((device, CascadeOutcome { devices, subscriptions })))
            })
        })
        .await
    }

    #[instrument(target = "datastore", skip_all, err)]
    async fn delete_devices(&self, ctx: &Ctx, opts: &DeleteDevicesOptions) -> StoreResult<CascadeOutcome> {
        opts.validate()?;
        let opts = opts.clone();

        transaction(ctx, self.rdb().master(), "delete devices", move |conn| {
            Box::pin(async move {
                let mut qb = select_builder(opts.user_id.clone(), opts.platform, opts.token.clone());
                let devices: Vec<Device> = qb
                    .build_query_as()
                    .fetch_all(&mut *conn)
                    .await
                    .or_backend("An error occurred while getting devices")?;

                let deleted = match opts.mode {
                    DeleteMode::Logical(deleted) => deleted,
                    DeleteMode::Physical => now(),
                };
                let mut outcome = CascadeOutcome::default();
                for device in &devices {
                    let subscriptions = invalidate_device_subscriptions(&mut *conn, device, deleted).await?;
                    outcome.subscriptions.extend(subscriptions);
                }

                let mut qb = match opts.mode {
                    DeleteMode::Logical(deleted) => {
                        let mut qb = QueryBuilder::<Any>::new("UPDATE device SET deleted=");
                        qb.push_bind(deleted).push(", modified=").push_bind(deleted);
                        qb
                    }
                    DeleteMode::Physical => QueryBuilder::<Any>::new("DELETE FROM device"),
                };
                let mut f = Filter::new(&mut qb);
                f.eq_opt("user_id", opts.user_id.clone())
                    .eq_opt("platform", opts.platform.map(i64::from))
                    .eq_opt("token", opts.token.clone());
                if let DeleteMode::Logical(_) = opts.mode {
                    f.active();
                }
                qb.build()
                    .execute(&mut *conn)
                    .await
                    .or_backend("An error occurred while deleting devices")?;

                outcome.devices = devices;
                Ok(outcome)
            })
        })
        .await
    }
}

/// Removes every device of a user physically, invalidating their subscriptions first.
pub(super) async fn delete_user_devices_in(
    conn: &mut AnyConnection,
    user_id: &str,
    deleted: i64,
) -> StoreResult<CascadeOutcome> {
    let mut qb = select_builder(Some(user_id.to_owned()), None, None);
    let devices: Vec<Device> = qb
        .build_query_as()
        .fetch_all(&mut *conn)
        .await
        .or_backend("An error occurred while getting devices")?;

    let mut outcome = CascadeOutcome::default();
    for device in &devices {
        outcome
            .subscriptions
            .extend(invalidate_device_subscriptions(&mut *conn, device, deleted).await?);
    }

    sqlx::query("DELETE FROM device WHERE user_id=?")
        .bind(user_id)
        .execute(&mut *conn)
        .await
        .or_backend("An error occurred while deleting devices")?;

    outcome.devices = devices;
    Ok(outcome)
}
