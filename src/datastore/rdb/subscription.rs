use async_trait::async_trait;
use sqlx::{Any, AnyConnection, QueryBuilder};
use tracing::instrument;

use super::RdbBacked;
use crate::{
    datastore::{
        options::{DeleteMode, DeleteSubscriptionsOptions, SelectSubscriptionsOptions},
        query::Filter,
        SubscriptionStore,
    },
    error::SqlxResultExt,
    model::{now, Platform, Subscription},
    Ctx, StoreResult,
};

const COLUMNS: &str =
    "id, room_id, user_id, platform, notification_subscription_id, created, modified, deleted";

fn push_select_filter(f: &mut Filter<'_, '_>, opts: &SelectSubscriptionsOptions) {
    f.eq_opt("room_id", opts.room_id.clone())
        .eq_opt("user_id", opts.user_id.clone())
        .eq_opt("platform", opts.platform.map(i64::from));
}

fn push_delete_filter(f: &mut Filter<'_, '_>, opts: &DeleteSubscriptionsOptions) {
    f.eq_opt("room_id", opts.room_id.clone())
        .eq_opt("user_id", opts.user_id.clone())
        .eq_opt("platform", opts.platform.map(i64::from));
    if let Some(user_ids) = &opts.user_ids {
        f.is_in("user_id", user_ids.clone());
    }
    if let Some(ids) = &opts.ids {
        f.is_in("id", ids.clone());
    }
}

/// Stamps every active subscription matching `opts` with `deleted` on the
/// given connection and returns the affected rows as they are afterwards.
///
/// Used inside cascades, so it never opens its own transaction.
pub(super) async fn invalidate_in(
    conn: &mut AnyConnection,
    opts: &DeleteSubscriptionsOptions,
    deleted: i64,
) -> StoreResult<Vec<Subscription>> {
    opts.validate()?;

    let mut qb = QueryBuilder::<Any>::new(format!("SELECT {COLUMNS} FROM subscription"));
    let mut f = Filter::new(&mut qb);
    push_delete_filter(&mut f, opts);
    f.active();
    qb.push(" ORDER BY id");
    let mut subscriptions: Vec<Subscription> = qb
        .build_query_as()
        .fetch_all(&mut *conn)
        .await
        .or_backend("An error occurred while getting subscriptions")?;

    if subscriptions.is_empty() {
        return Ok(subscriptions);
    }

    let mut qb = QueryBuilder::<Any>::new("UPDATE subscription SET deleted=");
    qb.push_bind(deleted).push(", modified=").push_bind(deleted);
    Filter::new(&mut qb)
        .is_in("id", subscriptions.iter().map(|s| s.id).collect::<Vec<_>>());
    qb.build()
        .execute(&mut *conn)
        .await
        .or_backend("An error occurred while deleting subscriptions")?;

    for subscription in &mut subscriptions {
        subscription.deleted = deleted;
        subscription.modified = deleted;
    }
    Ok(subscriptions)
}

async fn select(
    rdb: &super::RdbStore,
    ctx: &Ctx,
    opts: &SelectSubscriptionsOptions,
    deleted: bool,
) -> StoreResult<Vec<Subscription>> {
    let mut qb = QueryBuilder::<Any>::new(format!("SELECT {COLUMNS} FROM subscription"));
    let mut f = Filter::new(&mut qb);
    push_select_filter(&mut f, opts);
    if deleted {
        f.raw("deleted<>0");
    } else {
        f.active();
    }
    qb.push(" ORDER BY id");

    ctx.run(async {
        qb.build_query_as()
            .fetch_all(rdb.replica())
            .await
            .or_backend("An error occurred while getting subscriptions")
    })
    .await
}

#[async_trait]
impl<T: RdbBacked> SubscriptionStore for T {
    #[instrument(target = "datastore", skip_all, err)]
    async fn insert_subscription(&self, ctx: &Ctx, subscription: &Subscription) -> StoreResult<Subscription> {
        let mut subscription = subscription.clone();
        let now = now();
        if subscription.created == 0 {
            subscription.created = now;
        }
        subscription.modified = now;

        let res = ctx
            .run(async {
                sqlx::query(
                    "INSERT INTO subscription (room_id, user_id, platform, notification_subscription_id, created, modified, deleted) VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&subscription.room_id)
                .bind(&subscription.user_id)
                .bind(i64::from(subscription.platform))
                .bind(&subscription.notification_subscription_id)
                .bind(subscription.created)
                .bind(subscription.modified)
                .bind(subscription.deleted)
                .execute(self.rdb().master())
                .await
                .or_backend("An error occurred while inserting subscription")
            })
            .await?;

        if let Some(id) = res.last_insert_id() {
            subscription.id = id;
        }
        Ok(subscription)
    }

    #[instrument(target = "datastore", skip_all, err)]
    async fn select_subscription(
        &self,
        ctx: &Ctx,
        room_id: &str,
        user_id: &str,
        platform: Platform,
    ) -> StoreResult<Option<Subscription>> {
        let opts = SelectSubscriptionsOptions::default()
            .room_id(room_id)
            .user_id(user_id)
            .platform(platform);
        Ok(select(self.rdb(), ctx, &opts, false).await?.into_iter().next())
    }

    #[instrument(target = "datastore", skip_all, err)]
    async fn select_subscriptions(&self, ctx: &Ctx, opts: &SelectSubscriptionsOptions) -> StoreResult<Vec<Subscription>> {
        opts.validate()?;
        select(self.rdb(), ctx, opts, false).await
    }

    #[instrument(target = "datastore", skip_all, err)]
    async fn select_deleted_subscriptions(
        &self,
        ctx: &Ctx,
        opts: &SelectSubscriptionsOptions,
    ) -> StoreResult<Vec<Subscription>> {
        select(self.rdb(), ctx, opts, true).await
    }

    #[instrument(target = "datastore", skip_all, err)]
    async fn delete_subscriptions(&self, ctx: &Ctx, opts: &DeleteSubscriptionsOptions) -> StoreResult<u64> {
        opts.validate()?;

        let mut qb = match opts.mode {
            DeleteMode::Logical(deleted) => {
                let mut qb = QueryBuilder::<Any>::new("UPDATE subscription SET deleted=");
                qb.push_bind(deleted).push(", modified=").push_bind(deleted);
                qb
            }
            DeleteMode::Physical => QueryBuilder::<Any>::new("DELETE FROM subscription"),
        };
        let mut f = Filter::new(&mut qb);
        push_delete_filter(&mut f, opts);
        if let DeleteMode::Logical(_) = opts.mode {
            f.active();
        }

        let res = ctx
            .run(async {
                qb.build()
                    .execute(self.rdb().master())
                    .await
                    .or_backend("An error occurred while deleting subscriptions")
            })
            .await?;
        Ok(res.rows_affected())
    }
}
