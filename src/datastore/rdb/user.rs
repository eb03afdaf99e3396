use async_trait::async_trait;
use sqlx::{Any, QueryBuilder};
use tracing::instrument;

use super::{device::delete_user_devices_in, room_user::soft_delete_where, subscription::invalidate_in, RdbBacked};
use crate::{
    datastore::{
        options::{DeleteSubscriptionsOptions, SelectUsersOptions},
        query::Filter,
        tx::transaction,
        UserStore,
    },
    error::SqlxResultExt,
    model::{now, CascadeOutcome, User},
    Ctx, StoreResult,
};

const COLUMNS: &str =
    "user_id, name, picture_url, information_url, meta_data, is_public, can_block, lang, created, modified, deleted";

#[async_trait]
impl<T: RdbBacked> UserStore for T {
    #[instrument(target = "datastore", skip_all, fields(user_id = %user.user_id), err)]
    async fn insert_user(&self, ctx: &Ctx, user: &User) -> StoreResult<User> {
        let mut user = user.clone();
        let now = now();
        if user.created == 0 {
            user.created = now;
        }
        user.modified = now;

        ctx.run(async {
            sqlx::query(
                "INSERT INTO user (user_id, name, picture_url, information_url, meta_data, is_public, can_block, lang, created, modified, deleted) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&user.user_id)
            .bind(&user.name)
            .bind(&user.picture_url)
            .bind(&user.information_url)
            .bind(&user.meta_data)
            .bind(user.is_public)
            .bind(user.can_block)
            .bind(&user.lang)
            .bind(user.created)
            .bind(user.modified)
            .bind(user.deleted)
            .execute(self.rdb().master())
            .await
            .or_backend("An error occurred while creating user item")
        })
        .await?;

        Ok(user)
    }

    #[instrument(target = "datastore", skip_all, err)]
    async fn select_user(&self, ctx: &Ctx, user_id: &str) -> StoreResult<Option<User>> {
        let replica = self.rdb().replica();
        ctx.run(async {
            let user: Option<User> = sqlx::query_as(&format!("SELECT {COLUMNS} FROM user WHERE user_id=? AND deleted=0"))
                .bind(user_id)
                .fetch_optional(replica)
                .await
                .or_backend("An error occurred while getting user item")?;
            let Some(mut user) = user else {
                return Ok(None);
            };

            // summed client side: SUM() comes back as DECIMAL on mysql
            let counters: Vec<i64> =
                sqlx::query_scalar("SELECT unread_count FROM room_user WHERE user_id=? AND deleted=0")
                    .bind(user_id)
                    .fetch_all(replica)
                    .await
                    .or_backend("An error occurred while getting user's unread count")?;
            user.unread_count = counters.iter().sum();
            Ok(Some(user))
        })
        .await
    }

    #[instrument(target = "datastore", skip_all, err)]
    async fn select_users(&self, ctx: &Ctx, opts: &SelectUsersOptions) -> StoreResult<Vec<User>> {
        opts.validate()?;

        let mut qb = QueryBuilder::<Any>::new(format!("SELECT {COLUMNS} FROM user"));
        Filter::new(&mut qb).active();
        qb.push(format!(" ORDER BY created {}, user_id {} LIMIT ", opts.order.sql(), opts.order.sql()))
            .push_bind(opts.limit)
            .push(" OFFSET ")
            .push_bind(opts.offset);

        ctx.run(async {
            qb.build_query_as()
                .fetch_all(self.rdb().replica())
                .await
                .or_backend("An error occurred while getting user list")
        })
        .await
    }

    #[instrument(target = "datastore", skip_all, err)]
    async fn select_user_ids_of_user(&self, ctx: &Ctx, user_ids: &[String]) -> StoreResult<Vec<String>> {
        let mut qb = QueryBuilder::<Any>::new("SELECT user_id FROM user");
        Filter::new(&mut qb).is_in("user_id", user_ids.to_vec()).active();
        qb.push(" ORDER BY user_id");

        ctx.run(async {
            qb.build_query_scalar()
                .fetch_all(self.rdb().replica())
                .await
                .or_backend("An error occurred while getting userIds")
        })
        .await
    }

    #[instrument(target = "datastore", skip_all, fields(user_id = %user.user_id), err)]
    async fn update_user(&self, ctx: &Ctx, user: &User) -> StoreResult<Option<User>> {
        let mut user = user.clone();
        user.modified = now().max(user.modified);

        let res = ctx
            .run(async {
                sqlx::query(
                    "UPDATE user SET name=?, picture_url=?, information_url=?, meta_data=?, is_public=?, can_block=?, lang=?, modified=? WHERE user_id=? AND deleted=0",
                )
                .bind(&user.name)
                .bind(&user.picture_url)
                .bind(&user.information_url)
                .bind(&user.meta_data)
                .bind(user.is_public)
                .bind(user.can_block)
                .bind(&user.lang)
                .bind(user.modified)
                .bind(&user.user_id)
                .execute(self.rdb().master())
                .await
                .or_backend("An error occurred while updating user item")
            })
            .await?;

        Ok((res.rows_affected() > 0).then_some(user))
    }

    #[instrument(target = "datastore", skip_all, fields(user_id = %user_id), err)]
    async fn delete_user(&self, ctx: &Ctx, user_id: &str) -> StoreResult<CascadeOutcome> {
        let user_id = user_id.to_owned();

        transaction(ctx, self.rdb().master(), "delete user", move |conn| {
            Box::pin(async move {
                let deleted = now();
                sqlx::query("UPDATE user SET deleted=?, modified=? WHERE user_id=? AND deleted=0")
                    .bind(deleted)
                    .bind(deleted)
                    .bind(&user_id)
                    .execute(&mut *conn)
                    .await
                    .or_backend("An error occurred while deleting user item")?;

                soft_delete_where(&mut *conn, "user_id", &user_id, deleted)
                    .await
                    .map_err(|err| err.cascade("An error occurred while deleting user's room items"))?;

                let mut outcome = CascadeOutcome::default();
                let opts = DeleteSubscriptionsOptions::default().user_id(user_id.clone());
                outcome.subscriptions = invalidate_in(&mut *conn, &opts, deleted)
                    .await
                    .map_err(|err| err.cascade("An error occurred while deleting user's subscriptions"))?;

                let devices = delete_user_devices_in(&mut *conn, &user_id, deleted)
                    .await
                    .map_err(|err| err.cascade("An error occurred while deleting user's devices"))?;
                outcome.merge(devices);

                Ok(outcome)
            })
        })
        .await
    }
}
