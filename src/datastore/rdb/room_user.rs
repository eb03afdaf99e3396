use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{Any, AnyConnection, QueryBuilder};
use tracing::instrument;

use super::{subscription::invalidate_in, RdbBacked};
use crate::{
    datastore::{
        options::{DeleteMode, DeleteRoomUsersOptions, DeleteSubscriptionsOptions, SelectRoomUsersOptions},
        query::Filter,
        tx::transaction,
        RoomUserStore,
    },
    error::SqlxResultExt,
    model::{now, CascadeOutcome, RoomUser},
    Ctx, StoreResult,
};

const COLUMNS: &str = "id, room_id, user_id, unread_count, role, display, created, modified, deleted";

fn push_select_filter(f: &mut Filter<'_, '_>, opts: &SelectRoomUsersOptions) {
    f.eq_opt("room_id", opts.room_id.clone());
    if let Some(user_ids) = &opts.user_ids {
        f.is_in("user_id", user_ids.clone());
    }
    if let Some(roles) = &opts.roles {
        f.is_in("role", roles.clone());
    }
    f.active();
}

/// Inserts one membership on `conn`. A logically deleted row for the same
/// (room, user) pair is cleared first so the pair can be re-added.
pub(super) async fn insert_in(conn: &mut AnyConnection, room_user: &RoomUser) -> StoreResult<RoomUser> {
    let mut room_user = room_user.clone();
    let now = now();
    if room_user.created == 0 {
        room_user.created = now;
    }
    room_user.modified = now;
    room_user.deleted = 0;

    sqlx::query("DELETE FROM room_user WHERE room_id=? AND user_id=? AND deleted<>0")
        .bind(&room_user.room_id)
        .bind(&room_user.user_id)
        .execute(&mut *conn)
        .await
        .or_backend("An error occurred while creating room's user item")?;

    let res = sqlx::query(
        "INSERT INTO room_user (room_id, user_id, unread_count, role, display, created, modified, deleted) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&room_user.room_id)
    .bind(&room_user.user_id)
    .bind(room_user.unread_count)
    .bind(room_user.role)
    .bind(room_user.display)
    .bind(room_user.created)
    .bind(room_user.modified)
    .bind(room_user.deleted)
    .execute(&mut *conn)
    .await
    .or_backend("An error occurred while creating room's user item")?;

    if let Some(id) = res.last_insert_id() {
        room_user.id = id;
    }
    Ok(room_user)
}

/// Logically deletes every active membership where `column` equals `value`.
pub(super) async fn soft_delete_where(
    conn: &mut AnyConnection,
    column: &'static str,
    value: &str,
    deleted: i64,
) -> StoreResult<u64> {
    let mut qb = QueryBuilder::<Any>::new("UPDATE room_user SET deleted=");
    qb.push_bind(deleted).push(", modified=").push_bind(deleted);
    Filter::new(&mut qb).eq(column, value.to_owned()).active();
    let res = qb
        .build()
        .execute(&mut *conn)
        .await
        .or_backend("An error occurred while deleting room's user items")?;
    Ok(res.rows_affected())
}

async fn invalidate_memberships(
    conn: &mut AnyConnection,
    memberships: &[(String, String)],
    deleted: i64,
) -> StoreResult<CascadeOutcome> {
    let mut outcome = CascadeOutcome::default();
    for (room_id, user_id) in memberships {
        let opts = DeleteSubscriptionsOptions::default()
            .room_id(room_id.clone())
            .user_id(user_id.clone());
        let subscriptions = invalidate_in(conn, &opts, deleted)
            .await
            .map_err(|err| err.cascade("An error occurred while invalidating subscriptions of room's users"))?;
        outcome.subscriptions.extend(subscriptions);
    }
    Ok(outcome)
}

#[async_trait]
impl<T: RdbBacked> RoomUserStore for T {
    #[instrument(target = "datastore", skip_all, err)]
    async fn insert_room_users(&self, ctx: &Ctx, room_users: &[RoomUser]) -> StoreResult<()> {
        let room_users = room_users.to_vec();
        transaction(ctx, self.rdb().master(), "insert room users", move |conn| {
            Box::pin(async move {
                for room_user in &room_users {
                    insert_in(&mut *conn, room_user).await?;
                }
                Ok(())
            })
        })
        .await
    }

    #[instrument(target = "datastore", skip_all, fields(room_id = %room_id), err)]
    async fn replace_room_users(&self, ctx: &Ctx, room_id: &str, members: &[RoomUser]) -> StoreResult<CascadeOutcome> {
        let room_id = room_id.to_owned();
        let mut seen = HashSet::new();
        let members: Vec<RoomUser> = members
            .iter()
            .filter(|m| seen.insert(m.user_id.clone()))
            .cloned()
            .collect();

        transaction(ctx, self.rdb().master(), "replace room users", move |conn| {
            Box::pin(async move {
                let mut qb = QueryBuilder::<Any>::new(format!("SELECT {COLUMNS} FROM room_user"));
                Filter::new(&mut qb).eq("room_id", room_id.clone()).active();
                qb.push(" ORDER BY id");
                let existing: Vec<RoomUser> = qb
                    .build_query_as()
                    .fetch_all(&mut *conn)
                    .await
                    .or_backend("An error occurred while getting room's user list")?;

                sqlx::query("DELETE FROM room_user WHERE room_id=?")
                    .bind(&room_id)
                    .execute(&mut *conn)
                    .await
                    .or_backend("An error occurred while deleting all room's user items")?;

                for member in &members {
                    let mut member = member.clone();
                    member.room_id = room_id.clone();
                    if let Some(kept) = existing.iter().find(|ru| ru.user_id == member.user_id) {
                        member.created = kept.created;
                        member.unread_count = kept.unread_count;
                    }
                    insert_in(&mut *conn, &member).await?;
                }

                let departed: Vec<(String, String)> = existing
                    .into_iter()
                    .filter(|ru| !members.iter().any(|m| m.user_id == ru.user_id))
                    .map(|ru| (ru.room_id, ru.user_id))
                    .collect();
                invalidate_memberships(&mut *conn, &departed, now()).await
            })
        })
        .await
    }

    #[instrument(target = "datastore", skip_all, err)]
    async fn select_room_user(&self, ctx: &Ctx, room_id: &str, user_id: &str) -> StoreResult<Option<RoomUser>> {
        let mut qb = QueryBuilder::<Any>::new(format!("SELECT {COLUMNS} FROM room_user"));
        Filter::new(&mut qb)
            .eq("room_id", room_id.to_owned())
            .eq("user_id", user_id.to_owned())
            .active();
        ctx.run(async {
            qb.build_query_as()
                .fetch_optional(self.rdb().replica())
                .await
                .or_backend("An error occurred while getting room's user item")
        })
        .await
    }

    #[instrument(target = "datastore", skip_all, err)]
    async fn select_room_users(&self, ctx: &Ctx, opts: &SelectRoomUsersOptions) -> StoreResult<Vec<RoomUser>> {
        opts.validate()?;

        let mut qb = QueryBuilder::<Any>::new(format!("SELECT {COLUMNS} FROM room_user"));
        push_select_filter(&mut Filter::new(&mut qb), opts);
        qb.push(" ORDER BY id");
        ctx.run(async {
            qb.build_query_as()
                .fetch_all(self.rdb().replica())
                .await
                .or_backend("An error occurred while getting room's user list")
        })
        .await
    }

    #[instrument(target = "datastore", skip_all, err)]
    async fn select_user_ids_of_room_user(&self, ctx: &Ctx, opts: &SelectRoomUsersOptions) -> StoreResult<Vec<String>> {
        opts.validate()?;

        let mut qb = QueryBuilder::<Any>::new("SELECT user_id FROM room_user");
        push_select_filter(&mut Filter::new(&mut qb), opts);
        qb.push(" ORDER BY id");
        ctx.run(async {
            qb.build_query_scalar()
                .fetch_all(self.rdb().replica())
                .await
                .or_backend("An error occurred while getting room's user ids")
        })
        .await
    }

    #[instrument(target = "datastore", skip_all, err)]
    async fn update_room_user(&self, ctx: &Ctx, room_user: &RoomUser) -> StoreResult<Option<RoomUser>> {
        let mut room_user = room_user.clone();
        room_user.modified = now().max(room_user.modified);

        let res = ctx
            .run(async {
                sqlx::query(
                    "UPDATE room_user SET unread_count=?, role=?, display=?, modified=? WHERE room_id=? AND user_id=? AND deleted=0",
                )
                .bind(room_user.unread_count)
                .bind(room_user.role)
                .bind(room_user.display)
                .bind(room_user.modified)
                .bind(&room_user.room_id)
                .bind(&room_user.user_id)
                .execute(self.rdb().master())
                .await
                .or_backend("An error occurred while updating room's user item")
            })
            .await?;

        Ok((res.rows_affected() > 0).then_some(room_user))
    }

    #[instrument(target = "datastore", skip_all, err)]
    async fn delete_room_users(&self, ctx: &Ctx, opts: &DeleteRoomUsersOptions) -> StoreResult<CascadeOutcome> {
        opts.validate()?;
        let opts = opts.clone();

        transaction(ctx, self.rdb().master(), "delete room users", move |conn| {
            Box::pin(async move {
                let mut qb = QueryBuilder::<Any>::new("SELECT room_id, user_id FROM room_user");
                let mut f = Filter::new(&mut qb);
                f.eq_opt("room_id", opts.room_id.clone());
                if let Some(user_ids) = &opts.user_ids {
                    f.is_in("user_id", user_ids.clone());
                }
                f.active();
                qb.push(" ORDER BY id");
                let affected: Vec<(String, String)> = qb
                    .build_query_as()
                    .fetch_all(&mut *conn)
                    .await
                    .or_backend("An error occurred while getting room's user list")?;

                let deleted = match opts.mode {
                    DeleteMode::Logical(deleted) => deleted,
                    DeleteMode::Physical => now(),
                };
                let outcome = invalidate_memberships(&mut *conn, &affected, deleted).await?;

                let mut qb = match opts.mode {
                    DeleteMode::Logical(deleted) => {
                        let mut qb = QueryBuilder::<Any>::new("UPDATE room_user SET deleted=");
                        qb.push_bind(deleted).push(", modified=").push_bind(deleted);
                        qb
                    }
                    DeleteMode::Physical => QueryBuilder::<Any>::new("DELETE FROM room_user"),
                };
                let mut f = Filter::new(&mut qb);
                f.eq_opt("room_id", opts.room_id.clone());
                if let Some(user_ids) = &opts.user_ids {
                    f.is_in("user_id", user_ids.clone());
                }
                if let DeleteMode::Logical(_) = opts.mode {
                    f.active();
                }
                qb.build()
                    .execute(&mut *conn)
                    .await
                    .or_backend("An error occurred while deleting room's user items")?;

                Ok(outcome)
            })
        })
        .await
    }

    #[instrument(target = "datastore", skip_all, err)]
    async fn mark_all_as_read(&self, ctx: &Ctx, user_id: &str) -> StoreResult<()> {
        ctx.run(async {
            sqlx::query("UPDATE room_user SET unread_count=0, modified=? WHERE user_id=? AND deleted=0")
                .bind(now())
                .bind(user_id)
                .execute(self.rdb().master())
                .await
                .or_backend("An error occurred while marking all as read")
        })
        .await?;
        Ok(())
    }
}
