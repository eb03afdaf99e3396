use async_trait::async_trait;
use sqlx::{Any, AnyConnection, QueryBuilder};
use tracing::instrument;

use super::{room_user, subscription::invalidate_in, RdbBacked};
use crate::{
    datastore::{
        options::{DeleteSubscriptionsOptions, SelectRoomsOptions},
        query::Filter,
        tx::transaction,
        RoomStore,
    },
    error::SqlxResultExt,
    model::{now, CascadeOutcome, Room, RoomUser},
    Ctx, StoreResult,
};

const COLUMNS: &str = "room_id, user_id, name, picture_url, information_url, meta_data, room_type, \
    notification_topic_id, last_message, last_message_updated, created, modified, deleted";

async fn insert_in(conn: &mut AnyConnection, room: &Room) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO room (room_id, user_id, name, picture_url, information_url, meta_data, room_type, notification_topic_id, last_message, last_message_updated, created, modified, deleted) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&room.room_id)
    .bind(&room.user_id)
    .bind(&room.name)
    .bind(&room.picture_url)
    .bind(&room.information_url)
    .bind(&room.meta_data)
    .bind(i64::from(room.room_type))
    .bind(&room.notification_topic_id)
    .bind(&room.last_message)
    .bind(room.last_message_updated)
    .bind(room.created)
    .bind(room.modified)
    .bind(room.deleted)
    .execute(&mut *conn)
    .await
    .or_backend("An error occurred while creating room item")?;
    Ok(())
}

#[async_trait]
impl<T: RdbBacked> RoomStore for T {
    #[instrument(target = "datastore", skip_all, fields(room_id = %room.room_id), err)]
    async fn insert_room(&self, ctx: &Ctx, room: &Room, members: &[RoomUser]) -> StoreResult<Room> {
        let mut room = room.clone();
        let now = now();
        if room.created == 0 {
            room.created = now;
        }
        room.modified = now;
        let members = members.to_vec();

        transaction(ctx, self.rdb().master(), "insert room", move |conn| {
            Box::pin(async move {
                insert_in(&mut *conn, &room).await?;
                for member in &members {
                    let mut member = member.clone();
                    member.room_id = room.room_id.clone();
                    room_user::insert_in(&mut *conn, &member)
                        .await
                        .map_err(|err| err.cascade("An error occurred while creating room's user items"))?;
                }
                Ok(room)
            })
        })
        .await
    }

    #[instrument(target = "datastore", skip_all, err)]
    async fn select_room(&self, ctx: &Ctx, room_id: &str) -> StoreResult<Option<Room>> {
        ctx.run(async {
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM room WHERE room_id=? AND deleted=0"))
                .bind(room_id)
                .fetch_optional(self.rdb().replica())
                .await
                .or_backend("An error occurred while getting room item")
        })
        .await
    }

    #[instrument(target = "datastore", skip_all, err)]
    async fn select_rooms(&self, ctx: &Ctx, opts: &SelectRoomsOptions) -> StoreResult<Vec<Room>> {
        opts.validate()?;

        let mut qb = QueryBuilder::<Any>::new(format!("SELECT {COLUMNS} FROM room"));
        Filter::new(&mut qb).active();
        qb.push(format!(" ORDER BY created {}, room_id {} LIMIT ", opts.order.sql(), opts.order.sql()))
            .push_bind(opts.limit)
            .push(" OFFSET ")
            .push_bind(opts.offset);

        ctx.run(async {
            qb.build_query_as()
                .fetch_all(self.rdb().replica())
                .await
                .or_backend("An error occurred while getting room list")
        })
        .await
    }

    #[instrument(target = "datastore", skip_all, fields(room_id = %room.room_id), err)]
    async fn update_room(&self, ctx: &Ctx, room: &Room) -> StoreResult<Option<Room>> {
        let mut room = room.clone();
        room.modified = now().max(room.modified);

        let res = ctx
            .run(async {
                sqlx::query(
                    "UPDATE room SET name=?, picture_url=?, information_url=?, meta_data=?, room_type=?, notification_topic_id=?, last_message=?, last_message_updated=?, modified=? WHERE room_id=? AND deleted=0",
                )
                .bind(&room.name)
                .bind(&room.picture_url)
                .bind(&room.information_url)
                .bind(&room.meta_data)
                .bind(i64::from(room.room_type))
                .bind(&room.notification_topic_id)
                .bind(&room.last_message)
                .bind(room.last_message_updated)
                .bind(room.modified)
                .bind(&room.room_id)
                .execute(self.rdb().master())
                .await
                .or_backend("An error occurred while updating room item")
            })
            .await?;

        Ok((res.rows_affected() > 0).then_some(room))
    }

    #[instrument(target = "datastore", skip_all, fields(room_id = %room_id), err)]
    async fn delete_room(&self, ctx: &Ctx, room_id: &str) -> StoreResult<CascadeOutcome> {
        let room_id = room_id.to_owned();

        transaction(ctx, self.rdb().master(), "delete room", move |conn| {
            Box::pin(async move {
                let deleted = now();
                sqlx::query("UPDATE room SET deleted=?, modified=? WHERE room_id=? AND deleted=0")
                    .bind(deleted)
                    .bind(deleted)
                    .bind(&room_id)
                    .execute(&mut *conn)
                    .await
                    .or_backend("An error occurred while deleting room item")?;

                room_user::soft_delete_where(&mut *conn, "room_id", &room_id, deleted)
                    .await
                    .map_err(|err| err.cascade("An error occurred while deleting room's user items"))?;

                let opts = DeleteSubscriptionsOptions::default().room_id(room_id.clone());
                let subscriptions = invalidate_in(&mut *conn, &opts, deleted)
                    .await
                    .map_err(|err| err.cascade("An error occurred while deleting room's subscriptions"))?;

                Ok(CascadeOutcome { devices: Vec::new(), subscriptions })
            })
        })
        .await
    }
}
