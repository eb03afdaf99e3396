use async_trait::async_trait;
use sqlx::{Any, QueryBuilder};
use tracing::instrument;

use super::RdbBacked;
use crate::{
    datastore::{options::SelectMessagesOptions, query::Filter, tx::transaction, MessageStore},
    error::SqlxResultExt,
    model::{now, Message, MessageRow},
    Ctx, StoreResult,
};

const COLUMNS: &str = "message_id, room_id, user_id, message_type, payload, role, created, modified, deleted";

fn push_filter(f: &mut Filter<'_, '_>, opts: &SelectMessagesOptions) {
    f.eq_opt("room_id", opts.room_id.clone());
    if let Some(roles) = &opts.roles {
        f.is_in("role", roles.clone());
    }
    f.active();
}

#[async_trait]
impl<T: RdbBacked> MessageStore for T {
    #[instrument(target = "datastore", skip_all, fields(room_id = %message.room_id), err)]
    async fn insert_message(&self, ctx: &Ctx, message: &Message) -> StoreResult<Message> {
        let mut message = message.clone();
        message.before_save();
        let row = MessageRow::try_from(&message)?;

        transaction(ctx, self.rdb().master(), "insert message", move |conn| {
            Box::pin(async move {
                sqlx::query(
                    "INSERT INTO message (message_id, room_id, user_id, message_type, payload, role, created, modified, deleted) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&row.message_id)
                .bind(&row.room_id)
                .bind(&row.user_id)
                .bind(&row.message_type)
                .bind(&row.payload)
                .bind(row.role)
                .bind(row.created)
                .bind(row.modified)
                .bind(row.deleted)
                .execute(&mut *conn)
                .await
                .or_backend("An error occurred while creating message item")?;

                if message.payload.is_content() {
                    sqlx::query(
                        "UPDATE room SET last_message=?, last_message_updated=?, modified=? WHERE room_id=? AND deleted=0",
                    )
                    .bind(message.payload.summary())
                    .bind(message.created)
                    .bind(message.created)
                    .bind(&message.room_id)
                    .execute(&mut *conn)
                    .await
                    .or_backend("An error occurred while updating room's last message")?;

                    sqlx::query(
                        "UPDATE room_user SET unread_count=unread_count+1, modified=? WHERE room_id=? AND user_id<>? AND deleted=0",
                    )
                    .bind(now())
                    .bind(&message.room_id)
                    .bind(&message.user_id)
                    .execute(&mut *conn)
                    .await
                    .or_backend("An error occurred while updating room's user unread count")?;
                }

                Ok(message)
            })
        })
        .await
    }

    #[instrument(target = "datastore", skip_all, err)]
    async fn select_message(&self, ctx: &Ctx, message_id: &str) -> StoreResult<Option<Message>> {
        let row: Option<MessageRow> = ctx
            .run(async {
                sqlx::query_as(&format!("SELECT {COLUMNS} FROM message WHERE message_id=? AND deleted=0"))
                    .bind(message_id)
                    .fetch_optional(self.rdb().replica())
                    .await
                    .or_backend("An error occurred while getting message item")
            })
            .await?;

        Ok(row.map(Message::try_from).transpose()?)
    }

    #[instrument(target = "datastore", skip_all, err)]
    async fn select_messages(&self, ctx: &Ctx, opts: &SelectMessagesOptions) -> StoreResult<(Vec<Message>, i64)> {
        opts.validate()?;

        let mut qb = QueryBuilder::<Any>::new(format!("SELECT {COLUMNS} FROM message"));
        push_filter(&mut Filter::new(&mut qb), opts);
        let order = opts.page.order.sql();
        qb.push(format!(" ORDER BY created {order}, id {order} LIMIT "))
            .push_bind(opts.page.limit)
            .push(" OFFSET ")
            .push_bind(opts.page.offset);

        let mut count = QueryBuilder::<Any>::new("SELECT COUNT(*) FROM message");
        push_filter(&mut Filter::new(&mut count), opts);

        let replica = self.rdb().replica();
        let (rows, total) = ctx
            .run(async {
                let rows: Vec<MessageRow> = qb
                    .build_query_as()
                    .fetch_all(replica)
                    .await
                    .or_backend("An error occurred while getting messages")?;
                let total: i64 = count
                    .build_query_scalar()
                    .fetch_one(replica)
                    .await
                    .or_backend("An error occurred while getting message count")?;
                Ok((rows, total))
            })
            .await?;

        let messages = rows.into_iter().map(Message::try_from).collect::<Result<Vec<_>, _>>()?;
        Ok((messages, total))
    }

    #[instrument(target = "datastore", skip_all, err)]
    async fn update_message(&self, ctx: &Ctx, message: &Message) -> StoreResult<Option<Message>> {
        let mut message = message.clone();
        message.modified = now().max(message.modified);
        let row = MessageRow::try_from(&message)?;

        let res = ctx
            .run(async {
                sqlx::query(
                    "UPDATE message SET message_type=?, payload=?, role=?, modified=? WHERE message_id=? AND deleted=0",
                )
                .bind(&row.message_type)
                .bind(&row.payload)
                .bind(row.role)
                .bind(row.modified)
                .bind(&row.message_id)
                .execute(self.rdb().master())
                .await
                .or_backend("An error occurred while updating message item")
            })
            .await?;

        Ok((res.rows_affected() > 0).then_some(message))
    }

    #[instrument(target = "datastore", skip_all, err)]
    async fn delete_message(&self, ctx: &Ctx, message_id: &str) -> StoreResult<()> {
        let deleted = now();
        ctx.run(async {
            sqlx::query("UPDATE message SET deleted=?, modified=? WHERE message_id=? AND deleted=0")
                .bind(deleted)
                .bind(deleted)
                .bind(message_id)
                .execute(self.rdb().master())
                .await
                .or_backend("An error occurred while deleting message item")
        })
        .await?;
        Ok(())
    }
}
