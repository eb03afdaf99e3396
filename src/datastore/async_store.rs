use std::sync::Arc;

use futures_util::future::BoxFuture;

use super::{
    options::{DeleteDevicesOptions, SelectMessagesOptions, SelectRoomUsersOptions, SelectSubscriptionsOptions},
    Provider,
};
use crate::{
    completion::{self, Completion},
    model::{CascadeOutcome, Device, Message, Room, RoomUser, Subscription, User},
    Ctx, StoreError, StoreResult,
};

/// Result channel of a non-blocking store call.
pub type StoreChannel<T> = Completion<T, StoreError>;

/// Non-blocking face of a [`Provider`]: every call runs as its own task and
/// returns a [`StoreChannel`] that yields exactly one result.
#[derive(Clone)]
pub struct AsyncStore {
    provider: Arc<dyn Provider>,
}

impl AsyncStore {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Runs `f` against the provider on a fresh task.
    ///
    /// ```ignore
    /// let users = store.spawn(&ctx, |p, ctx| Box::pin(async move {
    ///     p.select_user_ids_of_user(ctx, &ids).await
    /// }));
    /// ```
    pub fn spawn<T, F>(&self, ctx: &Ctx, f: F) -> StoreChannel<T>
    where
        F: for<'p> FnOnce(&'p dyn Provider, &'p Ctx) -> BoxFuture<'p, StoreResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let provider = self.provider.clone();
        let ctx = ctx.clone();
        completion::spawn(async move { f(provider.as_ref(), &ctx).await })
    }

    pub fn insert_user(&self, ctx: &Ctx, user: User) -> StoreChannel<User> {
        self.spawn(ctx, move |p, ctx| Box::pin(async move { p.insert_user(ctx, &user).await }))
    }

    pub fn select_user(&self, ctx: &Ctx, user_id: String) -> StoreChannel<Option<User>> {
        self.spawn(ctx, move |p, ctx| Box::pin(async move { p.select_user(ctx, &user_id).await }))
    }

    pub fn update_user(&self, ctx: &Ctx, user: User) -> StoreChannel<Option<User>> {
        self.spawn(ctx, move |p, ctx| Box::pin(async move { p.update_user(ctx, &user).await }))
    }

    pub fn delete_user(&self, ctx: &Ctx, user_id: String) -> StoreChannel<CascadeOutcome> {
        self.spawn(ctx, move |p, ctx| Box::pin(async move { p.delete_user(ctx, &user_id).await }))
    }

    pub fn insert_room(&self, ctx: &Ctx, room: Room, members: Vec<RoomUser>) -> StoreChannel<Room> {
        self.spawn(ctx, move |p, ctx| Box::pin(async move { p.insert_room(ctx, &room, &members).await }))
    }

    pub fn select_room(&self, ctx: &Ctx, room_id: String) -> StoreChannel<Option<Room>> {
        self.spawn(ctx, move |p, ctx| Box::pin(async move { p.select_room(ctx, &room_id).await }))
    }

    pub fn delete_room(&self, ctx: &Ctx, room_id: String) -> StoreChannel<CascadeOutcome> {
        self.spawn(ctx, move |p, ctx| Box::pin(async move { p.delete_room(ctx, &room_id).await }))
    }

    pub fn replace_room_users(&self, ctx: &Ctx, room_id: String, members: Vec<RoomUser>) -> StoreChannel<CascadeOutcome> {
        self.spawn(ctx, move |p, ctx| {
            Box::pin(async move { p.replace_room_users(ctx, &room_id, &members).await })
        })
    }

    pub fn select_room_users(&self, ctx: &Ctx, opts: SelectRoomUsersOptions) -> StoreChannel<Vec<RoomUser>> {
        self.spawn(ctx, move |p, ctx| Box::pin(async move { p.select_room_users(ctx, &opts).await }))
    }

    pub fn insert_device(&self, ctx: &Ctx, device: Device) -> StoreChannel<Device> {
        self.spawn(ctx, move |p, ctx| Box::pin(async move { p.insert_device(ctx, &device).await }))
    }

    pub fn update_device(&self, ctx: &Ctx, device: Device) -> StoreChannel<Option<(Device, CascadeOutcome)>> {
        self.spawn(ctx, move |p, ctx| Box::pin(async move { p.update_device(ctx, &device).await }))
    }

    pub fn delete_devices(&self, ctx: &Ctx, opts: DeleteDevicesOptions) -> StoreChannel<CascadeOutcome> {
        self.spawn(ctx, move |p, ctx| Box::pin(async move { p.delete_devices(ctx, &opts).await }))
    }

    pub fn insert_subscription(&self, ctx: &Ctx, subscription: Subscription) -> StoreChannel<Subscription> {
        self.spawn(ctx, move |p, ctx| {
            Box::pin(async move { p.insert_subscription(ctx, &subscription).await })
        })
    }

    pub fn select_subscriptions(&self, ctx: &Ctx, opts: SelectSubscriptionsOptions) -> StoreChannel<Vec<Subscription>> {
        self.spawn(ctx, move |p, ctx| Box::pin(async move { p.select_subscriptions(ctx, &opts).await }))
    }

    pub fn insert_message(&self, ctx: &Ctx, message: Message) -> StoreChannel<Message> {
        self.spawn(ctx, move |p, ctx| Box::pin(async move { p.insert_message(ctx, &message).await }))
    }

    pub fn select_messages(&self, ctx: &Ctx, opts: SelectMessagesOptions) -> StoreChannel<(Vec<Message>, i64)> {
        self.spawn(ctx, move |p, ctx| Box::pin(async move { p.select_messages(ctx, &opts).await }))
    }
}
