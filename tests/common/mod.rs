#![allow(dead_code)]

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use sqlx::AnyPool;
use swagstore::{
    datastore::{rdb::RdbBacked, DeviceStore, RoomStore, SqliteProvider, SubscriptionStore, UserStore},
    model::{Device, Platform, Room, RoomType, RoomUser, Subscription, User},
    notification::{MessageInfo, NotificationError, NotificationResult, PushProvider},
    Ctx, DatastoreConfig, Provider,
};
use tempfile::TempDir;

/// A fresh SQLite datastore in a temp dir, schema already created.
pub struct TestStore {
    _dir: TempDir,
    pub store: Arc<SqliteProvider>,
}

impl TestStore {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("swagchat.db");
        let cfg = DatastoreConfig::sqlite(path.to_string_lossy());
        let store = SqliteProvider::connect(&cfg).await.expect("open sqlite");
        store.init(&Ctx::background()).await.expect("create tables");
        Self { _dir: dir, store: Arc::new(store) }
    }

    pub fn provider(&self) -> Arc<dyn Provider> {
        self.store.clone()
    }

    pub fn pool(&self) -> &AnyPool {
        self.store.rdb().master()
    }

    pub async fn count(&self, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(self.pool()).await.expect("count")
    }

    pub async fn exec(&self, sql: &str) {
        sqlx::query(sql).execute(self.pool()).await.expect("exec");
    }

    pub async fn seed_user(&self, user_id: &str) -> User {
        self.store
            .insert_user(&Ctx::background(), &User::new(user_id, user_id.to_uppercase()))
            .await
            .expect("insert user")
    }

    pub async fn seed_room(&self, room_id: &str, members: &[&str]) -> Room {
        let owner = members.first().copied().unwrap_or("owner");
        let room = Room::new(room_id, owner, RoomType::PrivateRoom).named(room_id);
        let members: Vec<RoomUser> = members.iter().map(|u| RoomUser::new(room_id, *u)).collect();
        self.store
            .insert_room(&Ctx::background(), &room, &members)
            .await
            .expect("insert room")
    }

    pub async fn seed_device(&self, user_id: &str, platform: Platform, token: &str) -> Device {
        let device = Device::new(user_id, platform, token).with_notification_device_id(format!("ep-{token}"));
        self.store
            .insert_device(&Ctx::background(), &device)
            .await
            .expect("insert device")
    }

    pub async fn seed_subscription(&self, room_id: &str, user_id: &str, platform: Platform) -> Subscription {
        let subscription = Subscription::new(room_id, user_id, platform)
            .with_notification_subscription_id(format!("sub-{room_id}-{user_id}-{}", i64::from(platform)));
        self.store
            .insert_subscription(&Ctx::background(), &subscription)
            .await
            .expect("insert subscription")
    }
}

/// Push provider that records every call and fails the ids it is told to.
#[derive(Default)]
pub struct RecordingPush {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingPush {
    pub fn fail_on(&self, id: impl Into<String>) {
        self.failing.lock().expect("lock").insert(id.into());
    }

    pub fn calls(&self) -> Vec<String> {
        let mut calls = self.calls.lock().expect("lock").clone();
        calls.sort();
        calls
    }

    fn record(&self, op: &'static str, id: &str) -> NotificationResult<()> {
        self.calls.lock().expect("lock").push(format!("{op}:{id}"));
        if self.failing.lock().expect("lock").contains(id) {
            return Err(NotificationError::Provider { op, message: format!("{id} rejected") });
        }
        Ok(())
    }
}

#[async_trait]
impl PushProvider for RecordingPush {
    async fn create_topic(&self, room_id: &str) -> NotificationResult<Option<String>> {
        self.record("create_topic", room_id)?;
        Ok(Some(format!("topic-{room_id}")))
    }

    async fn delete_topic(&self, topic_id: &str) -> NotificationResult<()> {
        self.record("delete_topic", topic_id)
    }

    async fn create_endpoint(&self, token: &str) -> NotificationResult<Option<String>> {
        self.record("create_endpoint", token)?;
        Ok(Some(format!("ep-{token}")))
    }

    async fn delete_endpoint(&self, endpoint_id: &str) -> NotificationResult<()> {
        self.record("delete_endpoint", endpoint_id)
    }

    async fn subscribe(&self, topic_id: &str, endpoint_id: &str) -> NotificationResult<Option<String>> {
        self.record("subscribe", endpoint_id)?;
        Ok(Some(format!("{topic_id}/{endpoint_id}")))
    }

    async fn unsubscribe(&self, subscription_id: &str) -> NotificationResult<()> {
        self.record("unsubscribe", subscription_id)
    }

    async fn publish(&self, topic_id: &str, _info: &MessageInfo) -> NotificationResult<()> {
        self.record("publish", topic_id)
    }
}
