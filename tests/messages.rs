mod common;

use common::TestStore;
use swagstore::{
    datastore::{
        options::{Order, PageOptions, SelectMessagesOptions, SelectRoomUsersOptions},
        MessageStore, RoomStore, RoomUserStore,
    },
    model::{Message, MessagePayload, ROLE_ADMIN},
    Ctx, ErrorKind,
};

fn text(room_id: &str, user_id: &str, text: &str) -> Message {
    Message::new(room_id, user_id, MessagePayload::Text { text: text.to_owned() })
}

async fn unread(t: &TestStore, room_id: &str) -> Vec<(String, i64)> {
    t.store
        .select_room_users(&Ctx::background(), &SelectRoomUsersOptions::default().room_id(room_id))
        .await
        .expect("select members")
        .into_iter()
        .map(|m| (m.user_id, m.unread_count))
        .collect()
}

#[tokio::test]
async fn content_bumps_other_members_and_the_room_summary() {
    let t = TestStore::new().await;
    let ctx = Ctx::background();
    t.seed_room("r1", &["u1", "u2", "u3"]).await;

    let sent = t.store.insert_message(&ctx, &text("r1", "u1", "hello")).await.expect("insert");
    assert!(!sent.message_id.is_empty());

    assert_eq!(
        unread(&t, "r1").await,
        [("u1".to_owned(), 0), ("u2".to_owned(), 1), ("u3".to_owned(), 1)]
    );
    let room = t.store.select_room(&ctx, "r1").await.expect("select").expect("room");
    assert_eq!(room.last_message, "hello");
    assert_eq!(room.last_message_updated, sent.created);
}

#[tokio::test]
async fn unread_bump_touches_modified() {
    let t = TestStore::new().await;
    let ctx = Ctx::background();
    t.seed_room("r1", &["u1", "u2"]).await;
    t.exec("UPDATE room_user SET modified=1").await;

    t.store.insert_message(&ctx, &text("r1", "u1", "hello")).await.expect("insert");

    let u1 = t.store.select_room_user(&ctx, "r1", "u1").await.expect("select").expect("member");
    let u2 = t.store.select_room_user(&ctx, "r1", "u2").await.expect("select").expect("member");
    assert_eq!(u1.modified, 1);
    assert_eq!(u2.unread_count, 1);
    assert!(u2.modified > 1);
}

#[tokio::test]
async fn indicators_leave_counters_alone() {
    let t = TestStore::new().await;
    let ctx = Ctx::background();
    t.seed_room("r1", &["u1", "u2"]).await;

    t.store
        .insert_message(&ctx, &Message::new("r1", "u1", MessagePayload::IndicatorStart))
        .await
        .expect("insert");

    assert!(unread(&t, "r1").await.iter().all(|(_, n)| *n == 0));
    let room = t.store.select_room(&ctx, "r1").await.expect("select").expect("room");
    assert_eq!(room.last_message, "");
}

#[tokio::test]
async fn paging_returns_the_total_for_the_filter() {
    let t = TestStore::new().await;
    let ctx = Ctx::background();
    t.seed_room("r1", &["u1"]).await;
    for n in 0..5 {
        t.store
            .insert_message(&ctx, &text("r1", "u1", &format!("m{n}")))
            .await
            .expect("insert");
    }
    t.store.insert_message(&ctx, &text("r2", "u1", "elsewhere")).await.expect("insert");

    let opts = SelectMessagesOptions::default()
        .room_id("r1")
        .page(PageOptions::default().limit(2).offset(1));
    let (page, total) = t.store.select_messages(&ctx, &opts).await.expect("select");
    assert_eq!(total, 5);
    let texts: Vec<_> = page.iter().map(|m| m.payload.summary()).collect();
    assert_eq!(texts, ["m1", "m2"]);

    let opts = SelectMessagesOptions::default()
        .room_id("r1")
        .page(PageOptions::default().limit(1).order(Order::Desc));
    let (page, _) = t.store.select_messages(&ctx, &opts).await.expect("select");
    assert_eq!(page[0].payload.summary(), "m4");
}

#[tokio::test]
async fn roles_narrow_the_listing() {
    let t = TestStore::new().await;
    let ctx = Ctx::background();
    t.seed_room("r1", &["u1"]).await;
    t.store.insert_message(&ctx, &text("r1", "u1", "general")).await.expect("insert");
    let mut notice = text("r1", "u1", "admins only");
    notice.role = ROLE_ADMIN;
    t.store.insert_message(&ctx, &notice).await.expect("insert");

    let opts = SelectMessagesOptions::default().room_id("r1").roles([ROLE_ADMIN]);
    let (page, total) = t.store.select_messages(&ctx, &opts).await.expect("select");
    assert_eq!(total, 1);
    assert_eq!(page[0].payload.summary(), "admins only");
}

#[tokio::test]
async fn payload_survives_storage() {
    let t = TestStore::new().await;
    let ctx = Ctx::background();
    let image = Message::new(
        "r1",
        "u1",
        MessagePayload::Image {
            mime: "image/png".to_owned(),
            filename: "cat.png".to_owned(),
            source_url: "https://cdn.example.com/cat.png".to_owned(),
            thumbnail_url: Some("https://cdn.example.com/cat_s.png".to_owned()),
        },
    );
    let sent = t.store.insert_message(&ctx, &image).await.expect("insert");

    let stored = t.store.select_message(&ctx, &sent.message_id).await.expect("select").expect("present");
    assert_eq!(stored, sent);
    assert_eq!(t.count("SELECT COUNT(*) FROM message WHERE message_type='image'").await, 1);
}

#[tokio::test]
async fn update_and_soft_delete() {
    let t = TestStore::new().await;
    let ctx = Ctx::background();
    let mut sent = t.store.insert_message(&ctx, &text("r1", "u1", "draft")).await.expect("insert");

    sent.payload = MessagePayload::Text { text: "final".to_owned() };
    t.store.update_message(&ctx, &sent).await.expect("update").expect("present");
    let stored = t.store.select_message(&ctx, &sent.message_id).await.expect("select").expect("present");
    assert_eq!(stored.payload.summary(), "final");

    t.store.delete_message(&ctx, &sent.message_id).await.expect("delete");
    assert!(t.store.select_message(&ctx, &sent.message_id).await.expect("select").is_none());
    assert!(t.store.update_message(&ctx, &sent).await.expect("update deleted").is_none());
    let (page, total) = t
        .store
        .select_messages(&ctx, &SelectMessagesOptions::default().room_id("r1"))
        .await
        .expect("select");
    assert!(page.is_empty());
    assert_eq!(total, 0);
    assert_eq!(t.count("SELECT COUNT(*) FROM message").await, 1);
}

#[tokio::test]
async fn listing_needs_a_room_and_sane_paging() {
    let t = TestStore::new().await;
    let ctx = Ctx::background();

    let err = t
        .store
        .select_messages(&ctx, &SelectMessagesOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let opts = SelectMessagesOptions::default()
        .room_id("r1")
        .page(PageOptions::default().offset(-1));
    assert_eq!(t.store.select_messages(&ctx, &opts).await.unwrap_err().kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn undecodable_payload_is_a_codec_error() {
    let t = TestStore::new().await;
    let ctx = Ctx::background();
    let sent = t.store.insert_message(&ctx, &text("r1", "u1", "ok")).await.expect("insert");
    t.exec("UPDATE message SET payload='not json'").await;

    let err = t.store.select_message(&ctx, &sent.message_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
}
