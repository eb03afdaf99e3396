mod common;

use common::TestStore;
use swagstore::{
    datastore::{
        options::{DeleteRoomUsersOptions, SelectRoomUsersOptions, SelectSubscriptionsOptions},
        RoomUserStore, SubscriptionStore,
    },
    model::{Platform, RoomUser, ROLE_ADMIN},
    Ctx, ErrorKind,
};

#[tokio::test]
async fn replace_keeps_survivors_and_invalidates_the_departed() {
    let t = TestStore::new().await;
    let ctx = Ctx::background();
    t.seed_room("r1", &["u1", "u2"]).await;
    t.seed_subscription("r1", "u1", Platform::Ios).await;
    t.seed_subscription("r1", "u2", Platform::Ios).await;
    t.seed_subscription("r1", "u2", Platform::Android).await;

    let mut u1 = t.store.select_room_user(&ctx, "r1", "u1").await.expect("select").expect("member");
    u1.unread_count = 3;
    t.store.update_room_user(&ctx, &u1).await.expect("update").expect("present");

    let outcome = t
        .store
        .replace_room_users(&ctx, "r1", &[RoomUser::new("r1", "u1")])
        .await
        .expect("replace");

    assert_eq!(outcome.subscriptions.len(), 2);
    assert!(outcome.subscriptions.iter().all(|s| s.user_id == "u2"));
    assert!(outcome.devices.is_empty());

    let members = t
        .store
        .select_room_users(&ctx, &SelectRoomUsersOptions::default().room_id("r1"))
        .await
        .expect("select members");
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].user_id, "u1");
    assert_eq!(members[0].unread_count, 3);
    assert_eq!(members[0].created, u1.created);

    let left = t
        .store
        .select_subscriptions(&ctx, &SelectSubscriptionsOptions::default().room_id("r1"))
        .await
        .expect("select subscriptions");
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].user_id, "u1");
}

#[tokio::test]
async fn replace_drops_duplicates_and_keeps_first_occurrence_order() {
    let t = TestStore::new().await;
    let ctx = Ctx::background();
    t.seed_room("r1", &["u1"]).await;

    let members = [
        RoomUser::new("r1", "u3"),
        RoomUser::new("r1", "u2").with_role(ROLE_ADMIN),
        RoomUser::new("r1", "u3"),
        RoomUser::new("r1", "u2"),
    ];
    t.store.replace_room_users(&ctx, "r1", &members).await.expect("replace");

    let stored = t
        .store
        .select_room_users(&ctx, &SelectRoomUsersOptions::default().room_id("r1"))
        .await
        .expect("select");
    let ids: Vec<_> = stored.iter().map(|m| m.user_id.as_str()).collect();
    assert_eq!(ids, ["u3", "u2"]);
    assert_eq!(stored[1].role, ROLE_ADMIN);

    let user_ids = t
        .store
        .select_user_ids_of_room_user(&ctx, &SelectRoomUsersOptions::default().room_id("r1"))
        .await
        .expect("select ids");
    assert_eq!(user_ids, ["u3", "u2"]);
}

#[tokio::test]
async fn replace_with_nobody_empties_the_room() {
    let t = TestStore::new().await;
    let ctx = Ctx::background();
    t.seed_room("r1", &["u1", "u2"]).await;

    t.store.replace_room_users(&ctx, "r1", &[]).await.expect("replace");
    assert_eq!(t.count("SELECT COUNT(*) FROM room_user WHERE room_id='r1'").await, 0);
}

#[tokio::test]
async fn logically_deleted_members_can_rejoin() {
    let t = TestStore::new().await;
    let ctx = Ctx::background();
    t.seed_room("r1", &["u1", "u2"]).await;

    t.store
        .delete_room_users(
            &ctx,
            &DeleteRoomUsersOptions::default().logical_deleted(100).room_id("r1").user_ids(["u2"]),
        )
        .await
        .expect("delete");
    assert!(t.store.select_room_user(&ctx, "r1", "u2").await.expect("select").is_none());

    t.store
        .insert_room_users(&ctx, &[RoomUser::new("r1", "u2")])
        .await
        .expect("re-add");
    assert!(t.store.select_room_user(&ctx, "r1", "u2").await.expect("select").is_some());
    assert_eq!(t.count("SELECT COUNT(*) FROM room_user WHERE room_id='r1'").await, 2);
}

#[tokio::test]
async fn deleting_members_invalidates_only_their_room_subscriptions() {
    let t = TestStore::new().await;
    let ctx = Ctx::background();
    t.seed_room("r1", &["u1", "u2"]).await;
    t.seed_room("r2", &["u2"]).await;
    t.seed_subscription("r1", "u2", Platform::Ios).await;
    t.seed_subscription("r2", "u2", Platform::Ios).await;

    let outcome = t
        .store
        .delete_room_users(&ctx, &DeleteRoomUsersOptions::default().room_id("r1").user_ids(["u2"]))
        .await
        .expect("delete");
    assert_eq!(outcome.subscriptions.len(), 1);
    assert_eq!(outcome.subscriptions[0].room_id, "r1");

    assert_eq!(t.count("SELECT COUNT(*) FROM room_user WHERE room_id='r1'").await, 1);
    let active = t
        .store
        .select_subscriptions(&ctx, &SelectSubscriptionsOptions::default().user_id("u2"))
        .await
        .expect("select");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].room_id, "r2");
}

#[tokio::test]
async fn failing_invalidation_leaves_memberships_in_place() {
    let t = TestStore::new().await;
    let ctx = Ctx::background();
    t.seed_room("r1", &["u1", "u2"]).await;
    t.seed_subscription("r1", "u2", Platform::Ios).await;
    t.exec(
        "CREATE TRIGGER forced_invalidation BEFORE UPDATE ON subscription BEGIN SELECT RAISE(ABORT, 'forced'); END",
    )
    .await;

    let err = t
        .store
        .replace_room_users(&ctx, "r1", &[RoomUser::new("r1", "u1")])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cascade);

    let members = t
        .store
        .select_user_ids_of_room_user(&ctx, &SelectRoomUsersOptions::default().room_id("r1"))
        .await
        .expect("select");
    assert_eq!(members, ["u1", "u2"]);
}

#[tokio::test]
async fn mark_all_as_read_resets_every_room() {
    let t = TestStore::new().await;
    let ctx = Ctx::background();
    t.seed_room("r1", &["u1"]).await;
    t.seed_room("r2", &["u1"]).await;
    t.exec("UPDATE room_user SET unread_count=4").await;

    t.store.mark_all_as_read(&ctx, "u1").await.expect("mark");

    let rows = t
        .store
        .select_room_users(&ctx, &SelectRoomUsersOptions::default().user_ids(["u1"]))
        .await
        .expect("select");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.unread_count == 0));
}

#[tokio::test]
async fn role_filter_narrows_the_selection() {
    let t = TestStore::new().await;
    let ctx = Ctx::background();
    t.seed_room("r1", &[]).await;
    t.store
        .insert_room_users(
            &ctx,
            &[RoomUser::new("r1", "admin").with_role(ROLE_ADMIN), RoomUser::new("r1", "member")],
        )
        .await
        .expect("insert");

    let admins = t
        .store
        .select_user_ids_of_room_user(&ctx, &SelectRoomUsersOptions::default().room_id("r1").roles([ROLE_ADMIN]))
        .await
        .expect("select");
    assert_eq!(admins, ["admin"]);
}

#[tokio::test]
async fn unfiltered_calls_are_rejected() {
    let t = TestStore::new().await;
    let ctx = Ctx::background();
    t.seed_room("r1", &["u1"]).await;

    let err = t
        .store
        .delete_room_users(&ctx, &DeleteRoomUsersOptions::default().logical_deleted(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = t
        .store
        .select_room_users(&ctx, &SelectRoomUsersOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert_eq!(t.count("SELECT COUNT(*) FROM room_user WHERE deleted=0").await, 1);
}

#[tokio::test]
async fn duplicate_active_membership_is_a_unique_violation() {
    let t = TestStore::new().await;
    t.seed_room("r1", &["u1"]).await;

    let err = t
        .store
        .insert_room_users(&Ctx::background(), &[RoomUser::new("r1", "u1")])
        .await
        .unwrap_err();
    assert!(err.is_unique_violation());
}
