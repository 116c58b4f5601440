mod common;

use common::{database::*, fixtures::*};
use rumormill::notifications::{self, NotificationType};

async fn kinds_for(db: &sea_orm::DatabaseConnection, fingerprint: &str) -> Vec<String> {
    notifications::inbox(db, fingerprint)
        .await
        .unwrap()
        .items
        .into_iter()
        .map(|n| n.kind)
        .collect()
}

#[actix_rt::test]
async fn test_comment_notifies_post_owner() {
    let db = setup_test_database().await;
    let state = test_state(db.clone()).await;
    let owner = identity("owner", "10.3.0.1", "fp-owner");
    let post = create_test_post(&db, &owner, "tell me").await.unwrap();

    add_comment(
        &state,
        &identity("c", "10.3.0.2", "fp-c"),
        &post.id,
        comment_request("a comment"),
    )
    .await;

    assert_eq!(
        kinds_for(&db, "fp-owner").await,
        vec![NotificationType::PostComment.as_str().to_string()]
    );
    assert!(kinds_for(&db, "fp-c").await.is_empty());
}

#[actix_rt::test]
async fn test_reply_notifies_comment_author_and_post_owner() {
    let db = setup_test_database().await;
    let state = test_state(db.clone()).await;
    let owner = identity("owner", "10.3.0.1", "fp-owner");
    let post = create_test_post(&db, &owner, "discuss").await.unwrap();

    let root = add_comment(
        &state,
        &identity("c1", "10.3.0.2", "fp-c1"),
        &post.id,
        comment_request("root"),
    )
    .await;
    add_comment(
        &state,
        &identity("c2", "10.3.0.3", "fp-c2"),
        &post.id,
        reply_request("reply", &root.id),
    )
    .await;

    assert_eq!(
        kinds_for(&db, "fp-c1").await,
        vec![NotificationType::CommentReply.as_str().to_string()]
    );
    // One for the root comment, one for the reply
    assert_eq!(notifications::count_unread(&db, "fp-owner").await.unwrap(), 2);
}

#[actix_rt::test]
async fn test_owner_replying_to_own_comment_gets_nothing() {
    let db = setup_test_database().await;
    let state = test_state(db.clone()).await;
    let owner = identity("owner", "10.3.0.1", "fp-owner");
    let post = create_test_post(&db, &owner, "self talk").await.unwrap();

    relax_rate_limits(&state).await;

    let root = add_comment(&state, &owner, &post.id, comment_request("first")).await;
    add_comment(&state, &owner, &post.id, reply_request("second", &root.id)).await;

    assert!(kinds_for(&db, "fp-owner").await.is_empty());
}

#[actix_rt::test]
async fn test_reply_to_owner_comment_is_one_notification() {
    let db = setup_test_database().await;
    let state = test_state(db.clone()).await;
    let owner = identity("owner", "10.3.0.1", "fp-owner");
    let post = create_test_post(&db, &owner, "dedup").await.unwrap();

    let root = add_comment(&state, &owner, &post.id, comment_request("owner says")).await;
    add_comment(
        &state,
        &identity("c", "10.3.0.2", "fp-c"),
        &post.id,
        reply_request("answer", &root.id),
    )
    .await;

    assert_eq!(
        kinds_for(&db, "fp-owner").await,
        vec![NotificationType::CommentReply.as_str().to_string()]
    );
}

#[actix_rt::test]
async fn test_mark_read() {
    let db = setup_test_database().await;
    let state = test_state(db.clone()).await;
    let owner = identity("owner", "10.3.0.1", "fp-owner");
    let post = create_test_post(&db, &owner, "popular").await.unwrap();

    for n in 0..3 {
        add_comment(
            &state,
            &identity(&format!("c{}", n), &format!("10.3.1.{}", n), &format!("fp-c{}", n)),
            &post.id,
            comment_request("hi"),
        )
        .await;
    }

    let inbox = notifications::inbox(&db, "fp-owner").await.unwrap();
    assert_eq!(inbox.unread, 3);
    let newest = inbox.items[0].id;

    assert_eq!(
        notifications::mark_read(&db, "fp-owner", Some(&[newest]))
            .await
            .unwrap(),
        1
    );
    // Marking again is a no-op
    assert_eq!(
        notifications::mark_read(&db, "fp-owner", Some(&[newest]))
            .await
            .unwrap(),
        0
    );
    // Someone else's ids are never touched
    assert_eq!(
        notifications::mark_read(&db, "fp-c0", Some(&[inbox.items[1].id]))
            .await
            .unwrap(),
        0
    );
    assert_eq!(notifications::count_unread(&db, "fp-owner").await.unwrap(), 2);

    assert_eq!(
        notifications::mark_read(&db, "fp-owner", None).await.unwrap(),
        2
    );
    let inbox = notifications::inbox(&db, "fp-owner").await.unwrap();
    assert_eq!(inbox.unread, 0);
    assert!(inbox.items.iter().all(|n| n.read_at.is_some()));
}
