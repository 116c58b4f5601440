mod common;

use common::{database::*, fixtures::*};
use rumormill::comments::{self, NewComment};
use rumormill::orm::comments as comment_rows;
use rumormill::posts;
use rumormill::BoardError;
use sea_orm::EntityTrait;

#[actix_rt::test]
async fn test_reply_to_reply_is_flattened_onto_root() {
    let db = setup_test_database().await;
    let state = test_state(db.clone()).await;
    let owner = identity("owner", "10.2.0.1", "fp-owner");
    let post = create_test_post(&db, &owner, "thread me").await.unwrap();

    let r = add_comment(
        &state,
        &identity("r", "10.2.0.2", "fp-r"),
        &post.id,
        comment_request("root"),
    )
    .await;
    let a = add_comment(
        &state,
        &identity("a", "10.2.0.3", "fp-a"),
        &post.id,
        reply_request("reply to root", &r.id),
    )
    .await;
    let b = add_comment(
        &state,
        &identity("b", "10.2.0.4", "fp-b"),
        &post.id,
        reply_request("reply to a", &a.id),
    )
    .await;

    assert_eq!(r.parent_id, None);
    assert_eq!(a.parent_id.as_deref(), Some(r.id.as_str()));
    assert_eq!(a.reply_to_id.as_deref(), Some(r.id.as_str()));
    assert_eq!(b.parent_id.as_deref(), Some(r.id.as_str()));
    assert_eq!(b.reply_to_id.as_deref(), Some(a.id.as_str()));

    let threads = comments::list_threads(&db, &post.id).await.unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0].root.id, r.id);
    let reply_ids: Vec<&str> = threads[0].replies.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(reply_ids, vec![a.id.as_str(), b.id.as_str()]);

    assert_eq!(fetch_post(&db, &post.id).await.comments_count, 3);
}

#[actix_rt::test]
async fn test_parent_with_mismatched_reply_target_is_rejected() {
    let db = setup_test_database().await;
    let state = test_state(db.clone()).await;
    let owner = identity("owner", "10.2.0.1", "fp-owner");
    let post = create_test_post(&db, &owner, "two threads").await.unwrap();

    let first = add_comment(
        &state,
        &identity("x", "10.2.0.2", "fp-x"),
        &post.id,
        comment_request("first"),
    )
    .await;
    let second = add_comment(
        &state,
        &identity("y", "10.2.0.3", "fp-y"),
        &post.id,
        comment_request("second"),
    )
    .await;

    let request = NewComment {
        parent_id: Some(first.id.clone()),
        reply_to_id: Some(second.id.clone()),
        ..comment_request("confused")
    };
    let err = comments::submit_comment(
        &state,
        &identity("z", "10.2.0.4", "fp-z"),
        &post.id,
        request,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, BoardError::Validation(_)));
    assert_eq!(fetch_post(&db, &post.id).await.comments_count, 2);
}

#[actix_rt::test]
async fn test_parent_from_another_post_is_not_found() {
    let db = setup_test_database().await;
    let state = test_state(db.clone()).await;
    let owner = identity("owner", "10.2.0.1", "fp-owner");
    let here = create_test_post(&db, &owner, "here").await.unwrap();
    let elsewhere = create_test_post(&db, &owner, "elsewhere").await.unwrap();

    let foreign = add_comment(
        &state,
        &identity("x", "10.2.0.2", "fp-x"),
        &elsewhere.id,
        comment_request("over there"),
    )
    .await;

    let err = comments::submit_comment(
        &state,
        &identity("y", "10.2.0.3", "fp-y"),
        &here.id,
        reply_request("lost", &foreign.id),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, BoardError::NotFound(_)));
}

#[actix_rt::test]
async fn test_deleted_post_rejects_comments_and_listing() {
    let db = setup_test_database().await;
    let state = test_state(db.clone()).await;
    let owner = identity("owner", "10.2.0.1", "fp-owner");
    let post = create_test_post(&db, &owner, "soon gone").await.unwrap();
    posts::set_deleted(&db, &post.id, true).await.unwrap();

    let err = comments::submit_comment(
        &state,
        &identity("x", "10.2.0.2", "fp-x"),
        &post.id,
        comment_request("too late"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, BoardError::NotFound(_)));

    let err = comments::list_threads(&db, &post.id).await.unwrap_err();
    assert!(matches!(err, BoardError::NotFound(_)));
}

#[actix_rt::test]
async fn test_soft_delete_keeps_count_in_step() {
    let db = setup_test_database().await;
    let state = test_state(db.clone()).await;
    let owner = identity("owner", "10.2.0.1", "fp-owner");
    let post = create_test_post(&db, &owner, "counted").await.unwrap();

    let root = add_comment(
        &state,
        &identity("r", "10.2.0.2", "fp-r"),
        &post.id,
        comment_request("root"),
    )
    .await;
    let reply = add_comment(
        &state,
        &identity("a", "10.2.0.3", "fp-a"),
        &post.id,
        reply_request("reply", &root.id),
    )
    .await;

    let row = comment_rows::Entity::find_by_id(reply.id.clone())
        .one(&db)
        .await
        .unwrap()
        .unwrap();

    assert!(comments::set_deleted(&db, &row, true).await.unwrap());
    assert_eq!(fetch_post(&db, &post.id).await.comments_count, 1);

    // Already deleted: nothing changes
    assert!(!comments::set_deleted(&db, &row, true).await.unwrap());
    assert_eq!(fetch_post(&db, &post.id).await.comments_count, 1);

    let threads = comments::list_threads(&db, &post.id).await.unwrap();
    assert!(threads[0].replies.is_empty());

    assert!(comments::set_deleted(&db, &row, false).await.unwrap());
    assert_eq!(fetch_post(&db, &post.id).await.comments_count, 2);
}

#[actix_rt::test]
async fn test_comment_length_limit() {
    let db = setup_test_database().await;
    let state = test_state(db.clone()).await;
    let owner = identity("owner", "10.2.0.1", "fp-owner");
    let post = create_test_post(&db, &owner, "short replies only").await.unwrap();

    let too_long = "字".repeat(state.limits.max_comment_length + 1);
    let err = comments::submit_comment(
        &state,
        &identity("x", "10.2.0.2", "fp-x"),
        &post.id,
        comment_request(&too_long),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, BoardError::Validation(_)));

    let err = comments::submit_comment(
        &state,
        &identity("y", "10.2.0.3", "fp-y"),
        &post.id,
        comment_request("   "),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, BoardError::Validation(_)));
}

#[actix_rt::test]
async fn test_rejected_target_does_not_consume_comment_budget() {
    let db = setup_test_database().await;
    let state = build_state(db.clone(), &test_config(), StubVerifier::Rejecting).await;
    let owner = identity("owner", "10.2.0.1", "fp-owner");
    let post = create_test_post(&db, &owner, "real").await.unwrap();
    let commenter = identity("c", "10.2.3.1", "fp-c");

    let err = comments::submit_comment(&state, &commenter, "no-such-post", comment_request("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, BoardError::NotFound(_)));

    let err = comments::submit_comment(
        &state,
        &commenter,
        &post.id,
        reply_request("hi", "no-such-comment"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, BoardError::NotFound(_)));

    // The rejecting verifier is only reached once the target resolves, and
    // the comment budget (one per window) is still unspent at that point
    let err = comments::submit_comment(&state, &commenter, &post.id, comment_request("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, BoardError::Challenge(_)));

    let err = comments::submit_comment(&state, &commenter, &post.id, comment_request("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, BoardError::RateLimited { .. }));
}
