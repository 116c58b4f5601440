mod common;

use chrono::{Duration, Utc};
use common::{database::*, fixtures::*};
use rumormill::audit::{self, AuditEntry, AuditQuery};
use rumormill::constants::AUDIT_RETENTION_DAYS;
use rumormill::orm::audit_logs;
use sea_orm::{entity::*, ActiveValue::Set, DatabaseConnection};
use serde_json::json;

async fn insert_aged_entry(db: &DatabaseConnection, action: &str, age: Duration) {
    audit_logs::Entity::insert(audit_logs::ActiveModel {
        admin_id: Set(1),
        admin_username: Set(ADMIN_USERNAME.to_string()),
        action: Set(action.to_string()),
        target_type: Set("post".to_string()),
        target_id: Set("p".to_string()),
        before_json: Set(None),
        after_json: Set(None),
        reason: Set(None),
        ip: Set("10.0.0.1".to_string()),
        session_id: Set("s".to_string()),
        created_at: Set(Utc::now().naive_utc() - age),
        ..Default::default()
    })
    .exec(db)
    .await
    .unwrap();
}

#[actix_rt::test]
async fn test_entries_past_retention_are_swept_on_read() {
    let db = setup_test_database().await;

    insert_aged_entry(&db, "ancient", Duration::days(AUDIT_RETENTION_DAYS + 1)).await;
    insert_aged_entry(&db, "recent", Duration::days(AUDIT_RETENTION_DAYS - 1)).await;

    let page = audit::list(&db, &AuditQuery::default()).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].action, "recent");

    let remaining = audit_logs::Entity::find().all(&db).await.unwrap();
    assert_eq!(remaining.len(), 1);
}

#[actix_rt::test]
async fn test_entries_past_retention_are_swept_on_write() {
    let db = setup_test_database().await;
    insert_aged_entry(&db, "ancient", Duration::days(AUDIT_RETENTION_DAYS + 5)).await;

    audit::record(
        &db,
        &admin_actor(),
        AuditEntry::new("delete_post", "post", "p1"),
    )
    .await
    .unwrap();

    let remaining = audit_logs::Entity::find().all(&db).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].action, "delete_post");
}

#[actix_rt::test]
async fn test_entry_snapshots_and_filters() {
    let db = setup_test_database().await;
    let actor = admin_actor();

    audit::record(
        &db,
        &actor,
        AuditEntry::new("ban_ip", "ip", "192.0.2.1")
            .after(&json!({ "permissions": ["post"] }))
            .reason(Some("spam")),
    )
    .await
    .unwrap();
    audit::record(&db, &actor, AuditEntry::new("delete_post", "post", "p1"))
        .await
        .unwrap();
    audit::record(&db, &actor, AuditEntry::new("delete_post", "post", "p2"))
        .await
        .unwrap();

    let page = audit::list(&db, &AuditQuery::default()).await.unwrap();
    assert_eq!(page.total, 3);
    // Newest first
    assert_eq!(page.items[0].target_id, "p2");

    let bans = audit::list(
        &db,
        &AuditQuery {
            action: Some("ban_ip".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(bans.total, 1);
    let entry = &bans.items[0];
    assert_eq!(entry.admin_username, ADMIN_USERNAME);
    assert_eq!(entry.ip, actor.ip);
    assert_eq!(entry.session_id, actor.session_id);
    assert_eq!(entry.reason.as_deref(), Some("spam"));
    assert_eq!(entry.before_json, None);
    let after: serde_json::Value =
        serde_json::from_str(entry.after_json.as_deref().unwrap()).unwrap();
    assert_eq!(after["permissions"][0], "post");

    let by_target = audit::list(
        &db,
        &AuditQuery {
            target_id: Some("p1".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(by_target.total, 1);
}
