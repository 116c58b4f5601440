mod common;

use common::{database::*, fixtures::*};
use rumormill::admin::{self, LoginForm, VocabularyForm};
use rumormill::announcements::{self, NewAnnouncement};
use rumormill::audit::{self, AuditQuery};
use rumormill::posts::{self, NewPost};
use rumormill::BoardError;
use sea_orm::{ConnectionTrait, EntityTrait, PaginatorTrait, Statement};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;

fn login_form(username: &str, password: &str) -> LoginForm {
    LoginForm {
        username: username.to_string(),
        password: password.to_string(),
    }
}

#[actix_rt::test]
async fn test_login_checks_credentials_and_throttles() {
    let db = setup_test_database().await;
    let state = test_state(db).await;

    admin::login(&state, "10.8.0.1", &login_form(ADMIN_USERNAME, ADMIN_PASSWORD)).unwrap();

    let err = admin::login(&state, "10.8.0.2", &login_form(ADMIN_USERNAME, "nope")).unwrap_err();
    assert!(matches!(err, BoardError::Forbidden(_)));

    // Attempts are counted per IP, successful or not
    let max = state.throttle.policy().login_max;
    for _ in 1..max {
        let _ = admin::login(&state, "10.8.0.2", &login_form(ADMIN_USERNAME, "nope"));
    }
    let err = admin::login(&state, "10.8.0.2", &login_form(ADMIN_USERNAME, ADMIN_PASSWORD))
        .unwrap_err();
    assert!(matches!(err, BoardError::RateLimited { .. }));
}

#[actix_rt::test]
async fn test_login_when_admin_disabled() {
    let db = setup_test_database().await;
    let mut config = test_config();
    config.admin.password_hash.clear();
    let state = build_state(db, &config, StubVerifier::Unconfigured).await;

    let err = admin::login(&state, "10.8.0.1", &login_form(ADMIN_USERNAME, ADMIN_PASSWORD))
        .unwrap_err();
    assert!(matches!(err, BoardError::AdminDisabled));
}

#[actix_rt::test]
async fn test_settings_update_reloads_rate_limits() {
    let db = setup_test_database().await;
    let state = test_state(db.clone()).await;

    let mut changes = BTreeMap::new();
    changes.insert("rate_limit.post.max_requests".to_string(), json!(5));
    changes.insert("rate_limit.post.window_seconds".to_string(), json!(60));
    admin::update_settings(&state, &admin_actor(), changes)
        .await
        .unwrap();

    let policy = state.throttle.policy();
    assert_eq!(policy.post_max, 5);
    assert_eq!(policy.post_window, Duration::from_secs(60));

    let audit = audit::list(
        &db,
        &AuditQuery {
            action: Some("update_setting".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(audit.total, 2);

    // Settings survive a restart
    let restarted = test_state(db).await;
    assert_eq!(restarted.throttle.policy().post_max, 5);
}

#[actix_rt::test]
async fn test_invalid_setting_rejects_whole_batch() {
    let db = setup_test_database().await;
    let state = test_state(db.clone()).await;
    let before = state.throttle.policy();

    let mut changes = BTreeMap::new();
    changes.insert("rate_limit.post.max_requests".to_string(), json!(9));
    changes.insert("rate_limit.comment.max_requests".to_string(), json!(0));
    let err = admin::update_settings(&state, &admin_actor(), changes)
        .await
        .unwrap_err();
    assert!(matches!(err, BoardError::Validation(_)));

    let mut unknown = BTreeMap::new();
    unknown.insert("site.theme".to_string(), json!("dark"));
    let err = admin::update_settings(&state, &admin_actor(), unknown)
        .await
        .unwrap_err();
    assert!(matches!(err, BoardError::Validation(_)));

    assert_eq!(*state.throttle.policy(), *before);
    assert_eq!(
        audit::list(&db, &AuditQuery::default()).await.unwrap().total,
        0
    );
}

#[actix_rt::test]
async fn test_failed_settings_write_leaves_cache_untouched() {
    let db = setup_test_database().await;
    let state = test_state(db.clone()).await;
    let before = state.throttle.policy();

    // Every audit insert now fails, so the transaction rolls back
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "DROP TABLE audit_logs".to_owned(),
    ))
    .await
    .unwrap();

    let mut changes = BTreeMap::new();
    changes.insert("turnstile_enabled".to_string(), json!(false));
    changes.insert("rate_limit.post.max_requests".to_string(), json!(50));
    assert!(admin::update_settings(&state, &admin_actor(), changes)
        .await
        .is_err());

    assert!(state.settings.turnstile_enabled());
    assert_eq!(*state.throttle.policy(), *before);
    assert_eq!(
        rumormill::orm::settings::Entity::find()
            .count(&db)
            .await
            .unwrap(),
        0
    );
}

#[actix_rt::test]
async fn test_disabling_challenge_skips_verification() {
    let db = setup_test_database().await;
    let state = build_state(db, &test_config(), StubVerifier::Rejecting).await;
    let poster = identity("s", "10.8.1.1", "fp-poster");
    let post = || NewPost {
        content: "hello".to_string(),
        tags: Vec::new(),
        turnstile_token: None,
    };

    assert!(posts::submit_post(&state, &poster, post()).await.is_err());

    let mut changes = BTreeMap::new();
    changes.insert("turnstile_enabled".to_string(), json!(false));
    admin::update_settings(&state, &admin_actor(), changes)
        .await
        .unwrap();

    posts::submit_post(&state, &poster, post()).await.unwrap();
}

#[actix_rt::test]
async fn test_vocabulary_add_and_remove() {
    let db = setup_test_database().await;
    let state = test_state(db.clone()).await;
    let word = |w: &str| VocabularyForm {
        word: w.to_string(),
    };

    assert!(admin::add_word(&state, &admin_actor(), word(" Scam "))
        .await
        .unwrap());
    assert!(!admin::add_word(&state, &admin_actor(), word("scam"))
        .await
        .unwrap());
    assert_eq!(state.word_filter.list(), vec!["scam".to_string()]);

    let err = posts::submit_post(
        &state,
        &identity("s", "10.8.2.1", "fp-s"),
        NewPost {
            content: "not a SCAM at all".to_string(),
            tags: Vec::new(),
            turnstile_token: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, BoardError::Validation(_)));

    assert!(admin::remove_word(&state, &admin_actor(), word("scam"))
        .await
        .unwrap());
    assert!(!admin::remove_word(&state, &admin_actor(), word("scam"))
        .await
        .unwrap());
    assert!(state.word_filter.list().is_empty());

    let entries = audit::list(&db, &AuditQuery::default()).await.unwrap();
    assert_eq!(entries.total, 2);
}

#[actix_rt::test]
async fn test_announcements_lifecycle() {
    let db = setup_test_database().await;
    let state = test_state(db.clone()).await;

    let first = announcements::create(
        &state,
        &admin_actor(),
        NewAnnouncement {
            content: "Be kind".to_string(),
        },
    )
    .await
    .unwrap();
    let second = announcements::create(
        &state,
        &admin_actor(),
        NewAnnouncement {
            content: "Maintenance tonight".to_string(),
        },
    )
    .await
    .unwrap();

    let listed = announcements::list(&db).await.unwrap();
    assert_eq!(listed[0].id, second.id);
    assert_eq!(listed.len(), 2);

    announcements::delete(&state, &admin_actor(), first.id)
        .await
        .unwrap();
    let err = announcements::delete(&state, &admin_actor(), first.id)
        .await
        .unwrap_err();
    assert!(matches!(err, BoardError::NotFound(_)));

    let err = announcements::create(
        &state,
        &admin_actor(),
        NewAnnouncement {
            content: String::new(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, BoardError::Validation(_)));

    assert_eq!(announcements::list(&db).await.unwrap().len(), 1);
}
