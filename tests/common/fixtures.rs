//! Test fixtures for creating test data
#![allow(dead_code)]

use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use chrono::Utc;
use rumormill::app_config::AppConfig;
use rumormill::audit::AuditActor;
use rumormill::captcha::{ChallengeError, ChallengeVerifier};
use rumormill::comments::{self, NewComment};
use rumormill::constants::{ADMIN_ID, ANONYMOUS_AUTHOR};
use rumormill::identity::Identity;
use rumormill::orm::posts;
use rumormill::AppState;
use sea_orm::{entity::*, ActiveValue::Set, DatabaseConnection, DbErr};
use std::sync::Arc;

pub const ADMIN_USERNAME: &str = "moderator";
pub const ADMIN_PASSWORD: &str = "correct horse battery staple";

/// Challenge provider double.
pub enum StubVerifier {
    /// No secret configured, so the challenge is skipped.
    Unconfigured,
    /// Accepts any non-empty token.
    Accepting,
    /// Rejects every token.
    Rejecting,
}

#[async_trait]
impl ChallengeVerifier for StubVerifier {
    fn is_configured(&self) -> bool {
        !matches!(self, StubVerifier::Unconfigured)
    }

    async fn verify(
        &self,
        token: &str,
        _action: &str,
        _remote_ip: Option<&str>,
    ) -> Result<(), ChallengeError> {
        match self {
            StubVerifier::Rejecting => Err(ChallengeError::VerificationFailed(vec![
                "invalid-input-response".to_string(),
            ])),
            _ if token.trim().is_empty() => Err(ChallengeError::InvalidToken),
            _ => Ok(()),
        }
    }
}

pub fn hash_password(password: &str) -> String {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .expect("Password hashing failed")
        .to_string()
}

/// Configuration with the admin surface enabled.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.admin.username = ADMIN_USERNAME.to_string();
    config.admin.password_hash = hash_password(ADMIN_PASSWORD);
    config.admin.session_secret = "k".repeat(64);
    config.identity.fingerprint_salt = "test-fingerprint-salt".to_string();
    config
}

pub async fn build_state(
    db: DatabaseConnection,
    config: &AppConfig,
    verifier: StubVerifier,
) -> AppState {
    AppState::bootstrap(db, config, Arc::new(verifier))
        .await
        .expect("Failed to bootstrap state")
}

/// State over `db` with the admin enabled and no challenge provider.
pub async fn test_state(db: DatabaseConnection) -> AppState {
    build_state(db, &test_config(), StubVerifier::Unconfigured).await
}

/// Identity with a fingerprint hash already derived.
pub fn identity(session_id: &str, ip: &str, fingerprint: &str) -> Identity {
    Identity {
        session_id: session_id.to_string(),
        client_ip: ip.to_string(),
        fingerprint: Some(fingerprint.to_string()),
    }
}

/// Identity whose request carried no fingerprint header.
pub fn identity_without_fingerprint(session_id: &str, ip: &str) -> Identity {
    Identity {
        session_id: session_id.to_string(),
        client_ip: ip.to_string(),
        fingerprint: None,
    }
}

pub fn admin_actor() -> AuditActor {
    AuditActor {
        admin_id: ADMIN_ID,
        admin_username: ADMIN_USERNAME.to_string(),
        ip: "10.0.0.1".to_string(),
        session_id: "admin-session".to_string(),
    }
}

/// Insert a visible post authored by `owner`, bypassing every gate.
pub async fn create_test_post(
    db: &DatabaseConnection,
    owner: &Identity,
    content: &str,
) -> Result<posts::Model, DbErr> {
    posts::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        content: Set(content.to_string()),
        author: Set(ANONYMOUS_AUTHOR.to_string()),
        tags: Set("[]".to_string()),
        created_at: Set(Utc::now().naive_utc()),
        updated_at: Set(None),
        deleted: Set(false),
        deleted_at: Set(None),
        session_id: Set(Some(owner.session_id.clone())),
        ip: Set(Some(owner.client_ip.clone())),
        fingerprint: Set(owner.fingerprint.clone()),
        likes_count: Set(0),
        dislikes_count: Set(0),
        comments_count: Set(0),
        views_count: Set(0),
    }
    .insert(db)
    .await
}

pub fn comment_request(content: &str) -> NewComment {
    NewComment {
        content: content.to_string(),
        turnstile_token: None,
        parent_id: None,
        reply_to_id: None,
    }
}

pub fn reply_request(content: &str, reply_to: &str) -> NewComment {
    NewComment {
        reply_to_id: Some(reply_to.to_string()),
        ..comment_request(content)
    }
}

/// Submit a comment through the full gate sequence.
pub async fn add_comment(
    state: &AppState,
    author: &Identity,
    post_id: &str,
    request: NewComment,
) -> comments::CommentView {
    comments::submit_comment(state, author, post_id, request)
        .await
        .expect("Failed to submit comment")
}

pub async fn fetch_post(db: &DatabaseConnection, post_id: &str) -> posts::Model {
    posts::Entity::find_by_id(post_id.to_string())
        .one(db)
        .await
        .expect("Query failed")
        .expect("Post missing")
}

/// Raise every submission throttle well above what a single test needs.
pub async fn relax_rate_limits(state: &AppState) {
    let changes = ["post", "comment", "report"]
        .iter()
        .map(|action| {
            (
                format!("rate_limit.{}.max_requests", action),
                serde_json::json!(1000),
            )
        })
        .collect();
    rumormill::admin::update_settings(state, &admin_actor(), changes)
        .await
        .expect("Failed to relax rate limits");
}
