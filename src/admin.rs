//! Admin credentials, runtime settings and the sensitive-word vocabulary.

use crate::app_config::AdminConfig;
use crate::audit::{self, AuditActor, AuditEntry};
use crate::config::{validate_setting, SettingValue, SettingView};
use crate::constants::ADMIN_ID;
use crate::error::BoardError;
use crate::state::AppState;
use crate::word_filter::normalize;
use argon2::password_hash::{PasswordHash, PasswordVerifier};
use argon2::Argon2;
use sea_orm::TransactionTrait;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use validator::Validate;

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct LoginForm {
    #[validate(length(min = 1, max = 64))]
    pub username: String,
    #[validate(length(min = 1, max = 256))]
    pub password: String,
}

/// Compare against the configured username and Argon2 hash.
pub fn verify_credentials(config: &AdminConfig, username: &str, password: &str) -> bool {
    if !config.is_enabled() || username != config.username {
        return false;
    }

    let parsed_hash = match PasswordHash::new(&config.password_hash) {
        Ok(hash) => hash,
        Err(err) => {
            log::error!("Configured admin password hash is not a valid PHC string: {}", err);
            return false;
        }
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Check a login attempt from `ip`. Attempts are throttled per IP.
pub fn login(state: &AppState, ip: &str, form: &LoginForm) -> Result<(), BoardError> {
    if !state.admin.is_enabled() {
        return Err(BoardError::AdminDisabled);
    }

    form.validate()?;
    state.throttle.check_login(ip)?;

    if !verify_credentials(&state.admin, &form.username, &form.password) {
        log::warn!("Failed admin login for {:?} from {}", form.username, ip);
        return Err(BoardError::Forbidden("Invalid credentials".to_string()));
    }

    log::info!("Admin {} logged in from {}", form.username, ip);
    Ok(())
}

/// Audit actor for the single configured admin.
pub fn actor(state: &AppState, ip: &str, session_id: &str) -> AuditActor {
    AuditActor {
        admin_id: ADMIN_ID,
        admin_username: state.admin.username.clone(),
        ip: ip.to_string(),
        session_id: session_id.to_string(),
    }
}

/// Apply a batch of setting changes. Every key is validated before anything
/// is written. Each changed key gets its own audit entry.
pub async fn update_settings(
    state: &AppState,
    actor: &AuditActor,
    changes: BTreeMap<String, serde_json::Value>,
) -> Result<Vec<SettingView>, BoardError> {
    if changes.is_empty() {
        return Err(BoardError::validation("No settings given"));
    }

    let validated: Vec<(String, SettingValue)> = changes
        .iter()
        .map(|(key, value)| {
            validate_setting(key, value)
                .map(|parsed| (key.clone(), parsed))
                .map_err(BoardError::Validation)
        })
        .collect::<Result<_, _>>()?;

    let txn = state.db.begin().await?;
    for (key, value) in &validated {
        let previous = state.settings.persist_value(&txn, key, value).await?;
        audit::record(
            &txn,
            actor,
            AuditEntry::new("update_setting", "setting", key.as_str())
                .before(&previous.map(|v| v.to_json()))
                .after(&value.to_json()),
        )
        .await?;
    }

    txn.commit().await?;

    for (key, value) in validated.iter().cloned() {
        state.settings.cache_value(&key, value);
    }
    state.throttle.reload(&state.settings);
    log::info!(
        "Admin {} updated settings: {}",
        actor.admin_username,
        validated
            .iter()
            .map(|(key, _)| key.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(state.settings.all())
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct VocabularyForm {
    #[validate(length(min = 1, max = 50))]
    pub word: String,
}

/// Add a blocked word. Returns false when it was already present.
pub async fn add_word(
    state: &AppState,
    actor: &AuditActor,
    form: VocabularyForm,
) -> Result<bool, BoardError> {
    form.validate()?;
    let word = normalize(&form.word);
    if word.is_empty() {
        return Err(BoardError::validation("Word cannot be empty"));
    }

    let txn = state.db.begin().await?;
    let added = state.word_filter.add(&txn, &word).await?;
    if added {
        audit::record(
            &txn,
            actor,
            AuditEntry::new("add_word", "vocabulary", word.as_str()).after(&json!({ "word": word })),
        )
        .await?;
    }
    txn.commit().await?;
    state.word_filter.load(&state.db).await?;

    if added {
        log::info!("Admin {} added a blocked word", actor.admin_username);
    }
    Ok(added)
}

/// Remove a blocked word. Returns false when it was not present.
pub async fn remove_word(
    state: &AppState,
    actor: &AuditActor,
    form: VocabularyForm,
) -> Result<bool, BoardError> {
    form.validate()?;
    let word = normalize(&form.word);

    let txn = state.db.begin().await?;
    let removed = state.word_filter.remove(&txn, &word).await?;
    if removed {
        audit::record(
            &txn,
            actor,
            AuditEntry::new("remove_word", "vocabulary", word.as_str())
                .before(&json!({ "word": word })),
        )
        .await?;
    }
    txn.commit().await?;
    state.word_filter.load(&state.db).await?;

    if removed {
        log::info!("Admin {} removed a blocked word", actor.admin_username);
    }
    Ok(removed)
}
