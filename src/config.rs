//! Runtime settings
//!
//! Database-backed key/value settings with an in-memory cache. Settings are
//! loaded on startup and can be changed from the admin surface without a
//! restart. Only keys in [`KNOWN_SETTINGS`] are accepted.

use crate::orm::settings;
use chrono::Utc;
use dashmap::DashMap;
use sea_orm::{entity::*, query::*, ConnectionTrait, DbErr, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Represents a typed setting value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    String(String),
    Json(serde_json::Value),
}

impl SettingValue {
    /// Parse a string value based on the value_type
    pub fn parse(value: &str, value_type: &str) -> Option<Self> {
        match value_type {
            "string" => Some(SettingValue::String(value.to_string())),
            "int" => value.parse().ok().map(SettingValue::Int),
            "bool" => value.parse().ok().map(SettingValue::Bool),
            "json" => serde_json::from_str(value).ok().map(SettingValue::Json),
            _ => None,
        }
    }

    /// Convert to string representation
    pub fn to_string_value(&self) -> String {
        match self {
            SettingValue::String(s) => s.clone(),
            SettingValue::Int(i) => i.to_string(),
            SettingValue::Bool(b) => b.to_string(),
            SettingValue::Json(j) => j.to_string(),
        }
    }

    /// Get the type name
    pub fn type_name(&self) -> &'static str {
        match self {
            SettingValue::String(_) => "string",
            SettingValue::Int(_) => "int",
            SettingValue::Bool(_) => "bool",
            SettingValue::Json(_) => "json",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SettingValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            SettingValue::String(s) => serde_json::Value::from(s.as_str()),
            SettingValue::Int(i) => serde_json::Value::from(*i),
            SettingValue::Bool(b) => serde_json::Value::from(*b),
            SettingValue::Json(j) => j.clone(),
        }
    }
}

/// A setting the admin surface may change.
#[derive(Debug, Clone, Copy)]
pub struct KnownSetting {
    pub key: &'static str,
    pub value_type: &'static str,
    pub default: SettingDefault,
}

#[derive(Debug, Clone, Copy)]
pub enum SettingDefault {
    Bool(bool),
    Int(i64),
}

impl SettingDefault {
    fn value(&self) -> SettingValue {
        match self {
            SettingDefault::Bool(b) => SettingValue::Bool(*b),
            SettingDefault::Int(i) => SettingValue::Int(*i),
        }
    }
}

const fn int(key: &'static str, default: i64) -> KnownSetting {
    KnownSetting {
        key,
        value_type: "int",
        default: SettingDefault::Int(default),
    }
}

pub const KNOWN_SETTINGS: &[KnownSetting] = &[
    KnownSetting {
        key: "turnstile_enabled",
        value_type: "bool",
        default: SettingDefault::Bool(true),
    },
    int("rate_limit.post.max_requests", 2),
    int("rate_limit.post.window_seconds", 1800),
    int("rate_limit.comment.max_requests", 1),
    int("rate_limit.comment.window_seconds", 10),
    int("rate_limit.report.max_requests", 1),
    int("rate_limit.report.window_seconds", 60),
    int("rate_limit.login.max_requests", 5),
    int("rate_limit.login.window_seconds", 300),
];

pub fn find_known(key: &str) -> Option<&'static KnownSetting> {
    KNOWN_SETTINGS.iter().find(|known| known.key == key)
}

/// Check a submitted JSON value against the registry.
pub fn validate_setting(key: &str, value: &serde_json::Value) -> Result<SettingValue, String> {
    let known = find_known(key).ok_or_else(|| format!("Unknown setting {}", key))?;

    match known.value_type {
        "bool" => value
            .as_bool()
            .map(SettingValue::Bool)
            .ok_or_else(|| format!("{} must be a boolean", key)),
        "int" => match value.as_i64() {
            Some(i) if i >= 1 => Ok(SettingValue::Int(i)),
            _ => Err(format!("{} must be a positive integer", key)),
        },
        other => Err(format!("{} has unsupported type {}", key, other)),
    }
}

/// Current value of one setting, for listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingView {
    pub key: &'static str,
    pub value_type: &'static str,
    pub value: serde_json::Value,
}

/// Configuration manager with caching
pub struct Config {
    settings: DashMap<String, SettingValue>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Create a new empty config
    pub fn new() -> Self {
        Self {
            settings: DashMap::new(),
        }
    }

    /// Load all settings from the database
    pub async fn load_from_database<C: ConnectionTrait>(&self, db: &C) -> Result<(), DbErr> {
        let db_settings = settings::Entity::find().all(db).await?;

        for setting in db_settings {
            match SettingValue::parse(&setting.value, &setting.value_type) {
                Some(value) => {
                    self.settings.insert(setting.key, value);
                }
                None => log::warn!("Skipping unparseable setting {}", setting.key),
            }
        }

        log::info!("Loaded {} settings from database", self.settings.len());

        Ok(())
    }

    /// Get an integer setting
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.settings.get(key).and_then(|v| v.as_int())
    }

    /// Get an integer setting with a default value
    pub fn get_int_or(&self, key: &str, default: i64) -> i64 {
        self.get_int(key).unwrap_or(default)
    }

    /// Get a boolean setting
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.settings.get(key).and_then(|v| v.as_bool())
    }

    /// Get a boolean setting with a default value
    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    /// Current value, falling back to the registry default.
    pub fn current(&self, key: &str) -> Option<SettingValue> {
        self.settings
            .get(key)
            .map(|v| v.value().clone())
            .or_else(|| find_known(key).map(|known| known.default.value()))
    }

    /// Every known setting with its effective value
    pub fn all(&self) -> Vec<SettingView> {
        KNOWN_SETTINGS
            .iter()
            .map(|known| SettingView {
                key: known.key,
                value_type: known.value_type,
                value: self
                    .current(known.key)
                    .map(|v| v.to_json())
                    .unwrap_or(serde_json::Value::Null),
            })
            .collect()
    }

    /// Write a setting value to the database only. The cache is left alone
    /// until [`Config::cache_value`] is called after the write commits.
    /// Returns the effective value before the change.
    pub async fn persist_value<C: ConnectionTrait>(
        &self,
        db: &C,
        key: &str,
        value: &SettingValue,
    ) -> Result<Option<SettingValue>, DbErr> {
        let previous = self.current(key);
        let existing = settings::Entity::find_by_id(key.to_string()).one(db).await?;

        let model = settings::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string_value()),
            value_type: Set(value.type_name().to_string()),
            updated_at: Set(Utc::now().naive_utc()),
        };

        if existing.is_some() {
            model.update(db).await?;
        } else {
            settings::Entity::insert(model).exec(db).await?;
        }

        Ok(previous)
    }

    pub fn cache_value(&self, key: &str, value: SettingValue) {
        self.settings.insert(key.to_string(), value);
    }

    /// Whether challenge verification is switched on at runtime
    pub fn turnstile_enabled(&self) -> bool {
        self.get_bool_or("turnstile_enabled", true)
    }
}

/// Create a new Arc-wrapped Config
pub fn create_config() -> Arc<Config> {
    Arc::new(Config::new())
}
