//! Application configuration from file and environment variables
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Environment variables (prefixed with RUMORMILL_, sections split by `__`)
//! 2. Config file (rumormill.toml)
//! 3. Default values
//!
//! Secrets like the admin password hash, session secret, Turnstile secret and
//! fingerprint salt should be kept in environment variables, not in the file.

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub database_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            database_url: "sqlite://rumormill.db?mode=rwc".to_string(),
        }
    }
}

/// Site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub name: String,
    /// Only used by the static snapshot generator.
    pub base_url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: "Rumormill".to_string(),
            base_url: "http://localhost:8080".to_string(),
        }
    }
}

/// Admin surface configuration. All three values must be set for the admin
/// routes to exist at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub username: String,
    /// Argon2 PHC string, see the `hash_password` binary
    pub password_hash: String,
    /// Session cookie signing key (RUMORMILL_ADMIN__SESSION_SECRET), at least 64 bytes
    pub session_secret: String,
}

/// Shortest session secret accepted as a cookie signing key.
pub const MIN_SESSION_SECRET_LEN: usize = 64;

impl AdminConfig {
    /// All three values set, with a secret long enough to sign cookies.
    pub fn is_enabled(&self) -> bool {
        !self.username.is_empty()
            && !self.password_hash.is_empty()
            && self.session_secret.len() >= MIN_SESSION_SECRET_LEN
    }
}

/// Cloudflare Turnstile configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnstileConfig {
    /// Public site key (can be in config file)
    pub site_key: String,
    /// Secret key (should be in env var RUMORMILL_TURNSTILE__SECRET_KEY).
    /// Empty disables verification entirely.
    pub secret_key: String,
    pub verify_url: String,
    pub timeout_seconds: u64,
}

impl Default for TurnstileConfig {
    fn default() -> Self {
        Self {
            site_key: String::new(),
            secret_key: String::new(),
            verify_url: "https://challenges.cloudflare.com/turnstile/v0/siteverify".to_string(),
            timeout_seconds: 5,
        }
    }
}

/// Identity derivation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// HMAC key for client fingerprints (RUMORMILL_IDENTITY__FINGERPRINT_SALT)
    pub fingerprint_salt: String,
}

/// Content limits configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_post_length: usize,
    pub max_comment_length: usize,
    pub max_report_reason_length: usize,
    pub max_tags: usize,
    pub max_tag_length: usize,
    /// Upper bound on ids accepted by one batch action
    pub max_batch_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_post_length: 2000,
            max_comment_length: 500,
            max_report_reason_length: 200,
            max_tags: 5,
            max_tag_length: 20,
            max_batch_size: 100,
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub site: SiteConfig,
    pub admin: AdminConfig,
    pub turnstile: TurnstileConfig,
    pub identity: IdentityConfig,
    pub limits: LimitsConfig,
}

impl AppConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("rumormill.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::new(path, FileFormat::Toml).required(false))
            // e.g. RUMORMILL_ADMIN__USERNAME, RUMORMILL_LIMITS__MAX_POST_LENGTH
            .add_source(
                Environment::with_prefix("RUMORMILL")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        app_config.log_warnings();
        Ok(app_config)
    }

    fn log_warnings(&self) {
        if self.identity.fingerprint_salt.is_empty() {
            log::warn!("identity.fingerprint_salt is not set; fingerprint hashes use a development salt and are not private.");
        }
        if !self.admin.is_enabled() {
            log::warn!("Admin username, password hash or session secret missing; the admin surface is disabled.");
        }
        if self.turnstile.secret_key.is_empty() {
            log::warn!("Turnstile secret key missing; challenge verification is disabled.");
        }
    }
}
