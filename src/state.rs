//! Shared application state handed to every handler.

use crate::app_config::{AdminConfig, AppConfig, LimitsConfig};
use crate::captcha::ChallengeVerifier;
use crate::config::Config;
use crate::identity::FingerprintHasher;
use crate::presence::{InMemoryPresence, PresenceTracker};
use crate::rate_limit::{RateLimitPolicy, SlidingWindowLimiter, Throttle};
use crate::word_filter::WordFilter;
use sea_orm::{DatabaseConnection, DbErr};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    /// Runtime settings, changed from the admin surface
    pub settings: Arc<Config>,
    pub throttle: Arc<Throttle>,
    pub presence: Arc<dyn PresenceTracker>,
    pub challenge: Arc<dyn ChallengeVerifier>,
    pub hasher: FingerprintHasher,
    pub word_filter: Arc<WordFilter>,
    pub admin: AdminConfig,
    pub limits: LimitsConfig,
}

impl AppState {
    pub fn new(
        db: DatabaseConnection,
        config: &AppConfig,
        settings: Arc<Config>,
        throttle: Arc<Throttle>,
        presence: Arc<dyn PresenceTracker>,
        challenge: Arc<dyn ChallengeVerifier>,
        word_filter: Arc<WordFilter>,
    ) -> Self {
        Self {
            db,
            settings,
            throttle,
            presence,
            challenge,
            hasher: FingerprintHasher::new(&config.identity.fingerprint_salt),
            word_filter,
            admin: config.admin.clone(),
            limits: config.limits.clone(),
        }
    }

    /// Load settings and vocabulary from the database and wire up the
    /// in-process limiter and presence tracker.
    pub async fn bootstrap(
        db: DatabaseConnection,
        config: &AppConfig,
        challenge: Arc<dyn ChallengeVerifier>,
    ) -> Result<Self, DbErr> {
        let settings = crate::config::create_config();
        settings.load_from_database(&db).await?;

        let word_filter = Arc::new(WordFilter::new());
        word_filter.load(&db).await?;

        let throttle = Arc::new(Throttle::new(
            Arc::new(SlidingWindowLimiter::new()),
            RateLimitPolicy::from_config(&settings),
        ));

        if config.identity.fingerprint_salt.is_empty() {
            log::warn!("No fingerprint salt configured, using the development salt");
        }

        Ok(Self::new(
            db,
            config,
            settings,
            throttle,
            Arc::new(InMemoryPresence::new()),
            challenge,
            word_filter,
        ))
    }
}
