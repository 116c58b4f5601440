use actix_session::{config::PersistentSession, storage::CookieSessionStore, SessionMiddleware};
use actix_web::cookie::{Key, SameSite};
use actix_web::http::header;
use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use anyhow::Context;
use env_logger::Env;
use rand::{distributions::Alphanumeric, Rng};
use rumormill::app_config::{AppConfig, MIN_SESSION_SECRET_LEN};
use rumormill::captcha::TurnstileVerifier;
use rumormill::db::init_db;
use rumormill::AppState;
use std::sync::Arc;
use std::time::Duration;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_lib_mods();

    let config = AppConfig::load().context("Failed to load configuration")?;
    let db = init_db(&config.server.database_url)
        .await
        .context("Failed to open the database")?;

    let challenge = Arc::new(
        TurnstileVerifier::new(&config.turnstile).context("Failed to build the HTTP client")?,
    );
    let state = AppState::bootstrap(db, &config, challenge)
        .await
        .context("Failed to load settings from the database")?;

    if state.admin.is_enabled() {
        log::info!("Admin surface enabled for {}", state.admin.username);
    } else {
        log::warn!("Admin credentials are incomplete; the admin surface is disabled");
    }

    let secret_key = if config.admin.session_secret.len() >= MIN_SESSION_SECRET_LEN {
        Key::from(config.admin.session_secret.as_bytes())
    } else {
        let random_string: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(128)
            .map(char::from)
            .collect();
        log::warn!("Session secret is missing or shorter than 64 bytes.\r\nThis means the key used for signing session cookies will invalidate every time the application is restarted.\r\n\r\nNeed a key? How about:\r\n{}", random_string);
        Key::from(random_string.as_bytes())
    };

    // Spawn in-memory cleanup task
    let throttle = state.throttle.clone();
    actix_web::rt::spawn(async move {
        let mut interval = actix_web::rt::time::interval(Duration::from_secs(300)); // Every 5 minutes
        loop {
            interval.tick().await;
            throttle.cleanup();
            log::debug!("Rate limiter cleanup completed");
        }
    });

    let bind = config.server.bind.clone();
    log::info!("Listening on {}", bind);

    HttpServer::new(move || {
        // Order of middleware IS IMPORTANT and is in REVERSE EXECUTION ORDER.
        App::new()
            .app_data(Data::new(state.clone()))
            // Security headers - applied to all responses
            .wrap(
                DefaultHeaders::new()
                    .add((header::X_FRAME_OPTIONS, "DENY"))
                    .add((header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
                    .add(("Referrer-Policy", "strict-origin-when-cross-origin")),
            )
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), secret_key.clone())
                    .cookie_same_site(SameSite::Lax)
                    .cookie_secure(false) // Allow HTTP for development
                    .session_lifecycle(PersistentSession::default())
                    .build(),
            )
            .wrap(Logger::new("%a %r %s %Dms"))
            .configure(rumormill::web::configure)
    })
    .bind(bind)?
    .run()
    .await?;

    Ok(())
}

/// Initialize third party crates we rely on but don't have control over.
pub fn init_lib_mods() {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
}
