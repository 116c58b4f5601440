pub mod access;
pub mod admin;
pub mod announcements;
pub mod comments;
pub mod notifications;
pub mod posts;
pub mod reports;

use crate::error::BoardError;
use actix_web::web::{JsonConfig, QueryConfig};

/// Malformed JSON bodies answer 400 with the usual error body.
pub fn json_config() -> JsonConfig {
    JsonConfig::default()
        .limit(64 * 1024)
        .error_handler(|err, _req| BoardError::validation(format!("Invalid request body: {}", err)).into())
}

/// Malformed query strings answer 400 with the usual error body.
pub fn query_config() -> QueryConfig {
    QueryConfig::default()
        .error_handler(|err, _req| BoardError::validation(format!("Invalid query: {}", err)).into())
}

/// Configures the web app by adding services from each web file.
///
/// @see https://docs.rs/actix-web/4.0.1/actix_web/struct.App.html#method.configure
pub fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.app_data(json_config()).app_data(query_config());

    // Order is important. Route resolution will stop at the first match, so
    // fixed paths like /posts/feed come before /posts/{id}.
    posts::configure(conf);
    comments::configure(conf);
    reports::configure(conf);
    access::configure(conf);
    notifications::configure(conf);
    announcements::configure(conf);
    admin::configure(conf);
}
