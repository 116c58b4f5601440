//! Anonymous confession board with a moderation backend.
//!
//! The interesting parts live in the abuse-control modules: [`identity`],
//! [`ban`], [`rate_limit`], [`reports`], [`moderation`] and [`audit`]. The
//! [`web`] module wires them to HTTP.

pub mod admin;
pub mod announcements;
pub mod app_config;
pub mod audit;
pub mod ban;
pub mod captcha;
pub mod comments;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod identity;
pub mod middleware;
pub mod moderation;
pub mod notifications;
pub mod orm;
pub mod posts;
pub mod presence;
pub mod rate_limit;
pub mod reactions;
pub mod reports;
pub mod state;
pub mod stats;
pub mod web;
pub mod word_filter;

pub use error::BoardError;
pub use state::AppState;
