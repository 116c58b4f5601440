pub mod admin;
pub mod csrf;

pub use admin::AdminCtx;
