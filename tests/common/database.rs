//! Test database setup
#![allow(dead_code)]

use sea_orm::DatabaseConnection;

/// Fresh in-memory store with the full schema.
///
/// The pool keeps its single connection open, so the database lives exactly
/// as long as the returned handle.
pub async fn setup_test_database() -> DatabaseConnection {
    rumormill::db::init_db("sqlite::memory:")
        .await
        .expect("Failed to initialize test database")
}
