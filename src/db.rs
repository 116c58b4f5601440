//! Database connection and schema bootstrap

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use std::time::Duration;

const SCHEMA: &str = include_str!("../migrations/0001_init.sql");

/// Open the SQLite store.
///
/// The pool holds exactly one connection, so every transaction is serialized
/// behind the previous one. Read-then-write counter updates rely on this.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(database_url.to_owned());
    options
        .max_connections(1)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .sqlx_logging(false);

    Database::connect(options).await
}

/// Create every table that does not exist yet.
pub async fn init_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();

    for statement in SCHEMA.split(';') {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        db.execute(Statement::from_string(backend, statement.to_owned()))
            .await?;
    }

    log::info!("Database schema ready");
    Ok(())
}

/// Connect and bootstrap in one step.
pub async fn init_db(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = connect(database_url).await?;
    init_schema(&db).await?;
    Ok(db)
}
