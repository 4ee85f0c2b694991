//! SQLite persistence: models and repositories.

pub mod models;
pub mod repository;
pub mod tx;

pub use models::*;
pub use repository::*;
pub use tx::WriteTx;

/// Whether a database error means another writer got there first: a busy or
/// locked database, or a violated unique index (e.g. the one-PENDING-request
/// per slot constraint).
pub fn is_write_conflict(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation()
                || matches!(db_err.code().as_deref(), Some("5") | Some("6") | Some("517"))
        }
        _ => false,
    }
}

/// Fresh in-memory database with migrations applied.
///
/// A single connection keeps every query on the same in-memory database.
#[cfg(test)]
pub async fn test_pool() -> sqlx::SqlitePool {
    use std::str::FromStr;

    let options = sqlx::sqlite::SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("valid in-memory url")
        .foreign_keys(true);
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("connect to in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    pool
}

/// File-backed WAL database with several pooled connections, opened the same
/// way as in production. Concurrent writers really contend here.
#[cfg(test)]
pub async fn test_file_pool() -> sqlx::SqlitePool {
    let dir = std::env::temp_dir().join(format!("slot-swapper-{}", uuid::Uuid::new_v4()));
    let mut config = crate::config::Config::default();
    config.database.url = format!("sqlite://{}", dir.join("test.db").display());
    config.database.max_connections = 8;

    crate::services::init::init_db(&config)
        .await
        .expect("open file-backed test database")
}
