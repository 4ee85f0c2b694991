use sqlx::{Executor, Sqlite};
use uuid::Uuid;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// User Repository
// ============================================================================

pub struct UserRepository;

impl UserRepository {
    pub async fn create<'e, E>(db: E, user: &CreateUser) -> AppResult<User>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().naive_utc();

        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, name, email, password_hash, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, name, email, password_hash, created_at
            "#,
        )
        .bind(id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(now)
        // drain the statement so the autocommit insert is done before returning
        .fetch_all(db)
        .await
        .map_err(AppError::Database)?
        .pop()
        .ok_or(AppError::Database(sqlx::Error::RowNotFound))
    }

    pub async fn find_by_id<'e, E>(db: E, id: &str) -> AppResult<Option<User>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await
        .map_err(AppError::Database)
    }

    /// Emails are stored lower-cased, so lookups are case-insensitive.
    pub async fn find_by_email<'e, E>(db: E, email: &str) -> AppResult<Option<User>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, created_at
            FROM users
            WHERE email = ?
            "#,
        )
        .bind(email.trim().to_lowercase())
        .fetch_optional(db)
        .await
        .map_err(AppError::Database)
    }
}
