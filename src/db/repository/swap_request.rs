use futures::stream::{BoxStream, TryStreamExt};
use sqlx::{Executor, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Swap Request Repository
// ============================================================================

const REQUEST_COLUMNS: &str = "id, requester_slot_id, target_slot_id, requester_id, \
     target_user_id, status, created_at, updated_at";

// Spliced with `concat!` into the `'static` listing queries.
macro_rules! view_select {
    () => {
        r#"
    SELECT
        r.id, r.requester_slot_id, r.target_slot_id, r.requester_id,
        r.target_user_id, r.status, r.created_at, r.updated_at,
        rs.title as requester_slot_title,
        rs.start_time as requester_slot_start,
        rs.end_time as requester_slot_end,
        ts.title as target_slot_title,
        ts.start_time as target_slot_start,
        ts.end_time as target_slot_end,
        ru.name as requester_name,
        tu.name as target_user_name
    FROM swap_requests r
    JOIN slots rs ON rs.id = r.requester_slot_id
    JOIN slots ts ON ts.id = r.target_slot_id
    JOIN users ru ON ru.id = r.requester_id
    JOIN users tu ON tu.id = r.target_user_id
"#
    };
}

pub struct SwapRequestRepository;

impl SwapRequestRepository {
    /// Insert a PENDING request. The partial unique indexes reject a second
    /// PENDING request on either slot.
    pub async fn create<'e, E>(
        db: E,
        requester_slot: &Slot,
        target_slot: &Slot,
    ) -> AppResult<SwapRequest>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().naive_utc();

        sqlx::query_as::<_, SwapRequest>(&format!(
            r#"
            INSERT INTO swap_requests (
                id, requester_slot_id, target_slot_id, requester_id, target_user_id,
                status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&requester_slot.id)
        .bind(&target_slot.id)
        .bind(&requester_slot.owner_id)
        .bind(&target_slot.owner_id)
        .bind(SwapRequestStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        // drain the statement so the autocommit insert is done before returning
        .fetch_all(db)
        .await
        .map_err(AppError::Database)?
        .pop()
        .ok_or(AppError::Database(sqlx::Error::RowNotFound))
    }

    pub async fn find_by_id<'e, E>(db: E, id: &str) -> AppResult<Option<SwapRequest>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, SwapRequest>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM swap_requests WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(db)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_view_by_id<'e, E>(db: E, id: &str) -> AppResult<Option<SwapRequestView>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, SwapRequestView>(concat!(view_select!(), " WHERE r.id = ?"))
            .bind(id)
            .fetch_optional(db)
            .await
            .map_err(AppError::Database)
    }

    /// PENDING → `to`. Returns `false` if the request was no longer PENDING.
    pub async fn resolve<'e, E>(db: E, id: &str, to: SwapRequestStatus) -> AppResult<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = chrono::Utc::now().naive_utc();
        let result = sqlx::query(
            "UPDATE swap_requests SET status = ?, updated_at = ? WHERE id = ? AND status = 'PENDING'",
        )
        .bind(to.as_str())
        .bind(now)
        .bind(id)
        .execute(db)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    /// PENDING requests other than `except_id` that reference either slot.
    pub async fn find_pending_referencing<'e, E>(
        db: E,
        first_slot_id: &str,
        second_slot_id: &str,
        except_id: &str,
    ) -> AppResult<Vec<SwapRequest>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, SwapRequest>(&format!(
            r#"
            SELECT {REQUEST_COLUMNS}
            FROM swap_requests
            WHERE status = 'PENDING'
              AND id <> ?
              AND (requester_slot_id IN (?, ?) OR target_slot_id IN (?, ?))
            "#
        ))
        .bind(except_id)
        .bind(first_slot_id)
        .bind(second_slot_id)
        .bind(first_slot_id)
        .bind(second_slot_id)
        .fetch_all(db)
        .await
        .map_err(AppError::Database)
    }

    /// Lazily stream requests addressed to `user_id` (as owner of the target
    /// slot when they were proposed), newest first.
    pub fn stream_incoming<'a>(
        pool: &'a SqlitePool,
        user_id: &'a str,
    ) -> BoxStream<'a, Result<SwapRequestView, sqlx::Error>> {
        sqlx::query_as::<_, SwapRequestView>(concat!(
            view_select!(),
            " WHERE r.target_user_id = ? ORDER BY r.created_at DESC, r.rowid DESC"
        ))
        .bind(user_id)
        .fetch(pool)
    }

    /// Lazily stream requests made by `user_id`, newest first.
    pub fn stream_outgoing<'a>(
        pool: &'a SqlitePool,
        user_id: &'a str,
    ) -> BoxStream<'a, Result<SwapRequestView, sqlx::Error>> {
        sqlx::query_as::<_, SwapRequestView>(concat!(
            view_select!(),
            " WHERE r.requester_id = ? ORDER BY r.created_at DESC, r.rowid DESC"
        ))
        .bind(user_id)
        .fetch(pool)
    }

    pub async fn list_incoming(pool: &SqlitePool, user_id: &str) -> AppResult<Vec<SwapRequestView>> {
        Self::stream_incoming(pool, user_id)
            .try_collect()
            .await
            .map_err(AppError::Database)
    }

    pub async fn list_outgoing(pool: &SqlitePool, user_id: &str) -> AppResult<Vec<SwapRequestView>> {
        Self::stream_outgoing(pool, user_id)
            .try_collect()
            .await
            .map_err(AppError::Database)
    }
}
