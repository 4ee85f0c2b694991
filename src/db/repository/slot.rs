use futures::stream::{BoxStream, TryStreamExt};
use sqlx::{Executor, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Slot Repository
// ============================================================================

const SLOT_COLUMNS: &str =
    "id, owner_id, title, start_time, end_time, status, created_at, updated_at";

pub struct SlotRepository;

impl SlotRepository {
    /// Insert a new slot owned by `owner_id`. Slots always start out BUSY.
    pub async fn create<'e, E>(db: E, owner_id: &str, slot: &CreateSlot) -> AppResult<Slot>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().naive_utc();

        sqlx::query_as::<_, Slot>(&format!(
            r#"
            INSERT INTO slots (
                id, owner_id, title, start_time, end_time, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {SLOT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(owner_id)
        .bind(&slot.title)
        .bind(slot.start_time)
        .bind(slot.end_time)
        .bind(SlotStatus::Busy.as_str())
        .bind(now)
        .bind(now)
        // drain the statement so the autocommit insert is done before returning
        .fetch_all(db)
        .await
        .map_err(AppError::Database)?
        .pop()
        .ok_or(AppError::Database(sqlx::Error::RowNotFound))
    }

    pub async fn find_by_id<'e, E>(db: E, id: &str) -> AppResult<Option<Slot>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Slot>(&format!("SELECT {SLOT_COLUMNS} FROM slots WHERE id = ?"))
            .bind(id)
            .fetch_optional(db)
            .await
            .map_err(AppError::Database)
    }

    /// All slots owned by a user, earliest first.
    pub async fn list_by_owner<'e, E>(db: E, owner_id: &str) -> AppResult<Vec<Slot>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Slot>(&format!(
            r#"
            SELECT {SLOT_COLUMNS}
            FROM slots
            WHERE owner_id = ?
            ORDER BY start_time ASC, id ASC
            "#
        ))
        .bind(owner_id)
        .fetch_all(db)
        .await
        .map_err(AppError::Database)
    }

    /// Lazily stream every SWAPPABLE slot not owned by `excluding_user_id`,
    /// earliest first. Each call re-runs the query.
    pub fn stream_swappable<'a>(
        pool: &'a SqlitePool,
        excluding_user_id: &'a str,
    ) -> BoxStream<'a, Result<SlotWithOwner, sqlx::Error>> {
        sqlx::query_as::<_, SlotWithOwner>(
            r#"
            SELECT
                s.id, s.owner_id, s.title, s.start_time, s.end_time, s.status,
                s.created_at, s.updated_at,
                u.name as owner_name,
                u.email as owner_email
            FROM slots s
            JOIN users u ON u.id = s.owner_id
            WHERE s.status = 'SWAPPABLE' AND s.owner_id <> ?
            ORDER BY s.start_time ASC, s.id ASC
            "#,
        )
        .bind(excluding_user_id)
        .fetch(pool)
    }

    pub async fn list_swappable(
        pool: &SqlitePool,
        excluding_user_id: &str,
    ) -> AppResult<Vec<SlotWithOwner>> {
        Self::stream_swappable(pool, excluding_user_id)
            .try_collect()
            .await
            .map_err(AppError::Database)
    }

    /// Move a slot from `from` to `to`. Returns `false` when the slot is not
    /// currently in `from` (or does not exist), leaving it untouched.
    pub async fn transition_status<'e, E>(
        db: E,
        id: &str,
        from: SlotStatus,
        to: SlotStatus,
    ) -> AppResult<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = chrono::Utc::now().naive_utc();
        let result = sqlx::query(
            "UPDATE slots SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(now)
        .bind(id)
        .bind(from.as_str())
        .execute(db)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    /// Move both slots from `from` to `to`. Returns the number of slots that
    /// were actually in `from`; callers inside a transaction roll back unless
    /// it is 2.
    pub async fn transition_pair<'e, E>(
        db: E,
        first_id: &str,
        second_id: &str,
        from: SlotStatus,
        to: SlotStatus,
    ) -> AppResult<u64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = chrono::Utc::now().naive_utc();
        let result = sqlx::query(
            "UPDATE slots SET status = ?, updated_at = ? WHERE id IN (?, ?) AND status = ?",
        )
        .bind(to.as_str())
        .bind(now)
        .bind(first_id)
        .bind(second_id)
        .bind(from.as_str())
        .execute(db)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }

    /// Exchange the owners of two SWAP_PENDING slots and reset both to BUSY.
    /// Returns the number of slots updated (2 on success).
    pub async fn exchange_owners<'e, E>(db: E, first: &Slot, second: &Slot) -> AppResult<u64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = chrono::Utc::now().naive_utc();
        let result = sqlx::query(
            r#"
            UPDATE slots
            SET owner_id = CASE id WHEN ? THEN ? ELSE ? END,
                status = 'BUSY',
                updated_at = ?
            WHERE id IN (?, ?) AND status = 'SWAP_PENDING'
            "#,
        )
        .bind(&first.id)
        .bind(&second.owner_id)
        .bind(&first.owner_id)
        .bind(now)
        .bind(&first.id)
        .bind(&second.id)
        .execute(db)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }

    /// Write the merged fields of a slot, provided it is still in
    /// `expected_status`. Returns `None` if the status moved underneath us.
    pub async fn update_if_status<'e, E>(
        db: E,
        slot: &Slot,
        expected_status: SlotStatus,
    ) -> AppResult<Option<Slot>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = chrono::Utc::now().naive_utc();
        sqlx::query_as::<_, Slot>(&format!(
            r#"
            UPDATE slots
            SET title = ?, start_time = ?, end_time = ?, status = ?, updated_at = ?
            WHERE id = ? AND status = ?
            RETURNING {SLOT_COLUMNS}
            "#
        ))
        .bind(&slot.title)
        .bind(slot.start_time)
        .bind(slot.end_time)
        .bind(slot.status.as_str())
        .bind(now)
        .bind(&slot.id)
        .bind(expected_status.as_str())
        .fetch_all(db)
        .await
        .map(|mut rows| rows.pop())
        .map_err(AppError::Database)
    }

    /// Delete a slot unless it is locked by a pending swap.
    /// Returns `false` if nothing was deleted.
    pub async fn delete_unlocked<'e, E>(db: E, id: &str) -> AppResult<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM slots WHERE id = ? AND status <> 'SWAP_PENDING'")
            .bind(id)
            .execute(db)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }
}
