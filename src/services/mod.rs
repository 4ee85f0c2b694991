pub mod auth;
pub mod init;
pub mod slots;
pub mod swaps;

use sqlx::SqlitePool;

use crate::db::WriteTx;
use crate::error::{AppError, AppResult, SwapError};

/// Open the write transaction every mutating operation runs in. Waiting out
/// the busy timeout behind another writer is reported as `SlotLocked`.
pub(crate) async fn begin_write(db: &SqlitePool) -> AppResult<WriteTx> {
    WriteTx::begin(db)
        .await
        .map_err(|e| AppError::from(e).or_lost_race(SwapError::SlotLocked))
}
