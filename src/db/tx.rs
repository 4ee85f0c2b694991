use std::ops::{Deref, DerefMut};

use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

/// A transaction opened with `BEGIN IMMEDIATE`.
///
/// The write lock is taken before the first read, so a read-then-write
/// sequence never has to upgrade a stale snapshot. Concurrent writers queue
/// on the connection's busy timeout instead of failing with SQLITE_BUSY
/// halfway through.
///
/// Dropping it without [`WriteTx::commit`] rolls back.
pub struct WriteTx {
    conn: Option<PoolConnection<Sqlite>>,
}

impl WriteTx {
    pub async fn begin(pool: &SqlitePool) -> Result<Self, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(Self { conn: Some(conn) })
    }

    pub async fn commit(mut self) -> Result<(), sqlx::Error> {
        if let Some(conn) = self.conn.as_deref_mut() {
            sqlx::query("COMMIT").execute(conn).await?;
        }
        // committed: hand the connection back as is
        self.conn.take();
        Ok(())
    }
}

impl Deref for WriteTx {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        self.conn
            .as_deref()
            .expect("WriteTx used after commit")
    }
}

impl DerefMut for WriteTx {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_deref_mut()
            .expect("WriteTx used after commit")
    }
}

impl Drop for WriteTx {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                        tracing::warn!("Rollback failed, closing connection: {}", e);
                        let _ = conn.close().await;
                    }
                });
            }
            // closing the connection rolls back the open transaction
            Err(_) => drop(conn.detach()),
        }
    }
}
