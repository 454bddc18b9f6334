use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{ConnectOptions, Sqlite, SqlitePool, Transaction};

use crate::{AppError, AppResult};

/// Open the existing catalog database. The file is never created: a
/// missing database is reported as unavailable.
pub async fn open_pool(db_path: &Path) -> AppResult<SqlitePool> {
    if !db_path.exists() {
        return Err(
            AppError::new(AppError::STORE_UNAVAILABLE_CODE, "Database file not found")
                .with_context("path", db_path.display().to_string()),
        );
    }

    let opts = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(false)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .foreign_keys(true)
        .log_statements(log::LevelFilter::Off);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .after_connect(|conn, _| {
            Box::pin(async move {
                sqlx::query("PRAGMA busy_timeout = 5000;")
                    .execute(&mut *conn)
                    .await?;
                Ok::<_, sqlx::Error>(())
            })
        })
        .connect_with(opts)
        .await
        .map_err(|err| {
            AppError::new(AppError::STORE_UNAVAILABLE_CODE, "Failed to open database")
                .with_context("path", db_path.display().to_string())
                .with_cause(err)
        })?;

    log_effective_pragmas(&pool).await;

    Ok(pool)
}

async fn log_effective_pragmas(pool: &SqlitePool) {
    use tracing::{info, warn};

    let (sqlite_ver,): (String,) = sqlx::query_as("select sqlite_version()")
        .fetch_one(pool)
        .await
        .unwrap_or((String::from("unknown"),));

    let jm: (String,) = sqlx::query_as("PRAGMA journal_mode;")
        .fetch_one(pool)
        .await
        .unwrap_or((String::from("unknown"),));

    let fks: (i64,) = sqlx::query_as("PRAGMA foreign_keys;")
        .fetch_one(pool)
        .await
        .unwrap_or((i64::MIN,));

    info!(
        target: "category_reorg",
        event = "db_open",
        sqlite_version = %sqlite_ver,
        journal_mode = %jm.0,
        foreign_keys = %fks.0
    );

    if fks.0 != 1 {
        warn!(
            target: "category_reorg",
            event = "db_open_warning",
            msg = "foreign_keys disabled; integrity of the swap is not enforced by the store"
        );
    }
}

/// Finish a transaction: commit when `outcome` is `Ok`, roll back otherwise.
pub async fn finish_tx<R>(tx: Transaction<'_, Sqlite>, outcome: AppResult<R>) -> AppResult<R> {
    use tracing::{error, info, warn};

    match outcome {
        Ok(value) => {
            tx.commit().await.map_err(|err| {
                AppError::query(err, "Failed to commit transaction").with_context("step", "commit")
            })?;
            info!(target: "category_reorg", event = "db_tx_commit");
            Ok(value)
        }
        Err(err) => {
            if let Err(rb) = tx.rollback().await {
                error!(target: "category_reorg", event = "db_tx_rollback_failed", error = %rb);
            } else {
                warn!(target: "category_reorg", event = "db_tx_rollback", error = %err);
            }
            Err(err)
        }
    }
}
