//! SQLite persistence for gifpress.
//!
//! A single process owns the database file. WAL journal mode keeps readers
//! non-blocking while writes serialize through the pool.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub mod models;
pub mod repositories;

pub type DbPool = sqlx::SqlitePool;

/// How long a writer waits on the database lock before erroring.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a connection pool on the database file, creating it if missing.
pub async fn create_pool(database_path: &str) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{database_path}"))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await
}

/// Create an in-memory pool for tests.
///
/// Limited to a single connection because every in-memory connection is its
/// own database.
pub async fn connect_memory() -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// Apply the embedded schema. Every statement is idempotent, so this runs
/// unconditionally at startup.
pub async fn init_schema(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(include_str!("schema.sql")).execute(pool).await?;
    Ok(())
}

/// Verify the database responds to a trivial query.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
