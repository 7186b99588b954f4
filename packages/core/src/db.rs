//! SQLite pool construction and schema.
//!
//! `care_plans` carries a partial unique index so that at most one plan per
//! (patient, hospital) pair can be active at a time. Writers serialize on
//! SQLite's write lock (see [`crate::repository::CareRepository::begin`]) and
//! the index backs that up, not any in-process lock.
//!
//! File databases run in WAL mode with a busy timeout so that readers never
//! block the writer and queued writers wait for the lock.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS care_plans (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        patient_id INTEGER NOT NULL,
        hospital_id INTEGER NOT NULL,
        active INTEGER NOT NULL DEFAULT 1,
        next_due_at TEXT,
        body TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS care_plans_one_active
        ON care_plans (patient_id, hospital_id) WHERE active = 1",
    "CREATE TABLE IF NOT EXISTS observations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        care_plan_id INTEGER NOT NULL REFERENCES care_plans (id),
        observation_time TEXT NOT NULL,
        documented_at TEXT NOT NULL,
        supersedes_id INTEGER REFERENCES observations (id),
        body TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS observations_by_plan
        ON observations (care_plan_id, observation_time)",
    "CREATE TABLE IF NOT EXISTS alert_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        observation_id INTEGER NOT NULL,
        care_plan_id INTEGER NOT NULL,
        alert_type TEXT NOT NULL,
        severity TEXT NOT NULL,
        code TEXT NOT NULL,
        message TEXT NOT NULL,
        recipient_id INTEGER NOT NULL,
        recipient_kind TEXT NOT NULL,
        delivered INTEGER NOT NULL DEFAULT 0,
        triggered_at TEXT NOT NULL
    )",
    // Directory tables are owned by the registration system; created here so
    // a standalone database is usable.
    "CREATE TABLE IF NOT EXISTS patients (
        id INTEGER PRIMARY KEY,
        display_name TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS hospitals (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS registrations (
        id INTEGER PRIMARY KEY,
        patient_id INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS staff (
        id INTEGER PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        display_name TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        display_name TEXT NOT NULL
    )",
];

/// How long a writer waits for another connection's write lock.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a pool for `database_url` and apply the schema.
///
/// In-memory databases live only as long as their connection, so they get a
/// single connection that is never recycled.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
    let pool = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(
                options
                    .journal_mode(SqliteJournalMode::Wal)
                    .busy_timeout(BUSY_TIMEOUT),
            )
            .await?
    };

    apply_schema(&pool).await?;
    Ok(pool)
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::debug!("Schema applied ({} statements)", SCHEMA.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    #[tokio::test]
    async fn memory_pool_has_all_tables() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let rows = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table'")
            .fetch_all(&pool)
            .await
            .unwrap();
        let names: Vec<String> = rows.iter().map(|r| r.get::<String, _>("name")).collect();

        for table in ["care_plans", "observations", "alert_events", "patients", "staff"] {
            assert!(names.iter().any(|n| n == table), "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn file_pool_uses_wal_journal() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("care.db").display());
        let pool = create_pool(&url).await.unwrap();

        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[tokio::test]
    async fn schema_is_idempotent() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        assert!(apply_schema(&pool).await.is_ok());
    }
}
