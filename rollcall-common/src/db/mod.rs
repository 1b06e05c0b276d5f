//! Database access for rollcall
//!
//! Shared SQLite schema and pool initialization. The attendance table
//! carries the engine's central consistency invariant as a unique index:
//! at most one record per (student_id, session_id, day).

use crate::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Connects to rollcall.db in the root folder, creating it if missing,
/// and brings the schema up.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Use proper SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the rollcall tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS students (
            student_id TEXT PRIMARY KEY,
            full_name TEXT,
            embedding TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cohorts (
            cohort_id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS enrollments (
            enrollment_id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id TEXT NOT NULL,
            cohort_id INTEGER NOT NULL,
            enrolled_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(student_id, cohort_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            session_id INTEGER PRIMARY KEY AUTOINCREMENT,
            instructor_id TEXT NOT NULL,
            cohort_id INTEGER NOT NULL,
            course_id INTEGER NOT NULL,
            day TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // The unique(student_id, session_id, day) constraint is the storage-layer
    // backstop for the smart upsert: concurrent appliers merge via ON CONFLICT
    // instead of duplicating rows.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS attendance (
            record_id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id TEXT NOT NULL,
            session_id INTEGER NOT NULL,
            day TEXT NOT NULL,
            recorded_at TEXT NOT NULL,
            method TEXT NOT NULL,
            appearance_count INTEGER NOT NULL DEFAULT 0,
            dominant_affect TEXT,
            evidence_path TEXT,
            disputed INTEGER NOT NULL DEFAULT 0,
            dispute_reason TEXT,
            task_id TEXT,
            UNIQUE(student_id, session_id, day)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS video_tasks (
            task_id TEXT PRIMARY KEY,
            instructor_id TEXT NOT NULL,
            session_id INTEGER,
            status TEXT NOT NULL DEFAULT 'queued',
            progress_percent INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            closed INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!(
        "Database tables initialized (students, cohorts, enrollments, sessions, attendance, video_tasks)"
    );

    Ok(())
}
