//! Video analysis task tracking
//!
//! One row per submitted recording. Status advances queued -> processing ->
//! completed/failed; progress only ever moves forward so pollers never see
//! it bounce backwards when updates land out of order.

use rollcall_common::{Error, Result};
use serde::Serialize;
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Lifecycle state of a video analysis task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

/// One row of the video_tasks table
#[derive(Debug, Clone, Serialize)]
pub struct VideoTask {
    pub task_id: String,
    pub instructor_id: String,
    pub session_id: Option<i64>,
    pub status: String,
    pub progress_percent: i64,
    pub error: Option<String>,
    pub closed: bool,
    pub created_at: String,
}

fn from_row(row: sqlx::sqlite::SqliteRow) -> VideoTask {
    VideoTask {
        task_id: row.get("task_id"),
        instructor_id: row.get("instructor_id"),
        session_id: row.get("session_id"),
        status: row.get("status"),
        progress_percent: row.get("progress_percent"),
        error: row.get("error"),
        closed: row.get::<i64, _>("closed") != 0,
        created_at: row.get("created_at"),
    }
}

/// Register a new task in the queued state
pub async fn create_task(
    pool: &SqlitePool,
    task_id: &str,
    instructor_id: &str,
    session_id: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO video_tasks (task_id, instructor_id, session_id) VALUES (?, ?, ?)",
    )
    .bind(task_id)
    .bind(instructor_id)
    .bind(session_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Load a task, erroring with NotFound when absent
pub async fn get_task(pool: &SqlitePool, task_id: &str) -> Result<VideoTask> {
    let row = sqlx::query(
        "SELECT task_id, instructor_id, session_id, status, progress_percent, error, closed, created_at \
         FROM video_tasks WHERE task_id = ?",
    )
    .bind(task_id)
    .fetch_optional(pool)
    .await?;
    row.map(from_row)
        .ok_or_else(|| Error::NotFound(format!("Task {task_id}")))
}

/// Set the task status
pub async fn set_status(conn: &mut SqliteConnection, task_id: &str, status: TaskStatus) -> Result<()> {
    sqlx::query("UPDATE video_tasks SET status = ? WHERE task_id = ?")
        .bind(status.as_str())
        .bind(task_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Mark a task failed with a human-readable error
pub async fn set_failed(pool: &SqlitePool, task_id: &str, error: &str) -> Result<()> {
    sqlx::query("UPDATE video_tasks SET status = 'failed', error = ? WHERE task_id = ?")
        .bind(error)
        .bind(task_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Advance task progress. MAX() keeps progress monotonic: a stale or
/// reordered update can never lower the stored percentage.
pub async fn update_progress(pool: &SqlitePool, task_id: &str, percent: i64) -> Result<()> {
    let percent = percent.clamp(0, 100);
    sqlx::query(
        "UPDATE video_tasks SET progress_percent = MAX(progress_percent, ?) WHERE task_id = ?",
    )
    .bind(percent)
    .bind(task_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Mark every task for a session closed. Part of the session close
/// transaction; the flag records which runs belong to a closed-out
/// session-day, independent of their processing status.
pub async fn mark_closed_for_session(conn: &mut SqliteConnection, session_id: i64) -> Result<()> {
    sqlx::query("UPDATE video_tasks SET closed = 1 WHERE session_id = ?")
        .bind(session_id)
        .execute(conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_common::db::init_tables;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_tables(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_task_lifecycle() {
        let pool = memory_pool().await;
        create_task(&pool, "t1", "D1", 1).await.unwrap();

        let task = get_task(&pool, "t1").await.unwrap();
        assert_eq!(task.status, "queued");
        assert_eq!(task.progress_percent, 0);
        assert!(!task.closed);

        let mut conn = pool.acquire().await.unwrap();
        set_status(&mut conn, "t1", TaskStatus::Processing).await.unwrap();
        set_status(&mut conn, "t1", TaskStatus::Completed).await.unwrap();
        assert_eq!(get_task(&pool, "t1").await.unwrap().status, "completed");
    }

    #[tokio::test]
    async fn test_progress_never_regresses() {
        let pool = memory_pool().await;
        create_task(&pool, "t1", "D1", 1).await.unwrap();

        update_progress(&pool, "t1", 40).await.unwrap();
        update_progress(&pool, "t1", 25).await.unwrap();
        assert_eq!(get_task(&pool, "t1").await.unwrap().progress_percent, 40);

        update_progress(&pool, "t1", 90).await.unwrap();
        update_progress(&pool, "t1", 250).await.unwrap();
        assert_eq!(get_task(&pool, "t1").await.unwrap().progress_percent, 100);
    }

    #[tokio::test]
    async fn test_close_marks_all_session_tasks() {
        let pool = memory_pool().await;
        create_task(&pool, "t1", "D1", 1).await.unwrap();
        create_task(&pool, "t2", "D1", 1).await.unwrap();
        create_task(&pool, "other", "D1", 2).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        mark_closed_for_session(&mut conn, 1).await.unwrap();

        assert!(get_task(&pool, "t1").await.unwrap().closed);
        assert!(get_task(&pool, "t2").await.unwrap().closed);
        assert!(!get_task(&pool, "other").await.unwrap().closed);
    }

    #[tokio::test]
    async fn test_failed_task_records_error() {
        let pool = memory_pool().await;
        create_task(&pool, "t1", "D1", 1).await.unwrap();
        set_failed(&pool, "t1", "ffmpeg exited with status 1").await.unwrap();

        let task = get_task(&pool, "t1").await.unwrap();
        assert_eq!(task.status, "failed");
        assert_eq!(task.error.as_deref(), Some("ffmpeg exited with status 1"));
    }
}
