//! Scheduled session queries
//!
//! A session is one scheduled course meeting bound to exactly one cohort.
//! Cohort reassignment is an administrative operation elsewhere; the
//! ledger always resolves the current cohort at read time. [`create_session`]
//! is the administrative seeding surface (no HTTP adapter), alongside the
//! cohort functions in the enrollment module.

use rollcall_common::{Error, Result};
use sqlx::{Row, SqliteConnection, SqlitePool};

/// One scheduled course meeting instance
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: i64,
    pub instructor_id: String,
    pub cohort_id: i64,
    pub course_id: i64,
    pub day: String,
    pub start_time: String,
    pub end_time: String,
}

fn from_row(row: sqlx::sqlite::SqliteRow) -> Session {
    Session {
        session_id: row.get("session_id"),
        instructor_id: row.get("instructor_id"),
        cohort_id: row.get("cohort_id"),
        course_id: row.get("course_id"),
        day: row.get("day"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
    }
}

const SELECT: &str = "SELECT session_id, instructor_id, cohort_id, course_id, day, start_time, end_time \
                      FROM sessions WHERE session_id = ?";

/// Load a session, erroring with NotFound when absent
pub async fn load_session(conn: &mut SqliteConnection, session_id: i64) -> Result<Session> {
    let row = sqlx::query(SELECT)
        .bind(session_id)
        .fetch_optional(conn)
        .await?;
    row.map(from_row)
        .ok_or_else(|| Error::NotFound(format!("Session {session_id}")))
}

/// Pool variant of [`load_session`] for read paths outside a transaction
pub async fn get_session(pool: &SqlitePool, session_id: i64) -> Result<Session> {
    let row = sqlx::query(SELECT)
        .bind(session_id)
        .fetch_optional(pool)
        .await?;
    row.map(from_row)
        .ok_or_else(|| Error::NotFound(format!("Session {session_id}")))
}

/// Create a session, returning its id
pub async fn create_session(
    pool: &SqlitePool,
    instructor_id: &str,
    cohort_id: i64,
    course_id: i64,
    day: &str,
    start_time: &str,
    end_time: &str,
) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO sessions (instructor_id, cohort_id, course_id, day, start_time, end_time) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(instructor_id)
    .bind(cohort_id)
    .bind(course_id)
    .bind(day)
    .bind(start_time)
    .bind(end_time)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}
