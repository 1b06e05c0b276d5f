//! Cohort membership queries
//!
//! [`enroll`] and [`create_cohort`] are the administrative seeding
//! surface: cohort management has no HTTP adapter here, so operators and
//! tests drive it through these functions directly.

use rollcall_common::Result;
use sqlx::{SqliteConnection, SqlitePool};

/// Check whether a student is enrolled in a cohort
pub async fn is_enrolled(
    conn: &mut SqliteConnection,
    student_id: &str,
    cohort_id: i64,
) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM enrollments WHERE student_id = ? AND cohort_id = ?",
    )
    .bind(student_id)
    .bind(cohort_id)
    .fetch_one(conn)
    .await?;
    Ok(count > 0)
}

/// Enroll a student in a cohort (idempotent)
pub async fn enroll(pool: &SqlitePool, student_id: &str, cohort_id: i64) -> Result<()> {
    sqlx::query(
        "INSERT INTO enrollments (student_id, cohort_id) VALUES (?, ?) \
         ON CONFLICT(student_id, cohort_id) DO NOTHING",
    )
    .bind(student_id)
    .bind(cohort_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Create a cohort, returning its id
pub async fn create_cohort(pool: &SqlitePool, name: &str) -> Result<i64> {
    let result = sqlx::query("INSERT INTO cohorts (name) VALUES (?)")
        .bind(name)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Full cohort roster with display names, for the session attendance view
pub async fn roster(pool: &SqlitePool, cohort_id: i64) -> Result<Vec<(String, Option<String>)>> {
    let rows = sqlx::query_as::<_, (String, Option<String>)>(
        r#"
        SELECT s.student_id, s.full_name
        FROM students s
        JOIN enrollments e ON e.student_id = s.student_id
        WHERE e.cohort_id = ?
        ORDER BY s.student_id
        "#,
    )
    .bind(cohort_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Cohort members that have a registered face embedding.
///
/// Session closure only marks these students absent; students without an
/// embedding can never be auto-detected, so absence would be meaningless.
pub async fn members_with_embedding(
    conn: &mut SqliteConnection,
    cohort_id: i64,
) -> Result<Vec<String>> {
    let rows: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT s.student_id
        FROM students s
        JOIN enrollments e ON e.student_id = s.student_id
        WHERE e.cohort_id = ? AND s.embedding IS NOT NULL
        ORDER BY s.student_id
        "#,
    )
    .bind(cohort_id)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}
