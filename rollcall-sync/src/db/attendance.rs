//! Attendance ledger rows and the smart upsert
//!
//! All writes funnel through three entry points with distinct conflict
//! behavior on the (student_id, session_id, day) unique key:
//!
//! - [`insert_auto`]: merges into an existing AUTO row, never touches
//!   MANUAL or ABSENT_SYSTEM rows
//! - [`upsert_manual`]: authoritative, overwrites whatever is there
//! - [`insert_absent`]: fills gaps only, never overwrites
//!
//! Mutating functions take `&mut SqliteConnection` so callers can compose
//! them inside one ledger transaction.

use chrono::Utc;
use rollcall_common::Result;
use serde::Serialize;
use sqlx::{Row, SqliteConnection, SqlitePool};

/// How an attendance record was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceMethod {
    /// Derived from video evidence
    Auto,
    /// Entered by the instructor
    Manual,
    /// Absence filled in at session close
    AbsentSystem,
}

impl AttendanceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceMethod::Auto => "AUTO",
            AttendanceMethod::Manual => "MANUAL",
            AttendanceMethod::AbsentSystem => "ABSENT_SYSTEM",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AUTO" => Some(AttendanceMethod::Auto),
            "MANUAL" => Some(AttendanceMethod::Manual),
            "ABSENT_SYSTEM" => Some(AttendanceMethod::AbsentSystem),
            _ => None,
        }
    }
}

/// One row of the attendance table
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceRecord {
    pub record_id: i64,
    pub student_id: String,
    pub session_id: i64,
    pub day: String,
    pub recorded_at: String,
    pub method: String,
    pub appearance_count: i64,
    pub dominant_affect: Option<String>,
    pub evidence_path: Option<String>,
    pub disputed: bool,
    pub dispute_reason: Option<String>,
    pub task_id: Option<String>,
}

fn from_row(row: sqlx::sqlite::SqliteRow) -> AttendanceRecord {
    AttendanceRecord {
        record_id: row.get("record_id"),
        student_id: row.get("student_id"),
        session_id: row.get("session_id"),
        day: row.get("day"),
        recorded_at: row.get("recorded_at"),
        method: row.get("method"),
        appearance_count: row.get("appearance_count"),
        dominant_affect: row.get("dominant_affect"),
        evidence_path: row.get("evidence_path"),
        disputed: row.get::<i64, _>("disputed") != 0,
        dispute_reason: row.get("dispute_reason"),
        task_id: row.get("task_id"),
    }
}

const COLUMNS: &str = "record_id, student_id, session_id, day, recorded_at, method, \
                       appearance_count, dominant_affect, evidence_path, disputed, \
                       dispute_reason, task_id";

/// Today's ledger day in local time, formatted YYYY-MM-DD
pub fn local_day() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Look up the record for one student on one session-day
pub async fn find_for_day(
    conn: &mut SqliteConnection,
    student_id: &str,
    session_id: i64,
    day: &str,
) -> Result<Option<AttendanceRecord>> {
    let row = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM attendance WHERE student_id = ? AND session_id = ? AND day = ?"
    ))
    .bind(student_id)
    .bind(session_id)
    .bind(day)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(from_row))
}

/// Load a record by id
pub async fn find_by_id(pool: &SqlitePool, record_id: i64) -> Result<Option<AttendanceRecord>> {
    let row = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM attendance WHERE record_id = ?"
    ))
    .bind(record_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(from_row))
}

/// All records for a session-day, ordered by student
pub async fn list_for_session_day(
    pool: &SqlitePool,
    session_id: i64,
    day: &str,
) -> Result<Vec<AttendanceRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM attendance WHERE session_id = ? AND day = ? ORDER BY student_id"
    ))
    .bind(session_id)
    .bind(day)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(from_row).collect())
}

/// Record auto-detected presence for one student.
///
/// New rows are inserted as AUTO. When a row already exists the behavior
/// depends on its method:
/// - AUTO: appearance counts sum, the timestamp refreshes, and the first
///   evidence crop and affect are kept (later videos add counts, not photos)
/// - MANUAL / ABSENT_SYSTEM: the conflict is a no-op; the instructor's word
///   and the close marker outrank video evidence
pub async fn insert_auto(
    conn: &mut SqliteConnection,
    student_id: &str,
    session_id: i64,
    day: &str,
    appearance_count: i64,
    dominant_affect: Option<&str>,
    evidence_path: Option<&str>,
    task_id: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO attendance
            (student_id, session_id, day, recorded_at, method,
             appearance_count, dominant_affect, evidence_path, task_id)
        VALUES (?, ?, ?, ?, 'AUTO', ?, ?, ?, ?)
        ON CONFLICT(student_id, session_id, day) DO UPDATE SET
            appearance_count = attendance.appearance_count + excluded.appearance_count,
            recorded_at = excluded.recorded_at,
            dominant_affect = COALESCE(attendance.dominant_affect, excluded.dominant_affect),
            evidence_path = COALESCE(attendance.evidence_path, excluded.evidence_path),
            task_id = excluded.task_id
        WHERE attendance.method = 'AUTO'
        "#,
    )
    .bind(student_id)
    .bind(session_id)
    .bind(day)
    .bind(now_rfc3339())
    .bind(appearance_count)
    .bind(dominant_affect)
    .bind(evidence_path)
    .bind(task_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Record a manual instructor entry.
///
/// Manual is authoritative: it overwrites any existing row's method and
/// timestamp, clears any dispute, and keeps whatever evidence the auto
/// path had gathered. A fresh row starts with appearance_count = 1.
pub async fn upsert_manual(
    conn: &mut SqliteConnection,
    student_id: &str,
    session_id: i64,
    day: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO attendance
            (student_id, session_id, day, recorded_at, method, appearance_count)
        VALUES (?, ?, ?, ?, 'MANUAL', 1)
        ON CONFLICT(student_id, session_id, day) DO UPDATE SET
            method = 'MANUAL',
            recorded_at = excluded.recorded_at,
            disputed = 0,
            dispute_reason = NULL
        "#,
    )
    .bind(student_id)
    .bind(session_id)
    .bind(day)
    .bind(now_rfc3339())
    .execute(conn)
    .await?;
    Ok(())
}

/// Record a system absence at session close. Never overwrites an existing
/// record of any kind.
pub async fn insert_absent(
    conn: &mut SqliteConnection,
    student_id: &str,
    session_id: i64,
    day: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO attendance
            (student_id, session_id, day, recorded_at, method, appearance_count)
        VALUES (?, ?, ?, ?, 'ABSENT_SYSTEM', 0)
        ON CONFLICT(student_id, session_id, day) DO NOTHING
        "#,
    )
    .bind(student_id)
    .bind(session_id)
    .bind(day)
    .bind(now_rfc3339())
    .execute(conn)
    .await?;
    Ok(())
}

/// Flag a record as disputed, optionally attaching counter-evidence.
///
/// The method and appearance count are left alone; a dispute marks the
/// record for review, it doesn't change what was observed.
pub async fn set_dispute(
    pool: &SqlitePool,
    record_id: i64,
    reason: &str,
    evidence_path: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE attendance SET
            disputed = 1,
            dispute_reason = ?,
            evidence_path = COALESCE(?, evidence_path)
        WHERE record_id = ?
        "#,
    )
    .bind(reason)
    .bind(evidence_path)
    .bind(record_id)
    .execute(pool)
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
    async fn test_auto_merge_sums_counts_and_keeps_first_evidence() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        insert_auto(&mut conn, "S1", 1, "2026-08-23", 3, Some("Happy"), Some("a.jpg"), "t1")
            .await
            .unwrap();
        insert_auto(&mut conn, "S1", 1, "2026-08-23", 2, Some("Sad"), Some("b.jpg"), "t2")
            .await
            .unwrap();

        let rec = find_for_day(&mut conn, "S1", 1, "2026-08-23")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rec.method, "AUTO");
        assert_eq!(rec.appearance_count, 5);
        assert_eq!(rec.dominant_affect.as_deref(), Some("Happy"));
        assert_eq!(rec.evidence_path.as_deref(), Some("a.jpg"));
        assert_eq!(rec.task_id.as_deref(), Some("t2"));
    }

    #[tokio::test]
    async fn test_auto_never_touches_manual() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        upsert_manual(&mut conn, "S1", 1, "2026-08-23").await.unwrap();
        insert_auto(&mut conn, "S1", 1, "2026-08-23", 7, None, Some("late.jpg"), "t1")
            .await
            .unwrap();

        let rec = find_for_day(&mut conn, "S1", 1, "2026-08-23")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rec.method, "MANUAL");
        assert_eq!(rec.appearance_count, 1);
        assert!(rec.evidence_path.is_none());
    }

    #[tokio::test]
    async fn test_manual_overrides_auto_and_clears_dispute() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        insert_auto(&mut conn, "S1", 1, "2026-08-23", 4, Some("Neutral"), Some("a.jpg"), "t1")
            .await
            .unwrap();
        let rec = find_for_day(&mut conn, "S1", 1, "2026-08-23")
            .await
            .unwrap()
            .unwrap();
        set_dispute(&pool, rec.record_id, "wrong person", None)
            .await
            .unwrap();

        upsert_manual(&mut conn, "S1", 1, "2026-08-23").await.unwrap();

        let rec = find_for_day(&mut conn, "S1", 1, "2026-08-23")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rec.method, "MANUAL");
        assert!(!rec.disputed);
        assert!(rec.dispute_reason.is_none());
        // Existing evidence survives the manual override
        assert_eq!(rec.evidence_path.as_deref(), Some("a.jpg"));
        assert_eq!(rec.appearance_count, 4);
    }

    #[tokio::test]
    async fn test_absent_fills_gaps_only() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        insert_auto(&mut conn, "S1", 1, "2026-08-23", 2, None, None, "t1")
            .await
            .unwrap();
        insert_absent(&mut conn, "S1", 1, "2026-08-23").await.unwrap();
        insert_absent(&mut conn, "S2", 1, "2026-08-23").await.unwrap();

        let s1 = find_for_day(&mut conn, "S1", 1, "2026-08-23")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(s1.method, "AUTO");

        let s2 = find_for_day(&mut conn, "S2", 1, "2026-08-23")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(s2.method, "ABSENT_SYSTEM");
        assert_eq!(s2.appearance_count, 0);
    }

    #[tokio::test]
    async fn test_dispute_preserves_method_and_count() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        insert_auto(&mut conn, "S1", 1, "2026-08-23", 3, None, Some("a.jpg"), "t1")
            .await
            .unwrap();
        let rec = find_for_day(&mut conn, "S1", 1, "2026-08-23")
            .await
            .unwrap()
            .unwrap();

        set_dispute(&pool, rec.record_id, "I was elsewhere", Some("counter.jpg"))
            .await
            .unwrap();

        let rec = find_by_id(&pool, rec.record_id).await.unwrap().unwrap();
        assert!(rec.disputed);
        assert_eq!(rec.dispute_reason.as_deref(), Some("I was elsewhere"));
        assert_eq!(rec.evidence_path.as_deref(), Some("counter.jpg"));
        assert_eq!(rec.method, "AUTO");
        assert_eq!(rec.appearance_count, 3);
    }

    #[test]
    fn test_method_round_trip() {
        for m in [
            AttendanceMethod::Auto,
            AttendanceMethod::Manual,
            AttendanceMethod::AbsentSystem,
        ] {
            assert_eq!(AttendanceMethod::parse(m.as_str()), Some(m));
        }
        assert_eq!(AttendanceMethod::parse("bogus"), None);
    }
}
