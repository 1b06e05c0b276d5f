//! Attendance ledger operations
//!
//! The ledger is the only writer of attendance rows. Each operation runs
//! in one transaction so a crash mid-way leaves either the whole outcome
//! or none of it, and the (student, session, day) unique key plus the
//! method-guarded upserts in db::attendance make concurrent appliers
//! merge instead of clobbering each other.

use rollcall_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::HashSet;

use crate::db::{attendance, enrollment, sessions, students, video_tasks};
use crate::db::video_tasks::TaskStatus;
use crate::pipeline::evidence::StudentSummary;

/// Outcome of closing a session-day
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CloseOutcome {
    /// Roster size considered (enrolled students with a registered face)
    pub roster: usize,
    /// Students newly marked ABSENT_SYSTEM by this close
    pub marked_absent: usize,
}

pub struct AttendanceLedger {
    pool: SqlitePool,
}

impl AttendanceLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Apply a finished analysis run's evidence and complete its task,
    /// atomically.
    ///
    /// Students who appear in the evidence but are not enrolled in the
    /// session's cohort are dropped without error: a registered face
    /// walking through the wrong classroom is expected, not exceptional.
    ///
    /// Returns the number of students actually written.
    pub async fn apply_evidence(
        &self,
        session_id: i64,
        task_id: &str,
        summaries: &[StudentSummary],
    ) -> Result<usize> {
        let day = attendance::local_day();
        let mut tx = self.pool.begin().await?;

        let session = sessions::load_session(&mut tx, session_id).await?;

        let mut applied = 0usize;
        for summary in summaries {
            if !enrollment::is_enrolled(&mut tx, &summary.student_id, session.cohort_id).await? {
                tracing::debug!(
                    student_id = %summary.student_id,
                    cohort_id = session.cohort_id,
                    "Identified student not enrolled in session cohort, skipping"
                );
                continue;
            }
            attendance::insert_auto(
                &mut tx,
                &summary.student_id,
                session_id,
                &day,
                summary.appearance_count,
                Some(&summary.dominant_affect),
                summary.evidence_path.as_deref(),
                task_id,
            )
            .await?;
            applied += 1;
        }

        video_tasks::set_status(&mut tx, task_id, TaskStatus::Completed).await?;
        tx.commit().await?;
        Ok(applied)
    }

    /// Record an instructor's manual presence entry for today.
    ///
    /// Rejects students the engine has never seen and students not
    /// enrolled in the session's cohort; a typo in a student id must not
    /// mint a ghost record.
    pub async fn manual_entry(
        &self,
        session_id: i64,
        student_id: &str,
    ) -> Result<attendance::AttendanceRecord> {
        if !students::student_exists(&self.pool, student_id).await? {
            return Err(Error::NotFound(format!("Student {student_id}")));
        }

        let day = attendance::local_day();
        let mut tx = self.pool.begin().await?;

        let session = sessions::load_session(&mut tx, session_id).await?;
        if !enrollment::is_enrolled(&mut tx, student_id, session.cohort_id).await? {
            return Err(Error::NotEnrolled {
                student_id: student_id.to_string(),
                cohort_id: session.cohort_id,
            });
        }

        attendance::upsert_manual(&mut tx, student_id, session_id, &day).await?;
        let record = attendance::find_for_day(&mut tx, student_id, session_id, &day)
            .await?
            .ok_or_else(|| Error::Internal("Manual entry vanished within transaction".into()))?;
        tx.commit().await?;

        tracing::info!(student_id = %student_id, session_id, day = %day, "Manual attendance recorded");
        Ok(record)
    }

    /// Close out today's session: every enrolled student with a registered
    /// face and no record yet is marked ABSENT_SYSTEM, and all of the
    /// session's video tasks are flagged closed. Evidence from a run that
    /// finishes after the close still applies; the upsert rules keep the
    /// ABSENT_SYSTEM and MANUAL rows authoritative.
    ///
    /// Closing an already-closed session is a no-op that reports zero new
    /// absences.
    pub async fn close_session(&self, session_id: i64) -> Result<CloseOutcome> {
        let day = attendance::local_day();
        let mut tx = self.pool.begin().await?;

        let session = sessions::load_session(&mut tx, session_id).await?;
        let roster = enrollment::members_with_embedding(&mut tx, session.cohort_id).await?;

        let recorded: HashSet<String> =
            sqlx::query_scalar::<_, String>(
                "SELECT student_id FROM attendance WHERE session_id = ? AND day = ?",
            )
            .bind(session_id)
            .bind(&day)
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .collect();

        let mut marked_absent = 0usize;
        for student_id in &roster {
            if recorded.contains(student_id) {
                continue;
            }
            attendance::insert_absent(&mut tx, student_id, session_id, &day).await?;
            marked_absent += 1;
        }

        video_tasks::mark_closed_for_session(&mut tx, session_id).await?;
        tx.commit().await?;

        tracing::info!(
            session_id,
            day = %day,
            roster = roster.len(),
            marked_absent,
            "Session closed"
        );
        Ok(CloseOutcome {
            roster: roster.len(),
            marked_absent,
        })
    }

    /// Flag an attendance record as disputed on the student's behalf.
    ///
    /// The record's method and counts stay untouched; only a later manual
    /// entry by the instructor resolves the dispute.
    pub async fn dispute(
        &self,
        record_id: i64,
        student_id: &str,
        reason: &str,
        evidence_path: Option<&str>,
    ) -> Result<attendance::AttendanceRecord> {
        let record = attendance::find_by_id(&self.pool, record_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Attendance record {record_id}")))?;

        if record.student_id != student_id {
            return Err(Error::InvalidInput(
                "Attendance record belongs to a different student".to_string(),
            ));
        }
        if reason.trim().is_empty() {
            return Err(Error::InvalidInput("Dispute reason must not be empty".to_string()));
        }

        // A student dropped from the cohort since the record was written
        // has no standing to dispute it
        let mut conn = self.pool.acquire().await?;
        let session = sessions::load_session(&mut conn, record.session_id).await?;
        if !enrollment::is_enrolled(&mut conn, student_id, session.cohort_id).await? {
            return Err(Error::NotEnrolled {
                student_id: student_id.to_string(),
                cohort_id: session.cohort_id,
            });
        }
        drop(conn);

        attendance::set_dispute(&self.pool, record_id, reason, evidence_path).await?;

        let updated = attendance::find_by_id(&self.pool, record_id)
            .await?
            .ok_or_else(|| Error::Internal("Disputed record vanished".into()))?;
        tracing::info!(record_id, student_id = %student_id, "Attendance record disputed");
        Ok(updated)
    }
}
