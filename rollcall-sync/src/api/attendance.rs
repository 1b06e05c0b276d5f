//! Manual entries, session close, disputes, and the attendance view

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::db::{attendance, enrollment, sessions};
use crate::ledger::{AttendanceLedger, CloseOutcome};
use crate::pipeline::evidence;
use crate::{ApiError, ApiResult, AppState};

pub fn attendance_routes() -> Router<AppState> {
    Router::new()
        .route("/attendance/manual", post(manual_entry))
        .route("/attendance/dispute", post(dispute))
        .route("/sessions/:session_id/close", post(close_session))
        .route("/sessions/:session_id/attendance", get(session_attendance))
}

#[derive(Deserialize)]
struct ManualRequest {
    session_id: i64,
    student_id: String,
}

async fn manual_entry(
    State(state): State<AppState>,
    Json(req): Json<ManualRequest>,
) -> ApiResult<Json<attendance::AttendanceRecord>> {
    let ledger = AttendanceLedger::new(state.db.clone());
    let record = ledger.manual_entry(req.session_id, &req.student_id).await?;
    Ok(Json(record))
}

#[derive(Deserialize)]
struct DisputeRequest {
    record_id: i64,
    student_id: String,
    reason: String,
    /// Optional counter-evidence photo, base64-encoded JPEG
    evidence_base64: Option<String>,
}

async fn dispute(
    State(state): State<AppState>,
    Json(req): Json<DisputeRequest>,
) -> ApiResult<Json<attendance::AttendanceRecord>> {
    let evidence_path = match req.evidence_base64 {
        Some(encoded) => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| ApiError::BadRequest(format!("Invalid evidence encoding: {e}")))?;
            let dir = state.root.evidence_dir();
            let path = tokio::task::spawn_blocking(move || evidence::store_evidence(&dir, &bytes))
                .await
                .map_err(|e| ApiError::Internal(format!("Evidence task panicked: {e}")))??;
            Some(path)
        }
        None => None,
    };

    let ledger = AttendanceLedger::new(state.db.clone());
    let record = ledger
        .dispute(
            req.record_id,
            &req.student_id,
            &req.reason,
            evidence_path.as_deref(),
        )
        .await?;
    Ok(Json(record))
}

async fn close_session(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> ApiResult<Json<CloseOutcome>> {
    let ledger = AttendanceLedger::new(state.db.clone());
    let outcome = ledger.close_session(session_id).await?;
    Ok(Json(outcome))
}

/// One line of the merged roster view
#[derive(Debug, Serialize)]
struct RosterEntry {
    student_id: String,
    full_name: Option<String>,
    status: &'static str,
    record: Option<attendance::AttendanceRecord>,
}

#[derive(Serialize)]
struct AttendanceView {
    session_id: i64,
    day: String,
    entries: Vec<RosterEntry>,
}

/// Merged roster for today's session: every enrolled student with their
/// record (if any) and a derived status.
async fn session_attendance(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> ApiResult<Json<AttendanceView>> {
    let session = sessions::get_session(&state.db, session_id).await?;
    let day = attendance::local_day();

    let roster = enrollment::roster(&state.db, session.cohort_id).await?;
    let mut records: HashMap<String, attendance::AttendanceRecord> =
        attendance::list_for_session_day(&state.db, session_id, &day)
            .await?
            .into_iter()
            .map(|r| (r.student_id.clone(), r))
            .collect();

    let entries = roster
        .into_iter()
        .map(|(student_id, full_name)| {
            let record = records.remove(&student_id);
            let status = match &record {
                Some(r) if r.disputed => "DISPUTED",
                Some(r) if r.method == "ABSENT_SYSTEM" => "ABSENT",
                Some(_) => "PRESENT",
                None => "UNRECORDED",
            };
            RosterEntry {
                student_id,
                full_name,
                status,
                record,
            }
        })
        .collect();

    Ok(Json(AttendanceView {
        session_id,
        day,
        entries,
    }))
}
