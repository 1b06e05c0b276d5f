//! Video submission, status polling, and cancellation

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::{sessions, video_tasks};
use crate::pipeline::AnalysisRun;
use crate::{ApiError, ApiResult, AppState};

pub fn analyze_routes() -> Router<AppState> {
    Router::new()
        .route("/analyze", post(submit_video))
        .route("/analyze/:task_id/cancel", post(cancel_task))
        .route("/status/:task_id", get(task_status))
}

#[derive(Deserialize)]
struct AnalyzeRequest {
    /// Path to the recording on local disk; the engine takes ownership of
    /// the file and deletes it when the run ends
    video_path: String,
    session_id: i64,
    instructor_id: String,
}

async fn submit_video(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let source = PathBuf::from(&req.video_path);
    if !source.is_file() {
        return Err(ApiError::BadRequest(format!(
            "Video file not found: {}",
            req.video_path
        )));
    }
    // Reject unknown sessions before accepting the upload
    sessions::get_session(&state.db, req.session_id).await?;

    let task_id = Uuid::new_v4().to_string();

    // Move the recording into the engine's temp directory so its lifetime
    // is tied to the task, not the submitter
    let staged = state.root.temp_dir().join(format!("{task_id}.mp4"));
    if tokio::fs::rename(&source, &staged).await.is_err() {
        // Rename fails across filesystems
        if let Err(e) = tokio::fs::copy(&source, &staged).await {
            // Don't leave a half-written staged file behind
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::remove_file(&source).await {
            tracing::warn!(path = %source.display(), error = %e, "Could not remove source video");
        }
    }

    video_tasks::create_task(&state.db, &task_id, &req.instructor_id, req.session_id).await?;

    let cancel = CancellationToken::new();
    state
        .cancellation_tokens
        .write()
        .await
        .insert(task_id.clone(), cancel.clone());

    let run = AnalysisRun {
        pool: state.db.clone(),
        index: state.index.clone(),
        detector: state.detector.clone(),
        classifier: state.classifier.clone(),
        evidence_dir: state.root.evidence_dir(),
        sample_interval_secs: state.config.sample_interval_secs,
        task_id: task_id.clone(),
        session_id: req.session_id,
        video_path: staged,
        cancel,
    };

    let tokens = state.cancellation_tokens.clone();
    let spawned_task_id = task_id.clone();
    tokio::spawn(async move {
        run.execute().await;
        tokens.write().await.remove(&spawned_task_id);
    });

    tracing::info!(task_id = %task_id, session_id = req.session_id, "Video analysis queued");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "task_id": task_id,
            "status": "queued",
        })),
    ))
}

async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<video_tasks::VideoTask>> {
    let task = video_tasks::get_task(&state.db, &task_id).await?;
    Ok(Json(task))
}

async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let tokens = state.cancellation_tokens.read().await;
    match tokens.get(&task_id) {
        Some(token) => {
            token.cancel();
            tracing::info!(task_id = %task_id, "Cancellation requested");
            Ok(Json(json!({ "task_id": task_id, "cancelled": true })))
        }
        None => Err(ApiError::NotFound(format!(
            "No active analysis task {task_id}"
        ))),
    }
}
