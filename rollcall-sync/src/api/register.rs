//! Face registration

use axum::{extract::State, routing::post, Json, Router};
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use crate::db::students;
use crate::identity;
use crate::{ApiError, ApiResult, AppState};

pub fn register_routes() -> Router<AppState> {
    Router::new().route("/students/register", post(register_face))
}

#[derive(Deserialize)]
struct RegisterRequest {
    student_id: String,
    full_name: Option<String>,
    /// Base64-encoded JPEG portrait containing exactly one face
    image_base64: String,
}

/// Register (or replace) a student's face embedding and refresh the
/// identity index so the next analysis run sees it.
async fn register_face(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if req.student_id.trim().is_empty() {
        return Err(ApiError::BadRequest("student_id must not be empty".to_string()));
    }

    let jpeg = base64::engine::general_purpose::STANDARD
        .decode(req.image_base64.as_bytes())
        .map_err(|e| ApiError::BadRequest(format!("Invalid image encoding: {e}")))?;

    let faces = state.detector.detect(&jpeg).await?;
    let face = match faces.len() {
        1 => &faces[0],
        0 => {
            return Err(ApiError::BadRequest(
                "No face found in registration image".to_string(),
            ))
        }
        n => {
            return Err(ApiError::BadRequest(format!(
                "Registration image must contain exactly one face, found {n}"
            )))
        }
    };

    // Stored unit-norm so index reloads never meet a degenerate vector
    let embedding = identity::normalize(&face.embedding).ok_or_else(|| {
        ApiError::BadRequest("Detector returned a degenerate embedding".to_string())
    })?;

    students::upsert_student(
        &state.db,
        &req.student_id,
        req.full_name.as_deref(),
        Some(&embedding),
    )
    .await?;

    let identities = state.index.reload(&state.db).await?;
    tracing::info!(student_id = %req.student_id, identities, "Face registered");

    Ok(Json(json!({
        "student_id": req.student_id,
        "identities": identities,
    })))
}
