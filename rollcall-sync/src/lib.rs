//! rollcall-sync library interface
//!
//! Attendance synchronization engine: turns classroom recordings into
//! attendance records via face identification, and reconciles them with
//! manual entries, session closes, and disputes.

pub mod affect;
pub mod api;
pub mod db;
pub mod detector;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod pipeline;
pub mod video;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use rollcall_common::config::{EngineConfig, RootFolder};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;

use crate::affect::AffectClassifier;
use crate::detector::FaceDetector;
use crate::identity::IdentityIndex;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Engine configuration loaded at startup
    pub config: EngineConfig,
    /// Root folder layout (database, temp videos, evidence)
    pub root: RootFolder,
    /// In-memory face identity index
    pub index: Arc<IdentityIndex>,
    /// Face detection service client
    pub detector: Arc<dyn FaceDetector>,
    /// Affect classification service client
    pub classifier: Arc<dyn AffectClassifier>,
    /// Cancellation tokens for in-flight analysis tasks
    pub cancellation_tokens: Arc<RwLock<HashMap<String, CancellationToken>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        config: EngineConfig,
        root: RootFolder,
        detector: Arc<dyn FaceDetector>,
        classifier: Arc<dyn AffectClassifier>,
    ) -> Self {
        let index = Arc::new(IdentityIndex::new(config.similarity_threshold));
        Self {
            db,
            config,
            root,
            index,
            detector,
            classifier,
            cancellation_tokens: Arc::new(RwLock::new(HashMap::new())),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let evidence_dir = state.root.evidence_dir();

    Router::new()
        .merge(api::health_routes())
        .merge(api::analyze_routes())
        .merge(api::attendance_routes())
        .merge(api::register_routes())
        .nest_service("/evidence", ServeDir::new(evidence_dir))
        .with_state(state)
}
