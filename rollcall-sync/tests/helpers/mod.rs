//! Shared test utilities

use async_trait::async_trait;
use rollcall_common::db::init_tables;
use rollcall_common::Result;
use rollcall_sync::affect::{AffectClassifier, AffectPrediction};
use rollcall_sync::db::{attendance, enrollment, sessions, students};
use rollcall_sync::detector::{Bbox, DetectedFace, FaceDetector};
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Fresh in-memory database with the full schema
pub async fn create_test_db() -> SqlitePool {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    init_tables(&pool).await.unwrap();
    pool
}

/// Cohort + session ready for attendance writes; returns (cohort_id, session_id)
pub async fn seed_session(pool: &SqlitePool) -> (i64, i64) {
    let cohort_id = enrollment::create_cohort(pool, "CS-2026A").await.unwrap();
    let session_id = sessions::create_session(
        pool,
        "D1",
        cohort_id,
        101,
        &attendance::local_day(),
        "08:00",
        "09:40",
    )
    .await
    .unwrap();
    (cohort_id, session_id)
}

/// Student enrolled in the cohort, with or without a registered face
pub async fn seed_enrolled_student(
    pool: &SqlitePool,
    student_id: &str,
    cohort_id: i64,
    embedding: Option<&[f32]>,
) {
    students::upsert_student(pool, student_id, Some("Test Student"), embedding)
        .await
        .unwrap();
    enrollment::enroll(pool, student_id, cohort_id).await.unwrap();
}

/// Detector stub that replays a scripted sequence of frame results
pub struct StubDetector {
    responses: Mutex<VecDeque<Vec<DetectedFace>>>,
}

impl StubDetector {
    pub fn new(responses: Vec<Vec<DetectedFace>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
        }
    }
}

#[async_trait]
impl FaceDetector for StubDetector {
    async fn detect(&self, _jpeg: &[u8]) -> Result<Vec<DetectedFace>> {
        Ok(self.responses.lock().unwrap().pop_front().unwrap_or_default())
    }
}

/// Classifier stub that always answers with one label
pub struct StubClassifier {
    pub label: String,
}

#[async_trait]
impl AffectClassifier for StubClassifier {
    async fn classify(&self, _face_jpeg: &[u8]) -> Result<AffectPrediction> {
        Ok(AffectPrediction {
            predicted_class: self.label.clone(),
            confidence: 0.9,
        })
    }
}

pub fn face(embedding: Vec<f32>) -> DetectedFace {
    DetectedFace {
        bbox: Bbox {
            x: 0,
            y: 0,
            width: 32,
            height: 32,
        },
        embedding,
    }
}
