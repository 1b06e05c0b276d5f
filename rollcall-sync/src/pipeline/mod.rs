//! Background video analysis pipeline
//!
//! One [`AnalysisRun`] per submitted recording: sample frames, detect
//! faces, resolve identities against the in-memory index, aggregate
//! evidence, and hand the result to the ledger in a single transaction.
//! Runs on a spawned task; the HTTP layer polls progress through the
//! video_tasks table.

pub mod evidence;

use rollcall_common::{Error, Result};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::affect::AffectClassifier;
use crate::db::video_tasks::{self, TaskStatus};
use crate::detector::FaceDetector;
use crate::identity::{FaceMatch, IdentityIndex};
use crate::ledger::AttendanceLedger;
use crate::video::{FrameSampler, TempVideo};
use self::evidence::EvidenceAggregator;

/// Everything one analysis run needs, captured at submission time
pub struct AnalysisRun {
    pub pool: SqlitePool,
    pub index: Arc<IdentityIndex>,
    pub detector: Arc<dyn FaceDetector>,
    pub classifier: Arc<dyn AffectClassifier>,
    pub evidence_dir: PathBuf,
    pub sample_interval_secs: f64,
    pub task_id: String,
    pub session_id: i64,
    pub video_path: PathBuf,
    pub cancel: CancellationToken,
}

impl AnalysisRun {
    /// Drive the run to completion, recording the outcome on the task row.
    /// Never returns an error to the spawner; failures land in the task's
    /// error column where the status poller can see them.
    pub async fn execute(self) {
        let task_id = self.task_id.clone();
        let pool = self.pool.clone();

        match self.run().await {
            Ok(true) => {
                tracing::info!(task_id = %task_id, "Video analysis completed");
            }
            Ok(false) => {
                tracing::info!(task_id = %task_id, "Video analysis cancelled");
                if let Err(e) = video_tasks::set_failed(&pool, &task_id, "Cancelled").await {
                    tracing::error!(task_id = %task_id, error = %e, "Failed to record cancellation");
                }
            }
            Err(e) => {
                tracing::error!(task_id = %task_id, error = %e, "Video analysis failed");
                if let Err(e2) = video_tasks::set_failed(&pool, &task_id, &e.to_string()).await {
                    tracing::error!(task_id = %task_id, error = %e2, "Failed to record task error");
                }
            }
        }
    }

    /// Ok(true) on completion, Ok(false) when cancelled between frames
    async fn run(self) -> Result<bool> {
        // The guard owns the uploaded file for the rest of the run; every
        // exit path below drops it and removes the file.
        let temp = TempVideo::new(self.video_path.clone());

        {
            let mut conn = self.pool.acquire().await?;
            video_tasks::set_status(&mut conn, &self.task_id, TaskStatus::Processing).await?;
        }

        let probe = crate::video::probe_video(temp.path()).await?;
        let total_samples = probe.sample_count(self.sample_interval_secs).max(1);
        tracing::info!(
            task_id = %self.task_id,
            duration_secs = probe.duration_secs,
            fps = probe.fps,
            samples = total_samples,
            "Starting video analysis"
        );

        let mut sampler =
            FrameSampler::new(temp.path().to_path_buf(), probe, self.sample_interval_secs);
        let mut aggregator = EvidenceAggregator::new();

        // Cancellation is checked once per sampled frame; a cancel lands
        // within one decode-and-detect cycle.
        while let Some(frame) = sampler.next_frame().await? {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }

            let faces = self.detector.detect(&frame.jpeg).await?;
            for face in faces {
                let FaceMatch::Known { student_id, score } = self.index.query(&face.embedding).await
                else {
                    continue;
                };
                tracing::debug!(
                    task_id = %self.task_id,
                    student_id = %student_id,
                    score,
                    timestamp = frame.timestamp_secs,
                    "Identified face"
                );

                aggregator.observe(&student_id);

                // Crop, evidence storage, and affect classification run
                // until one crop sticks for the student; a failed attempt
                // is retried on the next appearance.
                if !aggregator.needs_evidence(&student_id) {
                    continue;
                }

                let frame_jpeg = frame.jpeg.clone();
                let bbox = face.bbox;
                let crop = tokio::task::spawn_blocking(move || {
                    evidence::crop_face_jpeg(&frame_jpeg, bbox)
                })
                .await
                .map_err(|e| Error::Internal(format!("Crop task panicked: {e}")))?;

                let crop = match crop {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::warn!(task_id = %self.task_id, error = %e, "Face crop failed");
                        continue;
                    }
                };

                let dir = self.evidence_dir.clone();
                let bytes = crop.clone();
                let stored = tokio::task::spawn_blocking(move || {
                    evidence::store_evidence(&dir, &bytes)
                })
                .await
                .map_err(|e| Error::Internal(format!("Evidence task panicked: {e}")))?;
                let path = match stored {
                    Ok(path) => path,
                    Err(e) => {
                        tracing::warn!(task_id = %self.task_id, error = %e, "Evidence store failed");
                        continue;
                    }
                };
                aggregator.attach_evidence(&student_id, path);

                // Best effort; a dead classifier costs labels, not runs
                match self.classifier.classify(&crop).await {
                    Ok(prediction) => {
                        aggregator.record_affect(&student_id, &prediction.predicted_class)
                    }
                    Err(e) => {
                        tracing::debug!(task_id = %self.task_id, error = %e, "Affect classification failed")
                    }
                }
            }

            let percent = ((frame.index + 1) * 100 / total_samples).min(99) as i64;
            video_tasks::update_progress(&self.pool, &self.task_id, percent).await?;
        }

        // Evidence is applied even if the session closed mid-run: the
        // upsert merges into AUTO rows and never touches MANUAL or
        // ABSENT_SYSTEM ones, so close results stay authoritative.
        let summaries = aggregator.finalize();
        let ledger = AttendanceLedger::new(self.pool.clone());
        let applied = ledger
            .apply_evidence(self.session_id, &self.task_id, &summaries)
            .await?;
        video_tasks::update_progress(&self.pool, &self.task_id, 100).await?;

        tracing::info!(
            task_id = %self.task_id,
            identified = summaries.len(),
            applied,
            "Evidence applied to ledger"
        );
        Ok(true)
    }
}
