//! Per-task evidence aggregation and evidence image storage
//!
//! The analyzer feeds one observation per identified face per sampled
//! frame into an [`EvidenceAggregator`]; at the end of the run the
//! aggregator collapses to one summary per student. Evidence crops are
//! content-addressed: the filename is the SHA-256 of the JPEG bytes, so
//! re-submitting the same video never duplicates files on disk.

use image::ImageFormat;
use rollcall_common::{Error, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

use crate::detector::Bbox;

/// Affect applied when no classification succeeded for a student
pub const DEFAULT_AFFECT: &str = "Neutral";

#[derive(Debug, Default)]
struct StudentTally {
    appearance_count: i64,
    affects: HashMap<String, u32>,
    evidence_path: Option<String>,
}

/// Final per-student verdict for one analysis run
#[derive(Debug, Clone, PartialEq)]
pub struct StudentSummary {
    pub student_id: String,
    pub appearance_count: i64,
    pub dominant_affect: String,
    pub evidence_path: Option<String>,
}

/// Accumulates observations across a video's sampled frames
#[derive(Debug, Default)]
pub struct EvidenceAggregator {
    tallies: HashMap<String, StudentTally>,
}

impl EvidenceAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one appearance
    pub fn observe(&mut self, student_id: &str) {
        let tally = self.tallies.entry(student_id.to_string()).or_default();
        tally.appearance_count += 1;
    }

    /// Whether the student still has no stored evidence crop.
    ///
    /// The caller's cue to attempt (or re-attempt) a crop: a failed crop
    /// or store leaves this true, so the next appearance tries again
    /// until one sticks.
    pub fn needs_evidence(&self, student_id: &str) -> bool {
        self.tallies
            .get(student_id)
            .map_or(true, |t| t.evidence_path.is_none())
    }

    /// Attach the stored evidence crop path, first one wins
    pub fn attach_evidence(&mut self, student_id: &str, path: String) {
        let tally = self.tallies.entry(student_id.to_string()).or_default();
        if tally.evidence_path.is_none() {
            tally.evidence_path = Some(path);
        }
    }

    /// Tally one affect classification
    pub fn record_affect(&mut self, student_id: &str, affect: &str) {
        let tally = self.tallies.entry(student_id.to_string()).or_default();
        *tally.affects.entry(affect.to_string()).or_insert(0) += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.tallies.is_empty()
    }

    /// Collapse to per-student summaries, ordered by student id.
    ///
    /// The dominant affect is the most frequent label, with the
    /// alphabetically-first label winning ties so a rerun over the same
    /// video yields the same verdict.
    pub fn finalize(self) -> Vec<StudentSummary> {
        let mut out: Vec<StudentSummary> = self
            .tallies
            .into_iter()
            .map(|(student_id, tally)| {
                let dominant_affect = tally
                    .affects
                    .iter()
                    .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
                    .map(|(label, _)| label.clone())
                    .unwrap_or_else(|| DEFAULT_AFFECT.to_string());
                StudentSummary {
                    student_id,
                    appearance_count: tally.appearance_count,
                    dominant_affect,
                    evidence_path: tally.evidence_path,
                }
            })
            .collect();
        out.sort_by(|a, b| a.student_id.cmp(&b.student_id));
        out
    }
}

/// Crop a face out of a JPEG frame and re-encode the crop as JPEG.
///
/// The box is clamped to the frame; detectors near an edge can report
/// boxes that spill past it. CPU-bound, so callers run this under
/// `spawn_blocking`.
pub fn crop_face_jpeg(frame_jpeg: &[u8], bbox: Bbox) -> Result<Vec<u8>> {
    let frame = image::load_from_memory_with_format(frame_jpeg, ImageFormat::Jpeg)
        .map_err(|e| Error::InvalidInput(format!("Failed to decode frame: {e}")))?;

    let (fw, fh) = (frame.width(), frame.height());
    let x = bbox.x.min(fw.saturating_sub(1));
    let y = bbox.y.min(fh.saturating_sub(1));
    let width = bbox.width.clamp(1, fw - x);
    let height = bbox.height.clamp(1, fh - y);

    let crop = frame.crop_imm(x, y, width, height);
    let mut out = Cursor::new(Vec::new());
    crop.write_to(&mut out, ImageFormat::Jpeg)
        .map_err(|e| Error::Internal(format!("Failed to encode crop: {e}")))?;
    Ok(out.into_inner())
}

/// Write evidence bytes under the evidence directory, named by content
/// hash. Returns the public path the record stores and the HTTP layer
/// serves. Writing the same bytes twice is a no-op.
pub fn store_evidence(evidence_dir: &Path, jpeg: &[u8]) -> Result<String> {
    let hash = Sha256::digest(jpeg);
    let filename = format!("{:x}.jpg", hash);
    let target = evidence_dir.join(&filename);

    if !target.exists() {
        std::fs::write(&target, jpeg)?;
    }
    Ok(format!("/evidence/{filename}"))
}
