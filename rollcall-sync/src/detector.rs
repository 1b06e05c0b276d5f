//! Face detection service client
//!
//! Detection and embedding extraction run in an external model-serving
//! process reached over HTTP; this module is the trait seam plus the
//! production client. The trait exists so the pipeline and registration
//! paths can be exercised with a stub detector in tests.

use async_trait::async_trait;
use rollcall_common::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

/// Axis-aligned face bounding box, pixel coordinates in the source frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One detected face: where it is and who it looks like
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bbox: Bbox,
    pub embedding: Vec<f32>,
}

/// Detects faces in a JPEG frame and extracts an embedding for each
#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect(&self, jpeg: &[u8]) -> Result<Vec<DetectedFace>>;
}

#[derive(Deserialize)]
struct DetectResponse {
    faces: Vec<FacePayload>,
}

#[derive(Deserialize)]
struct FacePayload {
    /// [x, y, width, height], may extend past frame edges
    bbox: [f64; 4],
    embedding: Vec<f32>,
}

/// HTTP client for the external detection service
pub struct HttpFaceDetector {
    client: reqwest::Client,
    url: String,
}

impl HttpFaceDetector {
    pub fn new(url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::External(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl FaceDetector for HttpFaceDetector {
    async fn detect(&self, jpeg: &[u8]) -> Result<Vec<DetectedFace>> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "image/jpeg")
            .body(jpeg.to_vec())
            .send()
            .await
            .map_err(|e| Error::External(format!("Detector request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::External(format!(
                "Detector returned HTTP {}",
                response.status()
            )));
        }

        let parsed: DetectResponse = response
            .json()
            .await
            .map_err(|e| Error::External(format!("Invalid detector response: {e}")))?;

        Ok(parsed
            .faces
            .into_iter()
            .map(|f| DetectedFace {
                bbox: Bbox {
                    x: f.bbox[0].max(0.0) as u32,
                    y: f.bbox[1].max(0.0) as u32,
                    width: f.bbox[2].max(0.0) as u32,
                    height: f.bbox[3].max(0.0) as u32,
                },
                embedding: f.embedding,
            })
            .collect())
    }
}
