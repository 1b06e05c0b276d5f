//! Affect classification service client
//!
//! Best-effort enrichment: the pipeline sends a cropped face and tallies
//! whatever label comes back. Failures here never fail the analysis run;
//! the caller logs and moves on, and the record falls back to a neutral
//! affect. The short timeout keeps a slow classifier from dragging the
//! whole video behind it.

use async_trait::async_trait;
use rollcall_common::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

/// Classifier verdict for one face crop
#[derive(Debug, Clone, Deserialize)]
pub struct AffectPrediction {
    pub predicted_class: String,
    pub confidence: f32,
}

/// Assigns an affect label to a cropped face JPEG
#[async_trait]
pub trait AffectClassifier: Send + Sync {
    async fn classify(&self, face_jpeg: &[u8]) -> Result<AffectPrediction>;
}

/// HTTP client for the external affect model
pub struct HttpAffectClassifier {
    client: reqwest::Client,
    url: String,
}

impl HttpAffectClassifier {
    pub fn new(url: String, timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| Error::External(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl AffectClassifier for HttpAffectClassifier {
    async fn classify(&self, face_jpeg: &[u8]) -> Result<AffectPrediction> {
        let part = reqwest::multipart::Part::bytes(face_jpeg.to_vec())
            .file_name("face.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| Error::External(format!("Invalid multipart payload: {e}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::External(format!("Classifier request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::External(format!(
                "Classifier returned HTTP {}",
                response.status()
            )));
        }

        response
            .json::<AffectPrediction>()
            .await
            .map_err(|e| Error::External(format!("Invalid classifier response: {e}")))
    }
}
