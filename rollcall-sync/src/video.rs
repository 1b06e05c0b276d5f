//! Video probing and frame sampling
//!
//! Decoding is delegated to the ffmpeg command-line tools: ffprobe reports
//! stream metadata, and one ffmpeg invocation per sample seeks to a
//! timestamp and emits a single JPEG on stdout. Sampling is lazy; the
//! pipeline pulls one frame at a time, so cancellation between frames
//! costs at most one decode.

use rollcall_common::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Stream metadata gathered before sampling begins
#[derive(Debug, Clone, Copy)]
pub struct VideoProbe {
    pub duration_secs: f64,
    pub fps: f64,
}

impl VideoProbe {
    /// Number of samples a run over this video will produce at the given
    /// interval. Used as the denominator for progress reporting.
    pub fn sample_count(&self, interval_secs: f64) -> u64 {
        if self.duration_secs <= 0.0 || interval_secs <= 0.0 {
            return 0;
        }
        (self.duration_secs / interval_secs).floor() as u64 + 1
    }
}

#[derive(Deserialize)]
struct ProbeOutput {
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeStream {
    /// e.g. "30000/1001"
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

fn parse_frame_rate(raw: &str) -> Option<f64> {
    match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den > 0.0 && num > 0.0 {
                Some(num / den)
            } else {
                None
            }
        }
        None => raw.trim().parse().ok().filter(|f: &f64| *f > 0.0),
    }
}

/// Probe a video file with ffprobe
pub async fn probe_video(path: &Path) -> Result<VideoProbe> {
    if !path.exists() {
        return Err(Error::NotFound(format!("Video file {}", path.display())));
    }

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=r_frame_rate,duration",
            "-show_entries",
            "format=duration",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .await
        .map_err(|e| Error::External(format!("Failed to execute ffprobe: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::External(format!(
            "ffprobe failed on {}: {}",
            path.display(),
            stderr.trim()
        )));
    }

    let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)
        .map_err(|e| Error::External(format!("Failed to parse ffprobe output: {e}")))?;

    let stream = parsed
        .streams
        .first()
        .ok_or_else(|| Error::External(format!("No video stream in {}", path.display())))?;

    let fps = stream
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .ok_or_else(|| Error::External("Could not determine frame rate".to_string()))?;

    // Stream duration when present, container duration as fallback
    let duration_secs = stream
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            parsed
                .format
                .as_ref()
                .and_then(|f| f.duration.as_deref())
                .and_then(|d| d.parse::<f64>().ok())
        })
        .ok_or_else(|| Error::External("Could not determine video duration".to_string()))?;

    Ok(VideoProbe { duration_secs, fps })
}

/// A frame pulled out of the recording
#[derive(Debug)]
pub struct SampledFrame {
    pub jpeg: Vec<u8>,
    pub timestamp_secs: f64,
    pub index: u64,
}

/// Lazy frame sampler stepping through the video at a fixed interval.
///
/// Steps are quantized to whole source frames so sampling is stable across
/// videos with odd frame rates: step k lands on frame
/// `round(fps * interval) * k`.
pub struct FrameSampler {
    path: PathBuf,
    fps: f64,
    duration_secs: f64,
    frame_step: u64,
    next_index: u64,
    finished: bool,
}

impl FrameSampler {
    pub fn new(path: PathBuf, probe: VideoProbe, interval_secs: f64) -> Self {
        let frame_step = ((probe.fps * interval_secs).round() as u64).max(1);
        Self {
            path,
            fps: probe.fps,
            duration_secs: probe.duration_secs,
            frame_step,
            next_index: 0,
            finished: false,
        }
    }

    /// Pull the next sampled frame. Returns `None` when the sampling
    /// position passes the end of the video, or when ffmpeg cannot produce
    /// a frame at the position (a truncated tail reads as end-of-stream,
    /// not an error).
    pub async fn next_frame(&mut self) -> Result<Option<SampledFrame>> {
        if self.finished {
            return Ok(None);
        }

        let index = self.next_index;
        let timestamp_secs = (index * self.frame_step) as f64 / self.fps;
        if timestamp_secs > self.duration_secs {
            self.finished = true;
            return Ok(None);
        }

        let output = Command::new("ffmpeg")
            .args(["-v", "error", "-ss"])
            .arg(format!("{timestamp_secs:.3}"))
            .arg("-i")
            .arg(&self.path)
            .args(["-frames:v", "1", "-f", "image2", "-c:v", "mjpeg", "pipe:1"])
            .output()
            .await
            .map_err(|e| Error::External(format!("Failed to execute ffmpeg: {e}")))?;

        if !output.status.success() || output.stdout.is_empty() {
            tracing::debug!(
                timestamp = timestamp_secs,
                "No frame at sample position, treating as end of stream"
            );
            self.finished = true;
            return Ok(None);
        }

        self.next_index += 1;
        Ok(Some(SampledFrame {
            jpeg: output.stdout,
            timestamp_secs,
            index,
        }))
    }
}

/// Deletes a temporary video file when the analysis run ends, however it
/// ends. Failure paths and cancellation drop through here the same as
/// success.
pub struct TempVideo {
    path: PathBuf,
}

impl TempVideo {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempVideo {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove temp video");
            }
        }
    }
}
