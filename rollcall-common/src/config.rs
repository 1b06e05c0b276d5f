//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Engine configuration, loaded from `rollcall.toml` in the root folder.
///
/// Every field has a default so a missing or partial config file is fine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Address the HTTP adapter binds to
    pub bind_address: String,
    /// Cosine similarity threshold for a face match
    pub similarity_threshold: f32,
    /// Seconds between sampled frames during video analysis
    pub sample_interval_secs: f64,
    /// Face detector service base URL
    pub detector_url: String,
    /// Affect classifier endpoint URL
    pub classifier_url: String,
    /// Affect classifier request timeout in milliseconds
    pub classifier_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5810".to_string(),
            similarity_threshold: 0.50,
            sample_interval_secs: 1.5,
            detector_url: "http://127.0.0.1:5811".to_string(),
            classifier_url: "http://127.0.0.1:5812/predict_face".to_string(),
            classifier_timeout_ms: 2000,
        }
    }
}

impl EngineConfig {
    /// Load configuration from `rollcall.toml` under the root folder.
    ///
    /// A missing file yields the defaults; a malformed file is an error.
    pub fn load(root_folder: &Path) -> Result<Self> {
        let path = root_folder.join("rollcall.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>, env_var_name: &str) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return PathBuf::from(path);
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = find_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(root_folder) = config.get("root_folder").and_then(|v| v.as_str()) {
                    return PathBuf::from(root_folder);
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Find the platform configuration file, if any
fn find_config_file() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("rollcall").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }
    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/rollcall/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }
    Err(Error::Config("No config file found".to_string()))
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("rollcall"))
        .unwrap_or_else(|| PathBuf::from("./rollcall_data"))
}

/// Layout of working directories under the root folder
#[derive(Debug, Clone)]
pub struct RootFolder {
    root: PathBuf,
}

impl RootFolder {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create the root folder and its working subdirectories if missing
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [self.root.clone(), self.temp_dir(), self.evidence_dir()] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir)?;
                tracing::info!("Created directory {}", dir.display());
            }
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join("rollcall.db")
    }

    /// Uploaded videos awaiting analysis; entries are removed when a task ends
    pub fn temp_dir(&self) -> PathBuf {
        self.root.join("temp_videos")
    }

    /// Face crops and dispute photos, served publicly under /evidence
    pub fn evidence_dir(&self) -> PathBuf {
        self.root.join("evidence")
    }

    pub fn path(&self) -> &Path {
        &self.root
    }
}
