//! Configuration types for split-ingest
//!
//! A [`Config`] is built once at startup (from a JSON file, CLI flags, or both)
//! and shared read-only as `Arc<Config>`. No component reads ambient global state.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Decompression tool settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Path to the 7z executable (auto-detected if None or missing)
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Whether to search PATH and well-known install locations when `path` is
    /// unset or does not exist (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            path: None,
            search_path: true,
        }
    }
}

/// Main configuration for the ingestion service
///
/// All directory roles live under `base_path`:
/// `Incoming/`, `Temp/`, `Completed/`, `Processed/`, `Failed/` and the log file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Root of the directory layout (default: "./ingest")
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,

    /// Reconciliation sweep interval (default: 30 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Settle interval between the two size readings of the stability check (default: 5 seconds)
    #[serde(default = "default_stability_wait", with = "duration_serde")]
    pub stability_wait: Duration,

    /// Minimum age of a first part before the sweep considers it (default: 10 seconds)
    #[serde(default = "default_sweep_min_age", with = "duration_serde")]
    pub sweep_min_age: Duration,

    /// Maximum number of extraction attempts per job (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay between extraction attempts (default: 5 seconds)
    #[serde(default = "default_retry_delay", with = "duration_serde")]
    pub retry_delay: Duration,

    /// Decompression tool settings
    #[serde(default)]
    pub tool: ToolConfig,

    /// Log file name, created inside `base_path` (default: "ingest.log")
    #[serde(default = "default_log_file_name")]
    pub log_file_name: String,

    /// Ring the terminal bell when an archive succeeds or fails (default: false)
    #[serde(default)]
    pub notify_bell: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            poll_interval: default_poll_interval(),
            stability_wait: default_stability_wait(),
            sweep_min_age: default_sweep_min_age(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            tool: ToolConfig::default(),
            log_file_name: default_log_file_name(),
            notify_bell: false,
        }
    }
}

impl Config {
    /// Create a default configuration rooted at `base_path`
    pub fn with_base_path(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Default::default()
        }
    }

    /// Load a configuration from a JSON file
    ///
    /// Missing fields take their defaults. The result is not validated, so
    /// command-line overrides can still be applied before
    /// [`Config::validate`] runs.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read config file {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Check invariants the pipeline relies on
    pub fn validate(&self) -> Result<()> {
        if self.base_path.as_os_str().is_empty() {
            return Err(Error::Config {
                message: "base path must not be empty".to_string(),
                key: Some("base_path".to_string()),
            });
        }
        if self.max_retries == 0 {
            return Err(Error::Config {
                message: "at least one extraction attempt is required".to_string(),
                key: Some("max_retries".to_string()),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Config {
                message: "poll interval must be greater than zero".to_string(),
                key: Some("poll_interval".to_string()),
            });
        }
        if self.stability_wait.is_zero() {
            return Err(Error::Config {
                message: "stability wait must be greater than zero".to_string(),
                key: Some("stability_wait".to_string()),
            });
        }
        if self.log_file_name.trim().is_empty() {
            return Err(Error::Config {
                message: "log file name must not be empty".to_string(),
                key: Some("log_file_name".to_string()),
            });
        }
        Ok(())
    }

    /// Directory where archive parts land
    pub fn incoming_dir(&self) -> PathBuf {
        self.base_path.join("Incoming")
    }

    /// Root of the per-job scratch directories
    pub fn temp_dir(&self) -> PathBuf {
        self.base_path.join("Temp")
    }

    /// Final home of extracted trees, one subtree per archive base name
    pub fn completed_dir(&self) -> PathBuf {
        self.base_path.join("Completed")
    }

    /// Archive parts after successful extraction
    pub fn processed_dir(&self) -> PathBuf {
        self.base_path.join("Processed")
    }

    /// Archive parts after unrecoverable extraction failure
    pub fn failed_dir(&self) -> PathBuf {
        self.base_path.join("Failed")
    }

    /// Path of the log file
    pub fn log_file(&self) -> PathBuf {
        self.base_path.join(&self.log_file_name)
    }

    /// All directory roles, in bootstrap order
    pub fn directories(&self) -> [PathBuf; 5] {
        [
            self.incoming_dir(),
            self.temp_dir(),
            self.completed_dir(),
            self.processed_dir(),
            self.failed_dir(),
        ]
    }
}

fn default_base_path() -> PathBuf {
    PathBuf::from("./ingest")
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_stability_wait() -> Duration {
    Duration::from_secs(5)
}

fn default_sweep_min_age() -> Duration {
    Duration::from_secs(10)
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_log_file_name() -> String {
    "ingest.log".to_string()
}

fn default_true() -> bool {
    true
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
