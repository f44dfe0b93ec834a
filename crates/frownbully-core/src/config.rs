use crate::inference::{InferenceConfig, DEFAULT_API_URL, DEFAULT_MODEL_ID};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{key} must be within [0, 1], got {value}")]
    ThresholdOutOfRange { key: &'static str, value: f64 },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Optional settings read from `config.toml`. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub camera_device: Option<String>,
    pub capture_retries: Option<u32>,
    pub capture_backoff_ms: Option<u64>,
    pub warmup_frames: Option<usize>,
    pub data_dir: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub model_id: Option<String>,
    pub inference_timeout_secs: Option<u64>,
    pub confidence_threshold: Option<f64>,
    pub alert_threshold: Option<f64>,
    pub notification_timeout_secs: Option<u64>,
    pub interval_secs: Option<u64>,
}

/// Runtime configuration: config file first, then `FROWNBULLY_*` overrides.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Frame reads per capture before giving up.
    pub capture_retries: u32,
    /// Delay between failed frame reads.
    pub capture_backoff: Duration,
    /// Frames discarded after opening the camera.
    pub warmup_frames: usize,
    /// Root for captures, database and logs.
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub log_dir: PathBuf,
    pub api_url: String,
    /// Required by the daemon; `None` until configured.
    pub api_key: Option<String>,
    pub model_id: String,
    pub inference_timeout: Duration,
    /// Minimum confidence for a class to appear in the inference report.
    pub confidence_threshold: f64,
    /// Confidence above which an alert is raised.
    pub alert_threshold: f64,
    pub notification_timeout: Duration,
    /// Pause before each pipeline cycle.
    pub interval: Duration,
}

impl Config {
    /// Load from the config file (if present) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("FROWNBULLY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_path());
        let file = FileConfig::read(&path)?;
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    /// Merge file settings with an environment lookup and validate.
    pub fn from_sources<F>(file: FileConfig, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| env(&format!("FROWNBULLY_{suffix}"));
        let parsed = |suffix: &str| var(suffix).and_then(|v| v.trim().parse::<f64>().ok());
        let parsed_u64 = |suffix: &str| var(suffix).and_then(|v| v.trim().parse::<u64>().ok());

        let data_dir = var("DATA_DIR")
            .map(PathBuf::from)
            .or(file.data_dir)
            .unwrap_or_else(crate::default_data_dir);

        let db_path = var("DB_PATH")
            .map(PathBuf::from)
            .or(file.db_path)
            .unwrap_or_else(|| data_dir.join("wrinkle_detection.db"));

        let log_dir = var("LOG_DIR")
            .map(PathBuf::from)
            .or(file.log_dir)
            .unwrap_or_else(|| data_dir.join("logs"));

        let config = Self {
            camera_device: var("CAMERA_DEVICE")
                .or(file.camera_device)
                .unwrap_or_else(|| "/dev/video0".to_string()),
            capture_retries: parsed_u64("CAPTURE_RETRIES")
                .and_then(|v| u32::try_from(v).ok())
                .or(file.capture_retries)
                .unwrap_or(3),
            capture_backoff: Duration::from_millis(
                parsed_u64("CAPTURE_BACKOFF_MS")
                    .or(file.capture_backoff_ms)
                    .unwrap_or(1000),
            ),
            warmup_frames: parsed_u64("WARMUP_FRAMES")
                .map(|v| v as usize)
                .or(file.warmup_frames)
                .unwrap_or(0),
            data_dir,
            db_path,
            log_dir,
            api_url: var("API_URL")
                .or(file.api_url)
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            api_key: var("API_KEY")
                .or(file.api_key)
                .filter(|k| !k.trim().is_empty()),
            model_id: var("MODEL_ID")
                .or(file.model_id)
                .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
            inference_timeout: Duration::from_secs(
                parsed_u64("INFERENCE_TIMEOUT_SECS")
                    .or(file.inference_timeout_secs)
                    .unwrap_or(30),
            ),
            confidence_threshold: parsed("CONFIDENCE_THRESHOLD")
                .or(file.confidence_threshold)
                .unwrap_or(0.3),
            alert_threshold: parsed("ALERT_THRESHOLD")
                .or(file.alert_threshold)
                .unwrap_or(0.5),
            notification_timeout: Duration::from_secs(
                parsed_u64("NOTIFICATION_TIMEOUT_SECS")
                    .or(file.notification_timeout_secs)
                    .unwrap_or(5),
            ),
            interval: Duration::from_secs(
                parsed_u64("INTERVAL_SECS")
                    .or(file.interval_secs)
                    .unwrap_or(5),
            ),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("confidence_threshold", self.confidence_threshold),
            ("alert_threshold", self.alert_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { key, value });
            }
        }
        if self.interval.is_zero() {
            return Err(ConfigError::Zero("interval_secs"));
        }
        if self.inference_timeout.is_zero() {
            return Err(ConfigError::Zero("inference_timeout_secs"));
        }
        Ok(())
    }

    /// Directory receiving captured JPEGs.
    pub fn captures_dir(&self) -> PathBuf {
        self.data_dir.join("captures")
    }

    /// Inference client settings, if an API key is configured.
    pub fn inference(&self) -> Option<InferenceConfig> {
        Some(InferenceConfig {
            api_url: self.api_url.clone(),
            api_key: self.api_key.clone()?,
            model_id: self.model_id.clone(),
            timeout: self.inference_timeout,
        })
    }
}

impl FileConfig {
    /// Read `path`; a missing file yields the empty configuration.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// `$XDG_CONFIG_HOME/frownbully/config.toml`
pub fn default_config_path() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        })
        .join("frownbully")
        .join("config.toml")
}
