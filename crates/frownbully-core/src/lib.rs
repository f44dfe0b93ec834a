//! frownbully-core — Wrinkle classification plumbing.
//!
//! Talks to the hosted wrinkle-detection model, turns its textual report
//! into per-label confidences and keeps them in SQLite.

pub mod config;
pub mod inference;
pub mod parser;
pub mod store;
pub mod types;

pub use config::{Config, ConfigError};
pub use inference::{InferenceClient, InferenceConfig, InferenceError, Prediction};
pub use parser::parse;
pub use store::{DetectionRecord, DetectionStore, PersistenceError};
pub use types::{Label, PredictionSet};

use std::path::PathBuf;

/// Per-user data directory (`$XDG_DATA_HOME/frownbully`).
pub fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("frownbully")
}
