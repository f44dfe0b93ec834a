use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use frownbully_core::{Config, DetectionRecord, DetectionStore, InferenceClient, Label};
use frownbully_hw::{Camera, CaptureSettings};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "frownbully", about = "Frownbully wrinkle-detection CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run remote inference on an image and print the report
    Infer {
        /// Image to classify
        image: PathBuf,
        /// Minimum confidence for a class to be reported (0.0–1.0)
        #[arg(default_value_t = 0.3)]
        threshold: f64,
    },
    /// Parse a saved inference report and print label confidences as JSON
    Parse {
        /// Report file ("-" for stdin)
        file: PathBuf,
    },
    /// Create the detection database and table
    InitDb,
    /// Show stored detection records
    History {
        /// Number of records to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Capture a single image with the configured camera
    Capture,
    /// List V4L2 capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;
    tracing::debug!(db = %config.db_path.display(), device = %config.camera_device, "configuration loaded");

    match cli.command {
        Commands::Infer { image, threshold } => {
            anyhow::ensure!(
                (0.0..=1.0).contains(&threshold),
                "threshold must be within [0, 1], got {threshold}"
            );
            let inference = config
                .inference()
                .context("no API key configured (set FROWNBULLY_API_KEY)")?;
            let client = InferenceClient::new(inference)?;
            let report = client.infer(&image, threshold).await?;
            print!("{report}");
        }
        Commands::Parse { file } => {
            let text = if file.as_os_str() == "-" {
                std::io::read_to_string(std::io::stdin()).context("failed to read stdin")?
            } else {
                std::fs::read_to_string(&file)
                    .with_context(|| format!("failed to read {}", file.display()))?
            };
            let predictions = frownbully_core::parse(text.as_str());
            println!("{}", serde_json::to_string_pretty(&predictions)?);
        }
        Commands::InitDb => {
            DetectionStore::open(&config.db_path)?;
            println!("Database ready at {}", config.db_path.display());
        }
        Commands::History { limit, json } => {
            let store = DetectionStore::open(&config.db_path)?;
            let records = store.recent(limit)?;
            if json {
                let values: Vec<_> = records.iter().map(record_json).collect();
                println!("{}", serde_json::to_string_pretty(&values)?);
            } else if records.is_empty() {
                println!("No detections recorded");
            } else {
                for record in &records {
                    println!("{}", format_record(record));
                }
            }
        }
        Commands::Capture => {
            let settings = CaptureSettings {
                device: config.camera_device.clone(),
                output_dir: config.captures_dir(),
                max_attempts: config.capture_retries,
                backoff: config.capture_backoff,
                warmup_frames: config.warmup_frames,
            };
            let capture = tokio::task::spawn_blocking(move || frownbully_hw::capture(&settings))
                .await
                .context("capture task failed")??;
            println!("{}", capture.path.display());
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
    }

    Ok(())
}

fn format_record(record: &DetectionRecord) -> String {
    let scores: Vec<String> = record
        .scores
        .iter()
        .filter_map(|(label, score)| score.map(|s| format!("{label}={:.1}%", s * 100.0)))
        .collect();
    let scores = if scores.is_empty() {
        "-".to_string()
    } else {
        scores.join(" ")
    };
    format!(
        "#{:<5} {:<3} {}  {}",
        record.id,
        if record.notified { "YES" } else { "NO" },
        record.image_path,
        scores
    )
}

fn record_json(record: &DetectionRecord) -> serde_json::Value {
    let scores: serde_json::Map<String, serde_json::Value> = Label::ALL
        .into_iter()
        .map(|label| (label.column().to_string(), record.score(label).into()))
        .collect();
    serde_json::json!({
        "id": record.id,
        "image_path": record.image_path,
        "scores": scores,
        "notification": if record.notified { "YES" } else { "NO" },
        "notification_threshold": record.notification_threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn record() -> DetectionRecord {
        DetectionRecord {
            id: 42,
            image_path: "/data/capture_1.jpg".into(),
            scores: Label::ALL
                .into_iter()
                .map(|l| (l, (l == Label::FrownLine).then_some(0.725)))
                .collect(),
            notified: true,
            notification_threshold: Some(0.5),
        }
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_infer_default_threshold() {
        let cli = Cli::try_parse_from(["frownbully", "infer", "face.jpg"]).unwrap();
        match cli.command {
            Commands::Infer { image, threshold } => {
                assert_eq!(image, PathBuf::from("face.jpg"));
                assert_eq!(threshold, 0.3);
            }
            _ => panic!("expected infer"),
        }
    }

    #[test]
    fn test_format_record() {
        assert_eq!(
            format_record(&record()),
            "#42    YES /data/capture_1.jpg  Frown Line=72.5%"
        );
    }

    #[test]
    fn test_record_json() {
        let value = record_json(&record());
        assert_eq!(value["scores"]["frown_line"], 0.725);
        assert!(value["scores"]["chin"].is_null());
        assert_eq!(value["notification"], "YES");
    }
}
