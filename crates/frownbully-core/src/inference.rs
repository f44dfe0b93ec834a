//! Client for the hosted wrinkle-detection model.
//!
//! Sends a base64-encoded image to a Roboflow-style inference endpoint and
//! renders the returned predictions as a plain-text report, one
//! `<label>: <pct>% confidence` line per class above the requested
//! confidence threshold.

use base64::Engine;
use serde::Deserialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "https://detect.roboflow.com";
pub const DEFAULT_MODEL_ID: &str = "wrinkle-detection/2";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const REPORT_HEADER: &str = "### Detected Wrinkle Types ###";
const NO_DETECTIONS: &str = "No wrinkles detected above the threshold.";

/// Longest slice of an error body kept in `RemoteFailure` messages.
const MAX_ERROR_BODY: usize = 200;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("image not found: {}", .0.display())]
    ImageNotFound(PathBuf),
    #[error("inference timed out after {0:?}")]
    Timeout(Duration),
    #[error("remote service failed (HTTP {status}): {message}")]
    RemoteFailure { status: u16, message: String },
    #[error("unexpected inference error: {0}")]
    Unexpected(String),
}

/// Endpoint and credentials for the hosted model.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub api_url: String,
    pub api_key: String,
    pub model_id: String,
    pub timeout: Duration,
}

impl InferenceConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: api_key.into(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// One class prediction as returned by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    #[serde(rename = "class")]
    pub label: String,
    pub confidence: f64,
}

#[derive(Debug, Deserialize)]
struct InferResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

pub struct InferenceClient {
    client: reqwest::Client,
    config: InferenceConfig,
}

impl InferenceClient {
    pub fn new(config: InferenceConfig) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("frownbully/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| InferenceError::Unexpected(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Run inference on an image and return the textual report.
    pub async fn infer(
        &self,
        image_path: &Path,
        confidence_threshold: f64,
    ) -> Result<String, InferenceError> {
        match self.predict(image_path).await {
            Ok(predictions) => {
                tracing::info!(count = predictions.len(), "inference completed");
                Ok(render_report(&predictions, confidence_threshold))
            }
            Err(e) => {
                tracing::error!(path = %image_path.display(), error = %e, "inference failed");
                Err(e)
            }
        }
    }

    /// Run inference on an image and return the raw predictions.
    pub async fn predict(&self, image_path: &Path) -> Result<Vec<Prediction>, InferenceError> {
        if !image_path.is_file() {
            return Err(InferenceError::ImageNotFound(image_path.to_path_buf()));
        }

        tracing::info!(path = %image_path.display(), model = %self.config.model_id, "running inference");

        let bytes = tokio::fs::read(image_path)
            .await
            .map_err(|e| InferenceError::Unexpected(format!("failed to read image: {e}")))?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);

        let url = format!(
            "{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.model_id.trim_start_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .query(&[("api_key", self.config.api_key.as_str())])
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(encoded)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.classify(e))?;

        if !status.is_success() {
            return Err(InferenceError::RemoteFailure {
                status: status.as_u16(),
                message: truncate(&body, MAX_ERROR_BODY),
            });
        }

        let parsed: InferResponse = serde_json::from_str(&body)
            .map_err(|e| InferenceError::Unexpected(format!("invalid response body: {e}")))?;
        if let Some(error) = parsed.error {
            let message = match error {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            return Err(InferenceError::RemoteFailure {
                status: status.as_u16(),
                message: truncate(&message, MAX_ERROR_BODY),
            });
        }
        Ok(parsed.predictions)
    }

    fn classify(&self, e: reqwest::Error) -> InferenceError {
        if e.is_timeout() {
            InferenceError::Timeout(self.config.timeout)
        } else {
            InferenceError::Unexpected(e.to_string())
        }
    }
}

/// Render predictions at or above `threshold` as a report.
pub fn render_report(predictions: &[Prediction], threshold: f64) -> String {
    let kept: Vec<_> = predictions
        .iter()
        .filter(|p| p.confidence >= threshold)
        .collect();

    if kept.is_empty() {
        return format!("\n{NO_DETECTIONS}\n");
    }

    let mut out = format!("\n{REPORT_HEADER}\n");
    for p in kept {
        let _ = writeln!(out, "{}: {:.2}% confidence", p.label, p.confidence * 100.0);
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    let s = s.trim();
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn pred(label: &str, confidence: f64) -> Prediction {
        Prediction {
            label: label.into(),
            confidence,
        }
    }

    /// Accept one HTTP request, answer it, and hand back the raw request.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
        delay: Duration,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = sock.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw);
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let content_length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if raw.len() >= head_end + 4 + content_length {
                        break;
                    }
                }
            }

            tokio::time::sleep(delay).await;
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = sock.write_all(response.as_bytes()).await;
            let _ = sock.shutdown().await;
            String::from_utf8_lossy(&raw).into_owned()
        });

        (format!("http://{addr}"), handle)
    }

    fn client(api_url: String, timeout: Duration) -> InferenceClient {
        InferenceClient::new(InferenceConfig {
            api_url,
            api_key: "secret".into(),
            model_id: "wrinkle-detection/2".into(),
            timeout,
        })
        .unwrap()
    }

    fn image_file(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("capture.jpg");
        std::fs::write(&path, [0xFF, 0xD8, 0xFF, 0xD9]).unwrap();
        path
    }

    #[test]
    fn test_render_report_filters_by_threshold() {
        let report = render_report(&[pred("Frown Line", 0.725), pred("Chin", 0.1)], 0.3);
        assert_eq!(
            report,
            "\n### Detected Wrinkle Types ###\nFrown Line: 72.50% confidence\n"
        );
    }

    #[test]
    fn test_render_report_threshold_is_inclusive() {
        let report = render_report(&[pred("Chin", 0.3)], 0.3);
        assert!(report.contains("Chin: 30.00% confidence"));
    }

    #[test]
    fn test_render_report_empty() {
        assert_eq!(
            render_report(&[], 0.3),
            "\nNo wrinkles detected above the threshold.\n"
        );
    }

    #[test]
    fn test_report_parses_back() {
        let report = render_report(&[pred("Frown Line", 0.725), pred("Forehead", 0.5)], 0.3);
        let set = crate::parser::parse(report.as_str());
        assert_eq!(set.len(), 2);
        assert!((set.get("Frown Line").unwrap() - 0.725).abs() < 1e-9);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("  short ", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc…");
    }

    #[tokio::test]
    async fn test_missing_image() {
        let c = client("http://127.0.0.1:9".into(), Duration::from_secs(1));
        let err = c
            .infer(Path::new("/nonexistent/capture.jpg"), 0.3)
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::ImageNotFound(_)));
    }

    #[tokio::test]
    async fn test_infer_success() {
        let dir = tempfile::tempdir().unwrap();
        let image = image_file(&dir);
        let (url, server) = serve_once(
            "200 OK",
            r#"{"predictions":[{"class":"Frown Line","confidence":0.725,"x":1.0},{"class":"Chin","confidence":0.1}]}"#,
            Duration::ZERO,
        )
        .await;

        let report = client(url, Duration::from_secs(5))
            .infer(&image, 0.3)
            .await
            .unwrap();
        assert!(report.contains("Frown Line: 72.50% confidence"));
        assert!(!report.contains("Chin"));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /wrinkle-detection/2?api_key=secret "));
        let expected_body = base64::engine::general_purpose::STANDARD.encode([0xFF, 0xD8, 0xFF, 0xD9]);
        assert!(request.ends_with(&expected_body));
    }

    #[tokio::test]
    async fn test_infer_remote_failure() {
        let dir = tempfile::tempdir().unwrap();
        let image = image_file(&dir);
        let (url, _server) = serve_once(
            "403 Forbidden",
            r#"{"message":"Forbidden"}"#,
            Duration::ZERO,
        )
        .await;

        let err = client(url, Duration::from_secs(5))
            .infer(&image, 0.3)
            .await
            .unwrap_err();
        match err {
            InferenceError::RemoteFailure { status, message } => {
                assert_eq!(status, 403);
                assert!(message.contains("Forbidden"));
            }
            other => panic!("expected RemoteFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_infer_error_body_is_remote_failure() {
        let dir = tempfile::tempdir().unwrap();
        let image = image_file(&dir);
        let (url, _server) = serve_once(
            "200 OK",
            r#"{"error":"model not found"}"#,
            Duration::ZERO,
        )
        .await;

        let err = client(url, Duration::from_secs(5))
            .infer(&image, 0.3)
            .await
            .unwrap_err();
        match err {
            InferenceError::RemoteFailure { status, message } => {
                assert_eq!(status, 200);
                assert_eq!(message, "model not found");
            }
            other => panic!("expected RemoteFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_infer_invalid_body_is_unexpected() {
        let dir = tempfile::tempdir().unwrap();
        let image = image_file(&dir);
        let (url, _server) = serve_once("200 OK", "not json", Duration::ZERO).await;

        let err = client(url, Duration::from_secs(5))
            .infer(&image, 0.3)
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Unexpected(_)));
    }

    #[tokio::test]
    async fn test_infer_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let image = image_file(&dir);
        let (url, _server) = serve_once("200 OK", "{}", Duration::from_secs(10)).await;

        let err = client(url, Duration::from_millis(200))
            .infer(&image, 0.3)
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Timeout(_)));
    }
}
