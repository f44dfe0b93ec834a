//! Capture → inference → parse → persist → notify loop.
//!
//! Cycles run strictly one after another. A failed capture or inference
//! ends the cycle early; storage and notification failures are logged and
//! the cycle carries on. Nothing here ever ends the loop except the
//! cancellation token.

use crate::notifier::{self, Alerter};
use frownbully_core::{
    parse, DetectionStore, InferenceClient, InferenceError, PersistenceError, PredictionSet,
};
use frownbully_hw::{Capture, CaptureError, CaptureSettings};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Produces one still image per call.
pub trait ImageSource {
    async fn capture(&self) -> Result<Capture, CaptureError>;
}

/// Turns an image into a textual classification report.
pub trait Classifier {
    async fn infer(&self, image: &Path, confidence_threshold: f64)
        -> Result<String, InferenceError>;
}

/// Durable storage for detection records.
pub trait DetectionSink {
    fn record_capture(&self, image: &Path) -> Result<(), PersistenceError>;
    fn record_predictions(
        &self,
        image: &Path,
        predictions: &PredictionSet,
    ) -> Result<usize, PersistenceError>;
    fn mark_notified(&self, image: &Path) -> Result<(), PersistenceError>;
}

/// Camera capture on a blocking worker thread.
pub struct CameraSource {
    settings: Arc<CaptureSettings>,
}

impl CameraSource {
    pub fn new(settings: CaptureSettings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }
}

impl ImageSource for CameraSource {
    async fn capture(&self) -> Result<Capture, CaptureError> {
        let settings = Arc::clone(&self.settings);
        tokio::task::spawn_blocking(move || frownbully_hw::capture(&settings))
            .await
            .unwrap_or_else(|e| {
                Err(CaptureError::DeviceUnavailable {
                    attempts: 0,
                    last_error: format!("capture task failed: {e}"),
                })
            })
    }
}

impl Classifier for InferenceClient {
    async fn infer(
        &self,
        image: &Path,
        confidence_threshold: f64,
    ) -> Result<String, InferenceError> {
        InferenceClient::infer(self, image, confidence_threshold).await
    }
}

impl DetectionSink for DetectionStore {
    fn record_capture(&self, image: &Path) -> Result<(), PersistenceError> {
        DetectionStore::record_capture(self, image).map(|_| ())
    }

    fn record_predictions(
        &self,
        image: &Path,
        predictions: &PredictionSet,
    ) -> Result<usize, PersistenceError> {
        DetectionStore::record_predictions(self, image, predictions)
    }

    fn mark_notified(&self, image: &Path) -> Result<(), PersistenceError> {
        DetectionStore::mark_notified(self, image)
    }
}

/// Where the controller currently is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Capturing,
    Inferring,
    Parsing,
    Persisting,
    Notifying,
}

/// How a single cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No image; nothing else was attempted.
    CaptureFailed,
    /// Image captured and recorded, but no report came back.
    InferenceFailed,
    Completed { labels: usize, alerts: usize },
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub interval: Duration,
    pub confidence_threshold: f64,
    pub alert_threshold: f64,
}

pub struct Pipeline<S, C, D, A> {
    source: S,
    classifier: C,
    sink: D,
    alerter: A,
    settings: PipelineSettings,
    stage: Stage,
}

impl<S, C, D, A> Pipeline<S, C, D, A>
where
    S: ImageSource,
    C: Classifier,
    D: DetectionSink,
    A: Alerter,
{
    pub fn new(source: S, classifier: C, sink: D, alerter: A, settings: PipelineSettings) -> Self {
        Self {
            source,
            classifier,
            sink,
            alerter,
            settings,
            stage: Stage::Idle,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn enter(&mut self, stage: Stage) {
        tracing::debug!(from = ?self.stage, to = ?stage, "stage transition");
        self.stage = stage;
    }

    /// Run cycles until `cancel` fires. Returns the number of cycles run.
    ///
    /// The token is checked before each cycle and during the sleep; a cycle
    /// in progress always runs to completion.
    pub async fn run(&mut self, cancel: CancellationToken) -> u64 {
        tracing::info!(interval = ?self.settings.interval, "pipeline started");
        let mut cycles = 0u64;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.interval) => {}
                _ = cancel.cancelled() => break,
            }

            cycles += 1;
            let span = tracing::info_span!("cycle", n = cycles);
            match self.run_cycle().instrument(span).await {
                CycleOutcome::Completed { labels, alerts } => {
                    tracing::info!(cycle = cycles, labels, alerts, "cycle completed");
                }
                skipped => tracing::info!(cycle = cycles, outcome = ?skipped, "cycle skipped"),
            }
        }

        tracing::info!(cycles, stage = ?self.stage(), "pipeline terminated");
        cycles
    }

    /// Execute one capture → notify pass.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.enter(Stage::Capturing);
        let capture = match self.source.capture().await {
            Ok(capture) => capture,
            Err(e) => {
                tracing::warn!(error = %e, "capture failed; skipping cycle");
                self.enter(Stage::Idle);
                return CycleOutcome::CaptureFailed;
            }
        };
        let image = capture.path.as_path();

        if let Err(e) = self.sink.record_capture(image) {
            tracing::error!(error = %e, "failed to record capture");
        }

        self.enter(Stage::Inferring);
        let report = match self
            .classifier
            .infer(image, self.settings.confidence_threshold)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "inference failed; skipping rest of cycle");
                self.enter(Stage::Idle);
                return CycleOutcome::InferenceFailed;
            }
        };

        self.enter(Stage::Parsing);
        let predictions = parse(report.as_str());

        self.enter(Stage::Persisting);
        if let Err(e) = self.sink.record_predictions(image, &predictions) {
            tracing::error!(error = %e, "failed to store predictions");
        }

        self.enter(Stage::Notifying);
        let alerts = notifier::notify(&self.alerter, &predictions, self.settings.alert_threshold).await;
        if alerts > 0 {
            if let Err(e) = self.sink.mark_notified(image) {
                tracing::error!(error = %e, "failed to flag record as notified");
            }
        }

        self.enter(Stage::Idle);
        CycleOutcome::Completed {
            labels: predictions.len(),
            alerts,
        }
    }
}
