//! Desktop alerts via the freedesktop notification service.

use frownbully_core::PredictionSet;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;

pub const ALERT_TITLE: &str = "Wrinkle Detection Alert";
pub const ALERT_MESSAGE: &str = "You are frowning, try to relax your face";

const APP_NAME: &str = "frownbully";

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("notification delivery failed: {0}")]
    DeliveryFailure(String),
}

impl From<zbus::Error> for NotificationError {
    fn from(e: zbus::Error) -> Self {
        NotificationError::DeliveryFailure(e.to_string())
    }
}

// `#[zbus::proxy]` generates `NotificationsProxy` (async) for the
// org.freedesktop.Notifications service on the session bus.
#[zbus::proxy(
    interface = "org.freedesktop.Notifications",
    default_service = "org.freedesktop.Notifications",
    default_path = "/org/freedesktop/Notifications"
)]
trait Notifications {
    async fn notify(
        &self,
        app_name: &str,
        replaces_id: u32,
        app_icon: &str,
        summary: &str,
        body: &str,
        actions: &[&str],
        hints: &HashMap<&str, &zbus::zvariant::Value<'_>>,
        expire_timeout: i32,
    ) -> zbus::Result<u32>;
}

/// Something that can put a single alert in front of the user.
pub trait Alerter {
    async fn alert(&self, label: &str, confidence: f64) -> Result<(), NotificationError>;
}

/// Raise one alert per label whose confidence is strictly above
/// `alert_threshold`. Delivery failures are logged and skipped.
///
/// Returns the number of alerts delivered.
pub async fn notify<A: Alerter>(
    alerter: &A,
    predictions: &PredictionSet,
    alert_threshold: f64,
) -> usize {
    tracing::info!("checking predictions for notifications");

    let mut delivered = 0;
    for (label, confidence) in predictions.iter() {
        if confidence > alert_threshold {
            tracing::info!(label, confidence_pct = confidence * 100.0, "triggering notification");
            match alerter.alert(label, confidence).await {
                Ok(()) => delivered += 1,
                Err(e) => tracing::error!(label, error = %e, "error in notification system"),
            }
        } else {
            tracing::info!(label, confidence_pct = confidence * 100.0, "no notification triggered");
        }
    }
    delivered
}

/// Sends alerts to the desktop over D-Bus. The session bus connection is
/// opened on first use so the daemon can start without one.
pub struct DesktopNotifier {
    timeout: Duration,
    conn: OnceCell<zbus::Connection>,
}

impl DesktopNotifier {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            conn: OnceCell::new(),
        }
    }

    async fn connection(&self) -> Result<&zbus::Connection, NotificationError> {
        self.conn
            .get_or_try_init(|| async { zbus::Connection::session().await })
            .await
            .map_err(NotificationError::from)
    }
}

impl Alerter for DesktopNotifier {
    async fn alert(&self, _label: &str, _confidence: f64) -> Result<(), NotificationError> {
        let conn = self.connection().await?;
        let proxy = NotificationsProxy::new(conn).await?;
        let expire_ms = i32::try_from(self.timeout.as_millis()).unwrap_or(i32::MAX);

        let id = proxy
            .notify(
                APP_NAME,
                0,
                "dialog-warning",
                ALERT_TITLE,
                ALERT_MESSAGE,
                &[],
                &HashMap::new(),
                expire_ms,
            )
            .await?;

        tracing::debug!(id, "notification shown");
        Ok(())
    }
}
