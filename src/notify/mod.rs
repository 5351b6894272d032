use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::models::notification::{Notification, NotificationCategory};
use crate::observability::metrics::Metrics;
use crate::store::Store;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("no live subscribers")]
    NoSubscribers,

    #[error("publish failed: {0}")]
    Failed(String),
}

/// Real-time delivery channel addressed by recipient id. Implementations must
/// not block.
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notification: &Notification) -> Result<(), PublishError>;
}

/// Publishes onto an in-process broadcast channel; websocket sessions
/// subscribe and filter by recipient.
pub struct BroadcastPublisher {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastPublisher {
    pub fn new(tx: broadcast::Sender<Notification>) -> Self {
        Self { tx }
    }
}

impl NotificationPublisher for BroadcastPublisher {
    fn publish(&self, notification: &Notification) -> Result<(), PublishError> {
        self.tx
            .send(notification.clone())
            .map(|_| ())
            .map_err(|_| PublishError::NoSubscribers)
    }
}

/// Records a notification in the store, then hands it to the publisher.
/// Publishing is best effort: a failure is logged and never undoes the
/// state transition that triggered it.
pub struct Notifier {
    publisher: Arc<dyn NotificationPublisher>,
    clock: Arc<dyn Clock>,
}

impl Notifier {
    pub fn new(publisher: Arc<dyn NotificationPublisher>, clock: Arc<dyn Clock>) -> Self {
        Self { publisher, clock }
    }

    pub fn send(
        &self,
        store: &Store,
        metrics: &Metrics,
        recipient: Uuid,
        category: NotificationCategory,
        message: impl Into<String>,
        payload: Option<Value>,
    ) -> Notification {
        let notification = Notification {
            id: Uuid::new_v4(),
            recipient,
            message: message.into(),
            category,
            read: false,
            created_at: self.clock.now(),
            payload,
        };

        store.save_notification(notification.clone());

        match self.publisher.publish(&notification) {
            Ok(()) => {
                metrics
                    .notifications_total
                    .with_label_values(&["published"])
                    .inc();
            }
            Err(PublishError::NoSubscribers) => {
                metrics
                    .notifications_total
                    .with_label_values(&["stored"])
                    .inc();
                debug!(recipient = %recipient, "no live subscribers; notification stored only");
            }
            Err(err) => {
                metrics
                    .notifications_total
                    .with_label_values(&["failed"])
                    .inc();
                warn!(recipient = %recipient, error = %err, "notification publish failed");
            }
        }

        notification
    }
}
