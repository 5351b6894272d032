use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::DispatchSettings;
use crate::models::notification::{Notification, NotificationCategory};
use crate::notify::{BroadcastPublisher, NotificationPublisher, Notifier};
use crate::observability::metrics::Metrics;
use crate::routing::direct::DirectLineRouteService;
use crate::routing::planner::RoutePlanner;
use crate::routing::RouteService;
use crate::store::locks::EntityLocks;
use crate::store::Store;

pub struct AppState {
    pub settings: DispatchSettings,
    pub store: Store,
    pub locks: EntityLocks,
    pub notifier: Notifier,
    pub planner: RoutePlanner,
    pub clock: Arc<dyn Clock>,
    pub metrics: Metrics,
    pub notification_events_tx: broadcast::Sender<Notification>,
}

impl AppState {
    /// Notifications go out on the in-process broadcast channel that
    /// websocket sessions subscribe to.
    pub fn new(
        settings: DispatchSettings,
        event_buffer_size: usize,
        routes: Arc<dyn RouteService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (notification_events_tx, _unused_rx) = broadcast::channel(event_buffer_size.max(1));
        let publisher = Arc::new(BroadcastPublisher::new(notification_events_tx.clone()));
        Self::assemble(settings, notification_events_tx, publisher, routes, clock)
    }

    pub fn with_publisher(
        settings: DispatchSettings,
        event_buffer_size: usize,
        publisher: Arc<dyn NotificationPublisher>,
        routes: Arc<dyn RouteService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (notification_events_tx, _unused_rx) = broadcast::channel(event_buffer_size.max(1));
        Self::assemble(settings, notification_events_tx, publisher, routes, clock)
    }

    /// System clock and straight-line routing.
    pub fn standalone(settings: DispatchSettings) -> Self {
        Self::new(
            settings,
            1024,
            Arc::new(DirectLineRouteService),
            Arc::new(SystemClock),
        )
    }

    pub fn notify(
        &self,
        recipient: Uuid,
        category: NotificationCategory,
        message: impl Into<String>,
        payload: Option<Value>,
    ) -> Notification {
        self.notifier
            .send(&self.store, &self.metrics, recipient, category, message, payload)
    }

    fn assemble(
        settings: DispatchSettings,
        notification_events_tx: broadcast::Sender<Notification>,
        publisher: Arc<dyn NotificationPublisher>,
        routes: Arc<dyn RouteService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let metrics = Metrics::new();

        Self {
            settings,
            store: Store::new(),
            locks: EntityLocks::new(),
            notifier: Notifier::new(publisher, clock.clone()),
            planner: RoutePlanner::new(routes, metrics.clone()),
            clock,
            metrics,
            notification_events_tx,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::AppState;
    use crate::clock::SystemClock;
    use crate::config::DispatchSettings;
    use crate::models::notification::NotificationCategory;
    use crate::routing::direct::DirectLineRouteService;

    #[test]
    fn zero_event_buffer_still_builds_a_channel() {
        let state = AppState::new(
            DispatchSettings::default(),
            0,
            Arc::new(DirectLineRouteService),
            Arc::new(SystemClock),
        );
        let mut rx = state.notification_events_tx.subscribe();
        let recipient = Uuid::new_v4();
        state.notify(recipient, NotificationCategory::StatusUpdate, "hello", None);

        assert_eq!(rx.try_recv().unwrap().recipient, recipient);
    }
}
