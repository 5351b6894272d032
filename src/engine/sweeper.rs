use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::engine::batches::reclaim_batch;
use crate::engine::orders::reclaim_order;
use crate::models::order::DeliveryStatus;
use crate::state::AppState;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub batches_reclaimed: usize,
    pub orders_reclaimed: usize,
}

pub async fn run_sweeper(state: Arc<AppState>) {
    info!(
        interval_secs = state.settings.sweep_interval.as_secs(),
        "timeout sweeper started"
    );

    let period = if state.settings.sweep_interval.is_zero() {
        warn!("zero sweep interval; sweeping every second instead");
        Duration::from_secs(1)
    } else {
        state.settings.sweep_interval
    };
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let report = sweep_once(&state).await;
        if report.batches_reclaimed + report.orders_reclaimed > 0 {
            info!(
                batches = report.batches_reclaimed,
                orders = report.orders_reclaimed,
                "stale assignments reclaimed"
            );
        } else {
            debug!("sweep found nothing to reclaim");
        }
    }
}

/// One pass over batches and orders whose request deadline has passed.
/// Each candidate is re-checked under its lock, so running a sweep twice
/// reclaims nothing the second time.
pub async fn sweep_once(state: &AppState) -> SweepReport {
    let now = state.clock.now();
    let batch_timeout = state.settings.batch_timeout;
    let mut report = SweepReport::default();

    let stale_batches = state.store.find_batches(|batch| {
        batch.awaiting_response()
            && batch
                .assignment_requested_at
                .is_some_and(|requested_at| requested_at + batch_timeout <= now)
    });
    for batch in stale_batches {
        match reclaim_batch(state, batch.id).await {
            Ok(true) => report.batches_reclaimed += 1,
            Ok(false) => {}
            Err(err) => error!(batch_id = %batch.id, error = %err, "batch reclamation failed"),
        }
    }

    let overdue_orders = state.store.find_orders(|order| {
        order.delivery_status == DeliveryStatus::DriverAssigned
            && order.assignment_expires_at.is_some_and(|deadline| deadline <= now)
    });
    for order in overdue_orders {
        match reclaim_order(state, order.id).await {
            Ok(Some(_)) => report.orders_reclaimed += 1,
            Ok(None) => {}
            Err(err) => error!(order_id = %order.id, error = %err, "order reclamation failed"),
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::run_sweeper;
    use crate::config::DispatchSettings;
    use crate::state::AppState;

    #[tokio::test]
    async fn zero_interval_does_not_kill_the_sweeper() {
        let settings = DispatchSettings {
            sweep_interval: Duration::ZERO,
            ..DispatchSettings::default()
        };
        let state = Arc::new(AppState::standalone(settings));

        let handle = tokio::spawn(run_sweeper(state));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!handle.is_finished());
        handle.abort();
    }
}
