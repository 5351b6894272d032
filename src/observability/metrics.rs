use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub transitions_total: IntCounterVec,
    pub assignment_outcomes_total: IntCounterVec,
    pub reclaimed_total: IntCounterVec,
    pub routing_fallbacks_total: IntCounterVec,
    pub notifications_total: IntCounterVec,
    pub pending_requests: IntGauge,
    pub ranking_latency_seconds: HistogramVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new("transitions_total", "State transitions by entity and kind"),
            &["entity", "transition"],
        )
        .expect("valid transitions_total metric");

        let assignment_outcomes_total = IntCounterVec::new(
            Opts::new(
                "assignment_outcomes_total",
                "Assignment attempts by mode and outcome",
            ),
            &["mode", "outcome"],
        )
        .expect("valid assignment_outcomes_total metric");

        let reclaimed_total = IntCounterVec::new(
            Opts::new("reclaimed_total", "Stale assignments reclaimed by the sweeper"),
            &["entity"],
        )
        .expect("valid reclaimed_total metric");

        let routing_fallbacks_total = IntCounterVec::new(
            Opts::new(
                "routing_fallbacks_total",
                "Route computations that fell back to a degraded mode",
            ),
            &["reason"],
        )
        .expect("valid routing_fallbacks_total metric");

        let notifications_total = IntCounterVec::new(
            Opts::new("notifications_total", "Notifications by delivery result"),
            &["result"],
        )
        .expect("valid notifications_total metric");

        let pending_requests = IntGauge::new(
            "pending_requests",
            "Batches and orders waiting for a courier response",
        )
        .expect("valid pending_requests metric");

        let ranking_latency_seconds = HistogramVec::new(
            HistogramOpts::new("ranking_latency_seconds", "Candidate ranking latency in seconds"),
            &["mode"],
        )
        .expect("valid ranking_latency_seconds metric");

        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(assignment_outcomes_total.clone()))
            .expect("register assignment_outcomes_total");
        registry
            .register(Box::new(reclaimed_total.clone()))
            .expect("register reclaimed_total");
        registry
            .register(Box::new(routing_fallbacks_total.clone()))
            .expect("register routing_fallbacks_total");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");
        registry
            .register(Box::new(pending_requests.clone()))
            .expect("register pending_requests");
        registry
            .register(Box::new(ranking_latency_seconds.clone()))
            .expect("register ranking_latency_seconds");

        Self {
            registry,
            transitions_total,
            assignment_outcomes_total,
            reclaimed_total,
            routing_fallbacks_total,
            notifications_total,
            pending_requests,
            ranking_latency_seconds,
        }
    }

    pub fn transition(&self, entity: &str, transition: &str) {
        self.transitions_total
            .with_label_values(&[entity, transition])
            .inc();
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
