use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub transitions_total: IntCounterVec,
    pub assignments_total: IntCounterVec,
    pub location_fixes_total: IntCounterVec,
    pub fanout_notifications_total: IntCounterVec,
    pub active_subscriptions: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new("transitions_total", "Status transitions by outcome"),
            &["outcome"],
        )
        .expect("valid transitions_total metric");

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Assignment attempts by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let location_fixes_total = IntCounterVec::new(
            Opts::new(
                "location_fixes_total",
                "Position fixes by result (accepted/throttled/error)",
            ),
            &["result"],
        )
        .expect("valid location_fixes_total metric");

        let fanout_notifications_total = IntCounterVec::new(
            Opts::new(
                "fanout_notifications_total",
                "Scoped result-set notifications by scope kind",
            ),
            &["scope"],
        )
        .expect("valid fanout_notifications_total metric");

        let active_subscriptions = IntGauge::new(
            "active_subscriptions",
            "Currently open observer subscriptions",
        )
        .expect("valid active_subscriptions metric");

        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(location_fixes_total.clone()))
            .expect("register location_fixes_total");
        registry
            .register(Box::new(fanout_notifications_total.clone()))
            .expect("register fanout_notifications_total");
        registry
            .register(Box::new(active_subscriptions.clone()))
            .expect("register active_subscriptions");

        Self {
            registry,
            transitions_total,
            assignments_total,
            location_fixes_total,
            fanout_notifications_total,
            active_subscriptions,
        }
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
