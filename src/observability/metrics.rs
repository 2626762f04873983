use prometheus::{
    Encoder, GaugeVec, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub decisions_total: IntCounterVec,
    pub orders_in_queue: IntGauge,
    pub decision_latency_seconds: HistogramVec,
    pub courier_open_orders: GaugeVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let decisions_total = IntCounterVec::new(
            Opts::new("dispatch_decisions_total", "Dispatch decisions by outcome"),
            &["outcome"],
        )
        .expect("valid dispatch_decisions_total metric");

        let orders_in_queue = IntGauge::new("orders_in_queue", "Current number of orders in queue")
            .expect("valid orders_in_queue metric");

        let decision_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "dispatch_decision_latency_seconds",
                "Latency of one dispatch decision in seconds",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_decision_latency_seconds metric");

        let courier_open_orders = GaugeVec::new(
            Opts::new("courier_open_orders", "Open orders currently assigned per courier"),
            &["courier_id"],
        )
        .expect("valid courier_open_orders metric");

        registry
            .register(Box::new(decisions_total.clone()))
            .expect("register dispatch_decisions_total");
        registry
            .register(Box::new(orders_in_queue.clone()))
            .expect("register orders_in_queue");
        registry
            .register(Box::new(decision_latency_seconds.clone()))
            .expect("register dispatch_decision_latency_seconds");
        registry
            .register(Box::new(courier_open_orders.clone()))
            .expect("register courier_open_orders");

        Self {
            registry,
            decisions_total,
            orders_in_queue,
            decision_latency_seconds,
            courier_open_orders,
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
