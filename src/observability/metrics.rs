use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub dispatch_cycles_total: IntCounterVec,
    pub assignments_total: IntCounterVec,
    pub cycle_duration_seconds: Histogram,
    pub reroutes_total: IntCounter,
    pub auto_dispatch_enabled: IntGauge,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let dispatch_cycles_total = IntCounterVec::new(
            Opts::new("dispatch_cycles_total", "Dispatch cycles by outcome"),
            &["outcome"],
        )
        .expect("valid dispatch_cycles_total metric");

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Assignment commits by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let cycle_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "cycle_duration_seconds",
            "Wall time of a full dispatch cycle in seconds",
        ))
        .expect("valid cycle_duration_seconds metric");

        let reroutes_total = IntCounter::new("reroutes_total", "Reroute records written")
            .expect("valid reroutes_total metric");

        let auto_dispatch_enabled =
            IntGauge::new("auto_dispatch_enabled", "1 while automatic dispatch is armed")
                .expect("valid auto_dispatch_enabled metric");

        registry
            .register(Box::new(dispatch_cycles_total.clone()))
            .expect("register dispatch_cycles_total");
        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(cycle_duration_seconds.clone()))
            .expect("register cycle_duration_seconds");
        registry
            .register(Box::new(reroutes_total.clone()))
            .expect("register reroutes_total");
        registry
            .register(Box::new(auto_dispatch_enabled.clone()))
            .expect("register auto_dispatch_enabled");

        Self {
            registry,
            dispatch_cycles_total,
            assignments_total,
            cycle_duration_seconds,
            reroutes_total,
            auto_dispatch_enabled,
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
