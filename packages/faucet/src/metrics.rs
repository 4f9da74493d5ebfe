//! Prometheus metrics

use prometheus::{Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry};

/// Latency buckets in seconds; chain finality dominates
const DURATION_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0];

/// Prometheus metrics
pub struct Metrics {
    /// Terminal outcomes by environment and outcome (completed / noop / failed)
    pub distributions_total: IntCounterVec,
    /// Failures by error kind
    pub failures_total: IntCounterVec,
    /// Transfers delivered by asset and environment
    pub transfers_total: IntCounterVec,
    /// Request latency from receipt to terminal state
    pub distribution_duration_seconds: Histogram,
    /// Addresses with a live rate-limit window
    pub rate_limited_addresses: IntGauge,
    /// 1 when the operator can fund one request of every asset on both environments
    pub operator_funded: IntGauge,
    pub registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let distributions_total = IntCounterVec::new(
            Opts::new(
                "faucet_distributions_total",
                "Distribution requests by environment and terminal outcome",
            ),
            &["environment", "outcome"],
        )
        .expect("constant metric name is valid");

        let failures_total = IntCounterVec::new(
            Opts::new("faucet_failures_total", "Failed distributions by error kind"),
            &["kind"],
        )
        .expect("constant metric name is valid");

        let transfers_total = IntCounterVec::new(
            Opts::new(
                "faucet_transfers_total",
                "Asset transfers delivered by asset and environment",
            ),
            &["asset", "environment"],
        )
        .expect("constant metric name is valid");

        let distribution_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "faucet_distribution_duration_seconds",
                "Time from request receipt to terminal state",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
        )
        .expect("constant metric name is valid");

        let rate_limited_addresses = IntGauge::new(
            "faucet_rate_limited_addresses",
            "Addresses with a live rate-limit window",
        )
        .expect("constant metric name is valid");

        let operator_funded = IntGauge::new(
            "faucet_operator_funded",
            "1 when the operator can fund one request of every asset",
        )
        .expect("constant metric name is valid");

        registry
            .register(Box::new(distributions_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(failures_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(transfers_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(distribution_duration_seconds.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(rate_limited_addresses.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(operator_funded.clone()))
            .expect("metric registration must not be called twice");

        Self {
            distributions_total,
            failures_total,
            transfers_total,
            distribution_duration_seconds,
            rate_limited_addresses,
            operator_funded,
            registry,
        }
    }
}
