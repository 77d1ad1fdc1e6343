//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the wallet service.
//!
//! # Metrics
//!
//! - `wallet_requests_total` - Requests by route and outcome
//! - `wallet_sync_cycles_total` - Completed write-back cycles
//! - `wallet_sync_records_total` - Documents written by the synchronizer
//! - `wallet_sync_duration_seconds` - Histogram of write-back cycle latency
//! - `wallet_sync_pending_units` - Dirty units left after the last cycle

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Requests by route and outcome
    pub requests_total: IntCounterVec,

    /// Completed sync cycles
    pub sync_cycles_total: IntCounter,

    /// Documents written
    pub sync_records_total: IntCounter,

    /// Sync cycle duration histogram
    pub sync_duration: Histogram,

    /// Units still dirty after the last cycle
    pub sync_pending_units: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let requests_total = IntCounterVec::new(
            Opts::new("wallet_requests_total", "Requests by route and outcome"),
            &["route", "outcome"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let sync_cycles_total = IntCounter::new(
            "wallet_sync_cycles_total",
            "Completed write-back cycles",
        )?;
        registry.register(Box::new(sync_cycles_total.clone()))?;

        let sync_records_total = IntCounter::new(
            "wallet_sync_records_total",
            "Documents written by the synchronizer",
        )?;
        registry.register(Box::new(sync_records_total.clone()))?;

        let sync_duration = Histogram::with_opts(
            HistogramOpts::new(
                "wallet_sync_duration_seconds",
                "Histogram of write-back cycle latency",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.0, 5.0, 10.0]),
        )?;
        registry.register(Box::new(sync_duration.clone()))?;

        let sync_pending_units = IntGauge::new(
            "wallet_sync_pending_units",
            "Dirty units left after the last cycle",
        )?;
        registry.register(Box::new(sync_pending_units.clone()))?;

        Ok(Self {
            requests_total,
            sync_cycles_total,
            sync_records_total,
            sync_duration,
            sync_pending_units,
            registry,
        })
    }

    /// Record a handled request
    pub fn record_request(&self, route: &str, outcome: &str) {
        self.requests_total.with_label_values(&[route, outcome]).inc();
    }

    /// Record a completed sync cycle
    pub fn record_sync_cycle(&self, records: usize, duration_seconds: f64, pending: usize) {
        self.sync_cycles_total.inc();
        self.sync_records_total.inc_by(records as u64);
        self.sync_duration.observe(duration_seconds);
        self.sync_pending_units.set(pending as i64);
    }

    /// Render the registry in text exposition format
    pub fn export(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}
