//! # Config Sync Metrics
//!
//! Metrics for the periodic Image Assurance configuration sync.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{IntCounter, IntCounterVec};
use std::sync::LazyLock;

static CONFIG_SYNCS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "image_assurance_config_syncs_total",
        "Total number of configuration sync attempts",
    )
    .expect("Failed to create CONFIG_SYNCS_TOTAL metric - this should never happen")
});

static CONFIG_SYNC_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "image_assurance_config_sync_errors_total",
            "Total number of failed configuration syncs by failing step",
        ),
        &["step"],
    )
    .expect("Failed to create CONFIG_SYNC_ERRORS_TOTAL metric - this should never happen")
});

pub(crate) fn register_sync_metrics() -> Result<()> {
    REGISTRY.register(Box::new(CONFIG_SYNCS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CONFIG_SYNC_ERRORS_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_config_syncs() {
    CONFIG_SYNCS_TOTAL.inc();
}

pub fn increment_config_sync_errors(step: &str) {
    CONFIG_SYNC_ERRORS_TOTAL.with_label_values(&[step]).inc();
}
