//! Ambient Prometheus metrics surface (SPEC_FULL.md "Ambient stack /
//! Metrics"). Grounded directly on the teacher's
//! `shared/src/akri/metrics.rs` + `agent/src/util/metrics.rs`: a `warp`
//! route serving the default registry's `/metrics`, plus one
//! controller-specific gauge vector registered through `lazy_static!`.
//!
//! This is observability, not the autoscaling-decision logic spec.md places
//! out of scope (§1) — the gauge only reports what the store already knows.

use std::collections::HashMap;
use std::sync::Arc;

use log::info;
use prometheus::{Encoder, IntGaugeVec};
use warp::{Filter, Rejection, Reply};

use crate::util::controller_ctx::ControllerContext;
use crate::util::store::GroupStatus;

const METRICS_PORT_ENV: &str = "METRICS_PORT";

lazy_static::lazy_static! {
    /// Number of infer groups tracked by the store, labeled by
    /// `(model_serving, status)`. Mirrors the teacher's
    /// `BROKER_POD_COUNT_METRIC` shape (`IntGaugeVec` via
    /// `prometheus::register_int_gauge_vec!`).
    pub static ref INFER_GROUP_COUNT_METRIC: IntGaugeVec = prometheus::register_int_gauge_vec!(
        "modelserving_infer_group_count",
        "Number of infer groups tracked by the controller's store, by status",
        &["model_serving", "status"]
    )
    .unwrap();
}

fn status_label(status: GroupStatus) -> &'static str {
    match status {
        GroupStatus::Creating => "Creating",
        GroupStatus::Running => "Running",
        GroupStatus::Deleting => "Deleting",
        GroupStatus::Scaling => "Scaling",
        GroupStatus::NotFound => "NotFound",
    }
}

/// Recomputes `INFER_GROUP_COUNT_METRIC` from the store's current view of
/// `key`. Called after every reconcile so the gauge never lags more than one
/// sync behind the store it reports on.
pub async fn refresh_group_count(ctx: &Arc<ControllerContext>, ms_name: &str, key: &str) {
    let groups = ctx.store.groups(&key.to_string()).await;
    let mut counts: HashMap<&'static str, i64> = HashMap::new();
    for group in groups.values() {
        *counts.entry(status_label(group.status)).or_insert(0) += 1;
    }
    for status in [
        GroupStatus::Creating,
        GroupStatus::Running,
        GroupStatus::Deleting,
        GroupStatus::Scaling,
        GroupStatus::NotFound,
    ] {
        let label = status_label(status);
        INFER_GROUP_COUNT_METRIC
            .with_label_values(&[ms_name, label])
            .set(*counts.get(label).unwrap_or(&0));
    }
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .expect("couldn't encode prometheus metrics");
    let body = String::from_utf8(buffer).expect("prometheus metrics could not be converted to String");
    Ok(body)
}

/// Serves prometheus metrics over `/metrics`, matching the teacher's
/// `run_metrics_server` port-selection behavior (`METRICS_PORT`, default
/// 8080).
pub async fn run_metrics_server() -> anyhow::Result<()> {
    let port = match std::env::var(METRICS_PORT_ENV) {
        Ok(p) => p.parse::<u16>()?,
        Err(_) => 8080,
    };
    info!("starting metrics server on port {port} at /metrics");
    let metrics_route = warp::path!("metrics").and_then(metrics_handler);
    warp::serve(metrics_route).run(([0, 0, 0, 0], port)).await;
    Ok(())
}
