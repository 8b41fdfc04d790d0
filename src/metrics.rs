// Copyright 2025 PingCAP, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Prometheus metrics for the controller and the HTTP endpoint that exposes them.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const METRICS_NAMESPACE: &str = "yulong_controller";

pub struct Metrics {
    registry: Registry,
    active_workers: IntGaugeVec,
    reconcile_duration: HistogramVec,
    reconcile_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let active_workers = IntGaugeVec::new(
            Opts::new(
                format!("{METRICS_NAMESPACE}_active_workers"),
                "Number of workers currently handling a key",
            ),
            &["controller"],
        )?;
        registry.register(Box::new(active_workers.clone()))?;

        let reconcile_duration = HistogramVec::new(
            HistogramOpts::new(
                format!("{METRICS_NAMESPACE}_reconcile_duration_seconds"),
                "Time spent syncing a single key",
            )
            .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
            &["controller"],
        )?;
        registry.register(Box::new(reconcile_duration.clone()))?;

        let reconcile_total = IntCounterVec::new(
            Opts::new(
                format!("{METRICS_NAMESPACE}_reconcile_total"),
                "Number of syncs by outcome",
            ),
            &["controller", "result"],
        )?;
        registry.register(Box::new(reconcile_total.clone()))?;

        Ok(Self {
            registry,
            active_workers,
            reconcile_duration,
            reconcile_total,
        })
    }

    /// Counts a worker as active until the returned guard is dropped.
    pub fn active_worker(&self, controller: &str) -> ActiveWorker {
        let gauge = self.active_workers.with_label_values(&[controller]);
        gauge.inc();
        ActiveWorker { gauge }
    }

    pub fn observe_reconcile(&self, controller: &str, elapsed: Duration, result: &str) {
        self.reconcile_duration
            .with_label_values(&[controller])
            .observe(elapsed.as_secs_f64());
        self.reconcile_total
            .with_label_values(&[controller, result])
            .inc();
    }

    /// Encodes every registered metric in the Prometheus text format.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
    }
}

pub struct ActiveWorker {
    gauge: prometheus::IntGauge,
}

impl Drop for ActiveWorker {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

pub fn router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(health_check))
        .with_state(metrics)
}

/// Serves `/metrics` and `/healthz` until `shutdown` is cancelled.
pub async fn serve(
    addr: SocketAddr,
    metrics: Arc<Metrics>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("serving metrics on {}", listener.local_addr()?);

    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    match metrics.gather() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
