// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

/// 安装 Prometheus 导出器
///
/// 地址无效或端口被占用时只记录警告，不影响主流程
pub fn init_metrics(listen_addr: &str) {
    let addr: SocketAddr = match listen_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("Invalid metrics address {}: {}", listen_addr, e);
            return;
        }
    };

    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        warn!(
            "Failed to install Prometheus recorder: {}. This might happen if the port is already in use.",
            e
        );
        return;
    }

    describe_metrics();
    info!("Metrics exporter listening on {}", addr);
}

fn describe_metrics() {
    describe_counter!("adpulse_jobs_total", "Finished scrape jobs by outcome");
    describe_counter!("adpulse_fetch_total", "Outbound page fetches by outcome");
    describe_counter!("adpulse_blocking_events_total", "Blocking events by kind");
    describe_counter!("adpulse_circuit_opens_total", "Times the circuit was opened");
    describe_counter!("adpulse_cache_hits_total", "Result cache hits");
    describe_counter!("adpulse_cache_misses_total", "Result cache misses");
    describe_counter!(
        "adpulse_tier2_invocations_total",
        "Model-assisted extraction calls"
    );
    describe_gauge!(
        "adpulse_circuit_open",
        "1 when open, 0.5 when half-open, 0 when closed"
    );
    describe_gauge!("adpulse_blocking_severity", "Rolling blocking severity (0-4)");
    describe_histogram!(
        "adpulse_batch_duration_seconds",
        "Wall time spent processing one batch"
    );
}
