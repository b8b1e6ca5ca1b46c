// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// 安装 Prometheus 记录器并注册指标说明
///
/// 返回的句柄用于在 `GET /metrics` 渲染文本格式。
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    info!("Prometheus recorder installed");
    Ok(handle)
}

fn describe_metrics() {
    describe_counter!(
        "scrape_jobs_total",
        "Total number of scrape jobs by terminal state"
    );
    describe_counter!(
        "scrape_pages_fetched_total",
        "Total number of pages fetched successfully"
    );
    describe_counter!(
        "scrape_page_retries_total",
        "Total number of page fetch retries"
    );
    describe_counter!(
        "rate_limit_denied_total",
        "Total number of rate limit denials by scope"
    );
    describe_counter!(
        "robots_fetch_total",
        "Total number of robots.txt fetches by outcome"
    );
    describe_histogram!(
        "scrape_job_duration_seconds",
        "Duration of scrape jobs in seconds"
    );
}
