// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::application::usecases::submit_scrape::SubmitScrapeUseCase;
use crate::presentation::handlers::{metrics_handler, scrape_handler};

/// 创建应用路由
///
/// # 参数
///
/// * `use_case` - 提交抓取任务的用例，同时提供任务管理器
/// * `metrics` - Prometheus 句柄，`None` 时不挂载 `/metrics`
///
/// # 返回值
///
/// 返回配置好的路由
pub fn routes(use_case: Arc<SubmitScrapeUseCase>, metrics: Option<PrometheusHandle>) -> Router {
    let manager = Arc::clone(use_case.manager());

    let mut public_routes = Router::new().route("/health", get(health_check));
    if let Some(handle) = metrics {
        public_routes = public_routes
            .route("/metrics", get(metrics_handler::metrics))
            .layer(Extension(handle));
    }

    let scrape_routes = Router::new()
        .route("/v1/scrape", post(scrape_handler::create_scrape))
        .route(
            "/v1/scrape/{id}",
            get(scrape_handler::get_scrape_status).delete(scrape_handler::cancel_scrape),
        )
        .layer(Extension(use_case))
        .layer(Extension(manager));

    Router::new()
        .merge(public_routes)
        .merge(scrape_routes)
        .layer(TraceLayer::new_for_http())
}

/// 健康检查端点
///
/// # 返回值
///
/// 返回"OK"字符串
pub async fn health_check() -> &'static str {
    "OK"
}
