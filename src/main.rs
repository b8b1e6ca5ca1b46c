// Copyright 2025 Kirky.X
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

use promptscrape::adapters::AdapterRegistry;
use promptscrape::application::usecases::submit_scrape::SubmitScrapeUseCase;
use promptscrape::config::settings::Settings;
use promptscrape::domain::repositories::robots_cache_repository::RobotsCacheRepository;
use promptscrape::domain::services::prompt_interpreter::KeywordPromptInterpreter;
use promptscrape::domain::services::rate_limiter::RateLimiter;
use promptscrape::engines::chromium_engine::ChromiumLauncher;
use promptscrape::infrastructure::repositories::audit_log_repo_impl::JsonLinesAuditRepository;
use promptscrape::infrastructure::repositories::robots_cache_repo_impl::JsonFileRobotsCache;
use promptscrape::presentation::routes;
use promptscrape::utils::robots::{HttpRobotsFetcher, RobotsResolver};
use promptscrape::workers::manager::JobManager;
use promptscrape::workers::orchestrator::ScrapeOrchestrator;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use promptscrape::utils::telemetry;

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并启动服务
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting promptscrape...");

    // Initialize Prometheus Metrics
    let metrics_handle = match promptscrape::infrastructure::metrics::init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Failed to install Prometheus recorder: {}", e);
            None
        }
    };

    // 2. Load configuration
    let settings = Arc::new(Settings::new()?);
    info!("Configuration loaded");

    // 3. Persistent state
    tokio::fs::create_dir_all(&settings.storage.data_dir).await?;
    let audit_repo = Arc::new(JsonLinesAuditRepository::new(settings.audit_log_path()));
    let robots_cache = Arc::new(JsonFileRobotsCache::new(settings.robots_cache_path()));
    match robots_cache.purge_expired().await {
        Ok(purged) if purged > 0 => info!("Purged {} expired robots.txt entries", purged),
        Ok(_) => {}
        Err(e) => warn!("Failed to purge robots.txt cache: {}", e),
    }

    // 4. Rate limiter, re-hydrated from the audit log
    let rate_limiter =
        Arc::new(RateLimiter::new(settings.rate_limiter_config()).with_audit(audit_repo));
    match rate_limiter.rehydrate_from_audit().await {
        Ok(count) => info!("Rate limiter re-hydrated from {} audit entries", count),
        Err(e) => error!("Failed to re-hydrate rate limiter: {}", e),
    }
    match rate_limiter.prune_audit(settings.audit_retention()).await {
        Ok(pruned) => info!("Pruned {} audit entries past retention", pruned),
        Err(e) => warn!("Failed to prune audit log: {}", e),
    }

    // 5. Robots resolver, adapters and browser
    let robots_config = settings.robots_config();
    let fetcher = HttpRobotsFetcher::new(robots_config.user_agent.clone())
        .with_ssrf_protection(settings.browser.ssrf_protection);
    let robots = Arc::new(
        RobotsResolver::new(Arc::new(fetcher), robots_config).with_store(robots_cache),
    );
    let adapters = Arc::new(AdapterRegistry::with_defaults());
    let launcher = Arc::new(ChromiumLauncher::new(settings.chromium_config()));

    // 6. Orchestrator and job manager
    let orchestrator = Arc::new(ScrapeOrchestrator::new(
        rate_limiter,
        Arc::clone(&robots),
        adapters,
        launcher,
        settings.orchestrator_config(),
    ));
    let shutdown = CancellationToken::new();
    let manager =
        JobManager::with_shutdown_token(orchestrator, settings.manager_config(), shutdown.clone());
    manager.spawn_result_janitor(Duration::from_secs(60));
    spawn_robots_janitor(robots, Duration::from_secs(600), shutdown.clone());

    let use_case = Arc::new(SubmitScrapeUseCase::new(
        Arc::clone(&manager),
        Arc::new(KeywordPromptInterpreter::new()),
    ));

    // 7. Start HTTP server
    let app = routes::routes(use_case, metrics_handle);
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    manager.shutdown().await;
    info!("promptscrape stopped");
    Ok(())
}

/// 等待关闭信号
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }
}

/// 周期性清理内存中过期的 robots 策略
fn spawn_robots_janitor(
    robots: Arc<RobotsResolver>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let purged = robots.purge_expired();
                    if purged > 0 {
                        debug!("Purged {} expired robots policies", purged);
                    }
                }
            }
        }
    });
}
