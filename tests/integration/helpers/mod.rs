// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use axum_test::TestServer;
use promptscrape::adapters::{AdapterError, AdapterRegistry, Confidence, SiteAdapter};
use promptscrape::domain::models::record::Record;
use promptscrape::domain::models::scrape_request::{ScrapeRequest, UserId};
use promptscrape::application::usecases::submit_scrape::SubmitScrapeUseCase;
use promptscrape::domain::services::prompt_interpreter::KeywordPromptInterpreter;
use promptscrape::domain::services::rate_limiter::{RateLimiter, RateLimiterConfig};
use promptscrape::engines::traits::{
    BrowserLauncher, BrowserSession, EngineError, PageContent, RawPage, StealthProfile,
};
use promptscrape::utils::errors::ScrapeError;
use promptscrape::utils::retry_policy::RetryPolicy;
use promptscrape::presentation::routes;
use promptscrape::utils::robots::{RobotsBody, RobotsFetcher, RobotsResolver, RobotsResolverConfig};
use promptscrape::workers::manager::{JobManager, JobManagerConfig};
use promptscrape::workers::orchestrator::{OrchestratorConfig, ScrapeOrchestrator};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const TEST_DOMAIN: &str = "shop.test";

/// 浏览器桩的调用计数
#[derive(Debug, Default)]
pub struct BrowserCounters {
    pub launches: AtomicU32,
    pub navigations: AtomicU32,
    pub closes: AtomicU32,
}

impl BrowserCounters {
    pub fn launches(&self) -> u32 {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> u32 {
        self.navigations.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }
}

/// 浏览器桩的行为
#[derive(Debug, Clone, Default)]
pub struct BrowserScript {
    /// 启动失败
    pub fail_launch: bool,
    /// 这些页码的导航永远挂起，直到超时
    pub hanging_pages: HashSet<u32>,
    /// 每次导航耗时
    pub navigation_delay: Duration,
    /// 页面内容附加的 HTML
    pub extra_html: String,
}

pub struct StubLauncher {
    pub counters: Arc<BrowserCounters>,
    script: BrowserScript,
}

impl StubLauncher {
    pub fn new(script: BrowserScript) -> Self {
        Self {
            counters: Arc::new(BrowserCounters::default()),
            script,
        }
    }
}

#[async_trait]
impl BrowserLauncher for StubLauncher {
    async fn launch(&self, _profile: &StealthProfile) -> Result<Box<dyn BrowserSession>, EngineError> {
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_launch {
            return Err(EngineError::Launch("no browser available".to_string()));
        }
        Ok(Box::new(StubSession {
            counters: Arc::clone(&self.counters),
            script: self.script.clone(),
        }))
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

struct StubSession {
    counters: Arc<BrowserCounters>,
    script: BrowserScript,
}

#[async_trait]
impl BrowserSession for StubSession {
    async fn navigate(&mut self, url: &Url, _scroll_passes: u32) -> Result<RawPage, EngineError> {
        self.counters.navigations.fetch_add(1, Ordering::SeqCst);
        if self.script.hanging_pages.contains(&page_number(url)) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if !self.script.navigation_delay.is_zero() {
            tokio::time::sleep(self.script.navigation_delay).await;
        }
        Ok(RawPage {
            url: url.clone(),
            status: 200,
            html: format!("<html><body>{}</body></html>", self.script.extra_html),
        })
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn page_number(url: &Url) -> u32 {
    url.query_pairs()
        .find(|(key, _)| key == "page")
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or(1)
}

/// 固定页数与每页记录数的适配器桩
pub struct StubAdapter {
    records_per_page: Vec<usize>,
    confidence: Confidence,
    fail_extraction: bool,
    panic_on_extract: bool,
}

impl StubAdapter {
    pub fn pages(records_per_page: Vec<usize>) -> Self {
        Self {
            records_per_page,
            confidence: Confidence::High,
            fail_extraction: false,
            panic_on_extract: false,
        }
    }

    pub fn heuristic(mut self) -> Self {
        self.confidence = Confidence::Heuristic;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_extraction = true;
        self
    }

    /// 解析页面时直接 panic
    pub fn panicking(mut self) -> Self {
        self.panic_on_extract = true;
        self
    }
}

impl SiteAdapter for StubAdapter {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn domains(&self) -> &[&'static str] {
        &[TEST_DOMAIN]
    }

    fn build_search_url(&self, domain: &str, entity_type: &str, page: u32) -> Result<Url, AdapterError> {
        Ok(Url::parse_with_params(
            &format!("https://{}/search", domain),
            &[("q", entity_type.to_string()), ("page", page.to_string())],
        )?)
    }

    fn extract_records(&self, page: &PageContent) -> Result<Vec<Record>, AdapterError> {
        if self.panic_on_extract {
            panic!("selector blew up on page {}", page.page);
        }
        if self.fail_extraction {
            return Err(AdapterError::MalformedPage("unexpected layout".to_string()));
        }
        let count = self
            .records_per_page
            .get(page.page as usize - 1)
            .copied()
            .unwrap_or(0);
        Ok((0..count)
            .map(|i| {
                Record::new(page.url.as_str())
                    .with_field("title", format!("item {}-{}", page.page, i))
                    .with_field("price", format!("{}.99", i))
                    .with_field("sku", format!("SKU{}", i))
            })
            .collect())
    }

    fn has_next_page(&self, page: &PageContent) -> bool {
        (page.page as usize) < self.records_per_page.len()
    }

    fn confidence(&self) -> Confidence {
        self.confidence
    }
}

/// 固定内容、计数调用次数的 robots.txt 获取器桩
pub struct StubRobotsFetcher {
    body: Option<String>,
    pub calls: AtomicU32,
}

impl StubRobotsFetcher {
    pub fn with_body(body: &str) -> Self {
        Self {
            body: Some(body.to_string()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            body: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RobotsFetcher for StubRobotsFetcher {
    async fn fetch(&self, _domain: &str) -> Result<RobotsBody, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.body {
            Some(body) => Ok(RobotsBody::Found(body.clone())),
            None => Err(EngineError::Other("connection refused".to_string())),
        }
    }
}

/// 编排器测试夹具
pub struct Harness {
    pub orchestrator: Arc<ScrapeOrchestrator>,
    pub rate_limiter: Arc<RateLimiter>,
    pub robots_fetcher: Arc<StubRobotsFetcher>,
    pub browser: Arc<BrowserCounters>,
}

pub struct HarnessBuilder {
    adapter: StubAdapter,
    robots: StubRobotsFetcher,
    fail_open: bool,
    browser: BrowserScript,
    limiter: RateLimiterConfig,
    orchestrator: OrchestratorConfig,
}

impl HarnessBuilder {
    pub fn new(adapter: StubAdapter) -> Self {
        Self {
            adapter,
            robots: StubRobotsFetcher::with_body("User-agent: *\nAllow: /\n"),
            fail_open: true,
            browser: BrowserScript::default(),
            limiter: RateLimiterConfig::default(),
            orchestrator: OrchestratorConfig {
                max_item_limit: 500,
                max_pages_per_job: 50,
                per_fetch_timeout: Duration::from_secs(5),
                retry_policy: RetryPolicy::for_page_fetch(2, Duration::from_millis(100))
                    .without_jitter(),
            },
        }
    }

    pub fn robots(mut self, fetcher: StubRobotsFetcher) -> Self {
        self.robots = fetcher;
        self
    }

    pub fn fail_closed(mut self) -> Self {
        self.fail_open = false;
        self
    }

    pub fn browser(mut self, script: BrowserScript) -> Self {
        self.browser = script;
        self
    }

    pub fn limiter(mut self, config: RateLimiterConfig) -> Self {
        self.limiter = config;
        self
    }

    pub fn max_pages(mut self, max_pages: u32) -> Self {
        self.orchestrator.max_pages_per_job = max_pages;
        self
    }

    pub fn build(self) -> Harness {
        let robots_fetcher = Arc::new(self.robots);
        let resolver = RobotsResolver::new(
            robots_fetcher.clone(),
            RobotsResolverConfig {
                fail_open: self.fail_open,
                ..Default::default()
            },
        );
        let registry = AdapterRegistry::new()
            .with_fallback(None)
            .register(Arc::new(self.adapter));
        let launcher = StubLauncher::new(self.browser);
        let browser = Arc::clone(&launcher.counters);
        let rate_limiter = Arc::new(RateLimiter::new(self.limiter));

        let orchestrator = Arc::new(ScrapeOrchestrator::new(
            Arc::clone(&rate_limiter),
            Arc::new(resolver),
            Arc::new(registry),
            Arc::new(launcher),
            self.orchestrator,
        ));
        Harness {
            orchestrator,
            rate_limiter,
            robots_fetcher,
            browser,
        }
    }
}

pub fn request(item_limit: u32) -> ScrapeRequest {
    ScrapeRequest::new(
        TEST_DOMAIN,
        "books",
        ["title", "price", "rating"],
        item_limit,
        UserId::new("alice"),
    )
}

pub fn reason_kind(reason: &Option<ScrapeError>) -> Option<&'static str> {
    reason.as_ref().map(ScrapeError::kind)
}

/// 完整 HTTP 应用的测试夹具
pub struct TestApp {
    pub server: TestServer,
    pub manager: Arc<JobManager>,
    pub browser: Arc<BrowserCounters>,
}

pub fn spawn_app(harness: Harness, config: JobManagerConfig) -> TestApp {
    let manager = JobManager::new(Arc::clone(&harness.orchestrator), config);
    let use_case = Arc::new(SubmitScrapeUseCase::new(
        Arc::clone(&manager),
        Arc::new(KeywordPromptInterpreter::new()),
    ));
    let app = routes::routes(use_case, None);
    let server = TestServer::new(app).unwrap();

    TestApp {
        server,
        manager,
        browser: harness.browser,
    }
}
