// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::adapters::registry::{AdapterRegistry, AdapterSelection};
use crate::domain::models::job::{JobMetadata, JobResult, JobState, ScrapeJob};
use crate::domain::models::record::Record;
use crate::domain::models::robots_policy::RobotsPolicy;
use crate::domain::models::scrape_request::{ScrapeRequest, UserTier};
use crate::domain::services::rate_limiter::RateLimiter;
use crate::engines::fetch_session::{FetchError, FetchSettings, StealthFetchSession};
use crate::engines::stealth::{detect_captcha, random_profile};
use crate::engines::traits::{BrowserLauncher, PageContent};
use crate::utils::errors::ScrapeError;
use crate::utils::retry_policy::RetryPolicy;
use crate::utils::robots::RobotsResolver;

/// 编排器配置
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// 单个请求允许的最大记录数
    pub max_item_limit: u32,
    /// 单个任务最多翻页数
    pub max_pages_per_job: u32,
    /// 单次页面抓取超时
    pub per_fetch_timeout: Duration,
    /// 页面抓取重试策略
    pub retry_policy: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_item_limit: 500,
            max_pages_per_job: 50,
            per_fetch_timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy::for_page_fetch(2, Duration::from_millis(500)),
        }
    }
}

/// 单个任务执行期间的可变状态，只属于该任务
struct JobRun {
    job: ScrapeJob,
    records: Vec<Record>,
    warnings: Vec<String>,
    metadata: JobMetadata,
}

impl JobRun {
    fn new(job_id: Uuid, request: ScrapeRequest) -> Self {
        let metadata = JobMetadata {
            item_limit: request.item_limit,
            domain: request.domain.clone(),
            ..Default::default()
        };
        Self {
            job: ScrapeJob::with_id(job_id, request),
            records: Vec::new(),
            warnings: Vec::new(),
            metadata,
        }
    }

    fn advance(&mut self, next: JobState) {
        let from = self.job.state;
        match self.job.transition(next) {
            Ok(()) => debug!("Job {} transitioned {} -> {}", self.job.id, from, next),
            Err(e) => error!("Job {}: {}", self.job.id, e),
        }
    }

    fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.warnings.push(message);
    }

    fn finish(mut self, state: JobState, reason: Option<ScrapeError>) -> JobResult {
        self.advance(state);

        let message = match &reason {
            Some(reason) => reason.to_string(),
            None => format!(
                "Collected {} records from {} pages",
                self.job.items_collected, self.job.pages_fetched
            ),
        };
        let mut metadata = self.metadata;
        metadata.pages_fetched = self.job.pages_fetched;
        metadata.items_collected = self.job.items_collected;
        metadata.started_at = Some(self.job.started_at);
        metadata.finished_at = Some(self.job.finished_at.unwrap_or_else(Utc::now));

        JobResult {
            job_id: self.job.id,
            state,
            reason,
            message: Some(message),
            records: self.records,
            warnings: self.warnings,
            metadata,
        }
    }
}

/// 翻页循环的结束方式
enum PaginationEnd {
    /// 正常结束或降级为部分结果
    Completed,
    /// 致命错误或取消
    Failed(ScrapeError),
}

/// 抓取任务编排器
///
/// 驱动单个任务走完状态机：
/// 限流判定 → robots.txt 检查 → 打开会话 → 翻页提取。
/// 任何终止路径都会释放已打开的浏览器会话。
pub struct ScrapeOrchestrator {
    rate_limiter: Arc<RateLimiter>,
    robots: Arc<RobotsResolver>,
    adapters: Arc<AdapterRegistry>,
    launcher: Arc<dyn BrowserLauncher>,
    config: OrchestratorConfig,
}

impl ScrapeOrchestrator {
    pub fn new(
        rate_limiter: Arc<RateLimiter>,
        robots: Arc<RobotsResolver>,
        adapters: Arc<AdapterRegistry>,
        launcher: Arc<dyn BrowserLauncher>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            rate_limiter,
            robots,
            adapters,
            launcher,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// 执行一个抓取任务直到终止状态
    ///
    /// # 参数
    ///
    /// * `job_id` - 任务 ID
    /// * `request` - 结构化抓取请求
    /// * `tier` - 请求者等级，影响限流参数
    /// * `cancel` - 取消令牌，在下一个挂起点生效
    ///
    /// # 返回值
    ///
    /// 终止状态的任务结果；失败原因包含在结果中而不是作为错误返回
    #[instrument(
        skip(self, request, cancel),
        fields(job_id = %job_id, user = %request.requester, domain = %request.domain)
    )]
    pub async fn run(
        &self,
        job_id: Uuid,
        request: ScrapeRequest,
        tier: UserTier,
        cancel: CancellationToken,
    ) -> JobResult {
        let started = Instant::now();
        let result = self.execute(job_id, request, tier, &cancel).await;

        counter!("scrape_jobs_total", "state" => result.state.to_string()).increment(1);
        histogram!("scrape_job_duration_seconds").record(started.elapsed().as_secs_f64());
        info!(
            "Job finished in state {} with {} records ({} warnings)",
            result.state,
            result.records.len(),
            result.warnings.len()
        );
        result
    }

    async fn execute(
        &self,
        job_id: Uuid,
        request: ScrapeRequest,
        tier: UserTier,
        cancel: &CancellationToken,
    ) -> JobResult {
        if let Err(reason) = request.validate(self.config.max_item_limit) {
            info!("Rejected malformed request: {}", reason);
            return JobResult::rejected_before_start(job_id, &request, reason);
        }
        if cancel.is_cancelled() {
            return JobResult::cancelled_before_start(job_id, &request);
        }

        let mut run = JobRun::new(job_id, request);
        let domain = run.job.request.domain.clone();

        let selection = match self.adapters.adapter_for(&domain) {
            Ok(selection) => selection,
            Err(reason) => return run.finish(JobState::Rejected, Some(reason)),
        };
        run.metadata.adapter = Some(selection.adapter.name().to_string());
        run.metadata.heuristic = selection.heuristic;
        if selection.heuristic {
            run.warn(format!(
                "No dedicated adapter for {}, using heuristic extraction with lower confidence",
                domain
            ));
        }

        // Admitted
        let admission = self
            .rate_limiter
            .admit_request(&run.job.request.requester, tier, &domain, 1)
            .await;
        if let Some(reason) = admission.into_error() {
            info!("Rate limit denied job: {}", reason);
            return run.finish(JobState::Rejected, Some(reason));
        }

        // Checking
        run.advance(JobState::Checking);
        let policy = self.robots.resolve(&domain).await;
        run.metadata.robots_degraded = policy.degraded;
        if policy.degraded {
            run.warn(format!(
                "robots.txt for {} could not be read, using the degraded fallback policy",
                domain
            ));
        }

        let first_url = match selection
            .adapter
            .build_search_url(&domain, &run.job.request.entity_type, 1)
        {
            Ok(url) => url,
            Err(e) => {
                let reason = ScrapeError::invalid(format!("cannot build search URL: {}", e));
                return run.finish(JobState::Rejected, Some(reason));
            }
        };
        let path = robots_path(&first_url);
        if !policy.is_allowed(self.robots.user_agent(), &path) {
            info!("robots.txt disallows {} on {}", path, domain);
            let reason = ScrapeError::RobotsDisallowed { domain, path };
            return run.finish(JobState::Rejected, Some(reason));
        }

        // Fetching
        run.advance(JobState::Fetching);
        if cancel.is_cancelled() {
            return run.finish(JobState::Failed, Some(ScrapeError::Cancelled));
        }
        let crawl_delay = policy.crawl_delay(self.robots.user_agent());
        run.metadata.crawl_delay_ms = crawl_delay.as_millis() as u64;

        let settings = FetchSettings {
            per_fetch_timeout: self.config.per_fetch_timeout,
            retry_policy: self.config.retry_policy.clone(),
            crawl_delay,
        };
        let mut session =
            match StealthFetchSession::open(self.launcher.as_ref(), random_profile(), settings).await {
                Ok(session) => session,
                Err(e) => {
                    error!("Failed to open fetch session: {}", e);
                    let reason = ScrapeError::FetchUnavailable {
                        reason: e.to_string(),
                    };
                    return run.finish(JobState::Failed, Some(reason));
                }
            };

        let end = self
            .paginate(&mut run, &mut session, &selection, &policy, first_url, cancel)
            .await;
        session.close().await;

        match end {
            PaginationEnd::Completed => run.finish(JobState::Completed, None),
            PaginationEnd::Failed(reason) => run.finish(JobState::Failed, Some(reason)),
        }
    }

    /// 翻页循环
    ///
    /// 每页：抓取 → 提取 → 按请求字段投影 → 截断到剩余配额。
    /// 达到记录上限、没有下一页、空页、页数上限或下一页被 robots.txt 禁止时停止。
    async fn paginate(
        &self,
        run: &mut JobRun,
        session: &mut StealthFetchSession,
        selection: &AdapterSelection,
        policy: &RobotsPolicy,
        first_url: Url,
        cancel: &CancellationToken,
    ) -> PaginationEnd {
        let adapter = &selection.adapter;
        let domain = run.job.request.domain.clone();
        let entity_type = run.job.request.entity_type.clone();
        let mut page: u32 = 1;
        let mut url = first_url;

        loop {
            let raw = match session.fetch(&url, adapter.scroll_passes(), cancel).await {
                Ok(raw) => raw,
                Err(FetchError::Cancelled) => {
                    info!("Job cancelled while waiting on page {}", page);
                    return PaginationEnd::Failed(ScrapeError::Cancelled);
                }
                Err(FetchError::Exhausted { attempts, source }) => {
                    let failure = ScrapeError::PageFetchFailed {
                        page,
                        attempts,
                        reason: source.to_string(),
                    };
                    run.warn(format!("{}; returning partial results", failure));
                    return PaginationEnd::Completed;
                }
            };
            run.job.pages_fetched += 1;
            if page == 1 {
                run.advance(JobState::Paginating);
            }
            if cancel.is_cancelled() {
                info!("Job cancelled after fetching page {}", page);
                return PaginationEnd::Failed(ScrapeError::Cancelled);
            }

            if detect_captcha(&raw.html) {
                run.warn(format!("Page {} appears to show a captcha challenge", page));
            }
            let content = PageContent {
                page,
                url: raw.url,
                html: raw.html,
            };

            let extracted = match adapter.extract_records(&content) {
                Ok(records) => records,
                Err(e) => {
                    error!("Adapter {} failed on page {}: {}", adapter.name(), page, e);
                    return PaginationEnd::Failed(ScrapeError::AdapterFault {
                        reason: e.to_string(),
                    });
                }
            };
            if extracted.is_empty() {
                if page == 1 && selection.heuristic {
                    return PaginationEnd::Failed(ScrapeError::Unsupported { domain });
                }
                info!("Page {} yielded no records, stopping", page);
                return PaginationEnd::Completed;
            }

            let remaining = run.job.remaining_items() as usize;
            let fields = &run.job.request.fields;
            let before = run.records.len();
            run.records.extend(
                extracted
                    .into_iter()
                    .take(remaining)
                    .map(|record| record.project(fields)),
            );
            let added = (run.records.len() - before) as u32;
            run.job.items_collected += added;
            debug!(
                "Page {} added {} records ({}/{})",
                page, added, run.job.items_collected, run.job.request.item_limit
            );

            if run.job.remaining_items() == 0 {
                return PaginationEnd::Completed;
            }
            if !adapter.has_next_page(&content) {
                return PaginationEnd::Completed;
            }
            if page >= self.config.max_pages_per_job {
                run.warn(format!(
                    "Stopped after {} pages, the per-job page limit",
                    page
                ));
                return PaginationEnd::Completed;
            }

            page += 1;
            url = match adapter.build_search_url(&domain, &entity_type, page) {
                Ok(url) => url,
                Err(e) => {
                    return PaginationEnd::Failed(ScrapeError::AdapterFault {
                        reason: e.to_string(),
                    })
                }
            };
            let path = robots_path(&url);
            if !policy.is_allowed(self.robots.user_agent(), &path) {
                let blocked = ScrapeError::RobotsDisallowed {
                    domain: domain.clone(),
                    path,
                };
                run.warn(format!("{}; pagination stopped", blocked));
                return PaginationEnd::Completed;
            }
        }
    }
}

/// robots.txt 匹配使用的路径（含查询串）
fn robots_path(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}
