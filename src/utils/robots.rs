// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use metrics::counter;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::models::robots_policy::RobotsPolicy;
use crate::domain::repositories::robots_cache_repository::RobotsCacheRepository;
use crate::engines::traits::EngineError;
use crate::engines::validators;
use crate::utils::retry_policy::RetryPolicy;

/// robots.txt 获取结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RobotsBody {
    /// 获取到文件内容
    Found(String),
    /// 站点没有 robots.txt（4xx），视为无限制
    Missing,
}

/// robots.txt 获取器接口
#[async_trait]
pub trait RobotsFetcher: Send + Sync {
    /// 获取域名的 robots.txt
    ///
    /// 网络错误、服务器错误在内部重试后仍失败时返回 `Err`
    async fn fetch(&self, domain: &str) -> Result<RobotsBody, EngineError>;
}

/// 基于 reqwest 的 robots.txt 获取器
#[derive(Clone)]
pub struct HttpRobotsFetcher {
    /// HTTP客户端
    client: Client,
    /// 协议（测试时可使用 http）
    scheme: String,
    user_agent: String,
    timeout: Duration,
    /// 重试策略
    retry_policy: RetryPolicy,
    ssrf_protection: bool,
}

impl HttpRobotsFetcher {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            scheme: "https".to_string(),
            user_agent: user_agent.into(),
            timeout: Duration::from_secs(5),
            retry_policy: RetryPolicy::for_robots(),
            ssrf_protection: true,
        }
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_ssrf_protection(mut self, enabled: bool) -> Self {
        self.ssrf_protection = enabled;
        self
    }

    fn robots_url(&self, domain: &str) -> Result<Url, EngineError> {
        Url::parse(&format!("{}://{}/robots.txt", self.scheme, domain))
            .map_err(|e| EngineError::Other(format!("invalid robots url for {}: {}", domain, e)))
    }

    async fn fetch_once(&self, url: &Url) -> Result<RobotsBody, EngineError> {
        let resp = self
            .client
            .get(url.clone())
            .header("User-Agent", &self.user_agent)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            Ok(RobotsBody::Found(resp.text().await?))
        } else if status.is_client_error() {
            // 404/403 等视为没有 robots.txt
            Ok(RobotsBody::Missing)
        } else {
            Err(EngineError::HttpStatus(status.as_u16()))
        }
    }
}

#[async_trait]
impl RobotsFetcher for HttpRobotsFetcher {
    async fn fetch(&self, domain: &str) -> Result<RobotsBody, EngineError> {
        let url = self.robots_url(domain)?;
        if self.ssrf_protection {
            validators::validate_url(&url).await?;
        }

        let mut retries = 0;
        loop {
            match self.fetch_once(&url).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && self.retry_policy.should_retry(retries) => {
                    retries += 1;
                    let backoff = self.retry_policy.calculate_backoff(retries);
                    debug!(
                        "Retrying robots.txt fetch for {} in {:?}: {}",
                        domain, backoff, e
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// 策略解析器配置
#[derive(Debug, Clone)]
pub struct RobotsResolverConfig {
    /// 成功获取的策略缓存时长
    pub ttl: Duration,
    /// 获取失败后降级策略的缓存时长
    pub failure_ttl: Duration,
    /// 获取失败时是否放行
    pub fail_open: bool,
    /// 匹配规则时使用的 User-agent
    pub user_agent: String,
}

impl Default for RobotsResolverConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 3600),
            failure_ttl: Duration::from_secs(300),
            fail_open: true,
            user_agent: "promptscrape-bot".to_string(),
        }
    }
}

/// robots 策略解析器
///
/// 内存缓存 → 持久化缓存 → 网络获取。同一域名的并发解析只会触发一次获取。
pub struct RobotsResolver {
    fetcher: Arc<dyn RobotsFetcher>,
    store: Option<Arc<dyn RobotsCacheRepository>>,
    /// 内存缓存
    memory_cache: DashMap<String, Arc<RobotsPolicy>>,
    domain_locks: DashMap<String, Arc<Mutex<()>>>,
    config: RobotsResolverConfig,
}

impl RobotsResolver {
    pub fn new(fetcher: Arc<dyn RobotsFetcher>, config: RobotsResolverConfig) -> Self {
        Self {
            fetcher,
            store: None,
            memory_cache: DashMap::new(),
            domain_locks: DashMap::new(),
            config,
        }
    }

    /// 附加持久化缓存
    pub fn with_store(mut self, store: Arc<dyn RobotsCacheRepository>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn user_agent(&self) -> &str {
        &self.config.user_agent
    }

    fn cached(&self, domain: &str) -> Option<Arc<RobotsPolicy>> {
        let now = Utc::now();
        self.memory_cache
            .get(domain)
            .filter(|policy| !policy.is_expired(now))
            .map(|policy| Arc::clone(policy.value()))
    }

    /// 解析域名的爬取策略
    ///
    /// 永不失败：获取失败时按配置返回放行或拒绝的降级策略，并记录警告。
    ///
    /// # 参数
    ///
    /// * `domain` - 目标域名（不含协议）
    pub async fn resolve(&self, domain: &str) -> Arc<RobotsPolicy> {
        if let Some(policy) = self.cached(domain) {
            counter!("robots_fetch_total", "outcome" => "cache_hit").increment(1);
            return policy;
        }

        let lock = Arc::clone(
            self.domain_locks
                .entry(domain.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        let policy = {
            let _guard = lock.lock().await;
            self.resolve_locked(domain).await
        };
        drop(lock);
        // 没有其他任务持有时移除该域名的锁
        self.domain_locks
            .remove_if(domain, |_, lock| Arc::strong_count(lock) == 1);
        policy
    }

    async fn resolve_locked(&self, domain: &str) -> Arc<RobotsPolicy> {

        // 等锁期间其他任务可能已经完成获取
        if let Some(policy) = self.cached(domain) {
            counter!("robots_fetch_total", "outcome" => "cache_hit").increment(1);
            return policy;
        }

        if let Some(policy) = self.load_from_store(domain).await {
            let policy = Arc::new(policy);
            self.memory_cache
                .insert(domain.to_string(), Arc::clone(&policy));
            counter!("robots_fetch_total", "outcome" => "store_hit").increment(1);
            return policy;
        }

        let policy = Arc::new(self.fetch_policy(domain).await);
        self.memory_cache
            .insert(domain.to_string(), Arc::clone(&policy));
        policy
    }

    async fn load_from_store(&self, domain: &str) -> Option<RobotsPolicy> {
        let store = self.store.as_ref()?;
        match store.get(domain).await {
            Ok(Some(policy)) if !policy.is_expired(Utc::now()) => Some(policy),
            Ok(_) => None,
            Err(e) => {
                warn!("Failed to read robots cache for {}: {}", domain, e);
                None
            }
        }
    }

    async fn fetch_policy(&self, domain: &str) -> RobotsPolicy {
        match self.fetcher.fetch(domain).await {
            Ok(body) => {
                let policy = match body {
                    RobotsBody::Found(content) => {
                        counter!("robots_fetch_total", "outcome" => "found").increment(1);
                        RobotsPolicy::parse(domain, &content, self.config.ttl)
                    }
                    RobotsBody::Missing => {
                        counter!("robots_fetch_total", "outcome" => "missing").increment(1);
                        RobotsPolicy::allow_all(domain, self.config.ttl)
                    }
                };
                info!(
                    "Resolved robots policy for {} ({} rules)",
                    domain,
                    policy.rules.len()
                );
                if let Some(store) = &self.store {
                    if let Err(e) = store.put(&policy).await {
                        warn!("Failed to persist robots policy for {}: {}", domain, e);
                    }
                }
                policy
            }
            Err(e) => {
                counter!("robots_fetch_total", "outcome" => "error").increment(1);
                // 降级策略只保存在内存中，并使用较短的有效期
                if self.config.fail_open {
                    warn!(
                        "robots.txt for {} unavailable ({}), degrading to allow-all",
                        domain, e
                    );
                    RobotsPolicy::allow_all(domain, self.config.failure_ttl).into_degraded()
                } else {
                    warn!(
                        "robots.txt for {} unavailable ({}), denying all paths",
                        domain, e
                    );
                    RobotsPolicy::deny_all(domain, self.config.failure_ttl).into_degraded()
                }
            }
        }
    }

    /// 清除内存中的缓存条目
    pub fn invalidate(&self, domain: &str) {
        self.memory_cache.remove(domain);
    }

    /// 清除内存中已过期的策略，返回清除的条目数
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.memory_cache.len();
        self.memory_cache.retain(|_, policy| !policy.is_expired(now));
        before.saturating_sub(self.memory_cache.len())
    }

    /// 内存缓存条目数与单飞锁数
    pub fn cache_sizes(&self) -> (usize, usize) {
        (self.memory_cache.len(), self.domain_locks.len())
    }
}
