// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::counter;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::models::rate_window::{RateScope, RateWindow, SubjectKey};
use crate::domain::models::scrape_request::{UserId, UserTier};
use crate::domain::repositories::rate_audit_repository::{AuditEntry, RateAuditRepository};
use crate::utils::errors::{RepositoryError, ScrapeError};

/// 限流器配置
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// 每个 (用户, 域名) 窗口内允许的请求数
    pub per_domain_limit: u32,
    /// 每个用户全局窗口内允许的请求数
    pub global_limit: u32,
    /// 管理员的全局限额
    pub admin_global_limit: u32,
    /// 窗口长度
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            per_domain_limit: 5,
            global_limit: 20,
            admin_global_limit: 1000,
            window: Duration::from_secs(24 * 3600),
        }
    }
}

/// 准入判定结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Denied {
        /// 触发拒绝的作用域（`domain` 或 `global`）
        scope: &'static str,
        retry_after: Duration,
    },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }

    /// 转换为任务拒绝原因
    pub fn into_error(self) -> Option<ScrapeError> {
        match self {
            Admission::Admitted => None,
            Admission::Denied { scope, retry_after } => {
                Some(ScrapeError::rate_limited(scope, retry_after))
            }
        }
    }
}

/// 固定窗口限流器
///
/// 每个主体键拥有独立的互斥锁，对同一键的判定严格串行。
/// 一次请求同时检查全局键与域名键时，总是先锁全局键再锁域名键，
/// 两者都有余量才一起扣减。
pub struct RateLimiter {
    config: RateLimiterConfig,
    windows: DashMap<SubjectKey, Arc<Mutex<RateWindow>>>,
    audit: Option<Arc<dyn RateAuditRepository>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
            audit: None,
        }
    }

    /// 附加审计日志仓库
    pub fn with_audit(mut self, audit: Arc<dyn RateAuditRepository>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    fn limit_for(&self, key: &SubjectKey, tier: UserTier) -> u32 {
        match (&key.scope, tier) {
            (RateScope::Domain(_), _) => self.config.per_domain_limit,
            (RateScope::Global, UserTier::Admin) => self.config.admin_global_limit,
            (RateScope::Global, UserTier::Standard) => self.config.global_limit,
        }
    }

    fn window_handle(&self, key: &SubjectKey, limit: u32, now: DateTime<Utc>) -> Arc<Mutex<RateWindow>> {
        let entry = self.windows.entry(key.clone()).or_insert_with(|| {
            Arc::new(Mutex::new(RateWindow::new(
                key.clone(),
                limit,
                self.config.window,
                now,
            )))
        });
        Arc::clone(entry.value())
    }

    /// 对单个主体键做准入判定
    ///
    /// # 参数
    ///
    /// * `key` - 主体键
    /// * `cost` - 本次消耗
    pub async fn admit(&self, key: &SubjectKey, cost: u32) -> Admission {
        let limit = self.limit_for(key, UserTier::Standard);
        self.admit_all(&[(key.clone(), limit)], cost).await
    }

    /// 对一次抓取请求做准入判定
    ///
    /// 标准用户需同时通过域名键与全局键；管理员跳过域名键。
    pub async fn admit_request(
        &self,
        user: &UserId,
        tier: UserTier,
        domain: &str,
        cost: u32,
    ) -> Admission {
        let global = SubjectKey::global(user);
        let mut checks = vec![(global.clone(), self.limit_for(&global, tier))];
        if tier != UserTier::Admin {
            let per_domain = SubjectKey::domain(user, domain);
            let limit = self.limit_for(&per_domain, tier);
            checks.push((per_domain, limit));
        }
        self.admit_all(&checks, cost).await
    }

    async fn admit_all(&self, checks: &[(SubjectKey, u32)], cost: u32) -> Admission {
        let now = Utc::now();
        let decision = self.decide(checks, cost, now);

        match &decision {
            Admission::Admitted => {
                debug!(
                    "Admitted {} (cost {})",
                    checks
                        .iter()
                        .map(|(key, _)| key.to_string())
                        .collect::<Vec<_>>()
                        .join(", "),
                    cost
                );
                let entries: Vec<AuditEntry> = checks
                    .iter()
                    .map(|(key, _)| AuditEntry::new(key.clone(), now, cost))
                    .collect();
                self.record_audit(&entries).await;
            }
            Admission::Denied { scope, retry_after } => {
                counter!("rate_limit_denied_total", "scope" => *scope).increment(1);
                debug!(
                    "Denied {} scope, retry after {:?}",
                    scope, retry_after
                );
            }
        }
        decision
    }

    fn decide(&self, checks: &[(SubjectKey, u32)], cost: u32, now: DateTime<Utc>) -> Admission {
        // 全局键排在前面，保证所有调用方加锁顺序一致
        let mut ordered: Vec<&(SubjectKey, u32)> = checks.iter().collect();
        ordered.sort_by_key(|(key, _)| !matches!(key.scope, RateScope::Global));

        let handles: Vec<Arc<Mutex<RateWindow>>> = ordered
            .iter()
            .map(|(key, limit)| self.window_handle(key, *limit, now))
            .collect();
        let mut guards: Vec<_> = handles.iter().map(|handle| handle.lock()).collect();

        let mut denied: Option<(&'static str, Duration)> = None;
        for (guard, (key, limit)) in guards.iter_mut().zip(ordered.iter()) {
            guard.limit = *limit;
            guard.roll(now);
            if !guard.has_capacity(cost) {
                let retry_after = guard.retry_after(now);
                denied = match denied {
                    Some((scope, current)) if current >= retry_after => Some((scope, current)),
                    _ => Some((key.scope_label(), retry_after)),
                };
            }
        }

        if let Some((scope, retry_after)) = denied {
            return Admission::Denied { scope, retry_after };
        }
        for guard in guards.iter_mut() {
            guard.consume(cost);
        }
        Admission::Admitted
    }

    async fn record_audit(&self, entries: &[AuditEntry]) {
        if let Some(audit) = &self.audit {
            // 审计日志只做尽力写入，判定以内存计数为准
            if let Err(e) = audit.append(entries).await {
                warn!("Failed to append rate audit entries: {}", e);
            }
        }
    }

    /// 用审计日志条目重建内存窗口
    ///
    /// 按时间顺序重放固定窗口算法；返回重放的条目数。
    pub fn rehydrate(&self, mut entries: Vec<AuditEntry>) -> usize {
        entries.sort_by_key(|entry| entry.timestamp);
        for entry in &entries {
            let limit = self.limit_for(&entry.subject, UserTier::Standard);
            let handle = self.window_handle(&entry.subject, limit, entry.timestamp);
            let mut window = handle.lock();
            window.roll(entry.timestamp);
            window.consume(entry.cost);
        }
        entries.len()
    }

    /// 从审计仓库加载最近一个窗口内的条目并重建
    pub async fn rehydrate_from_audit(&self) -> Result<usize, RepositoryError> {
        let Some(audit) = &self.audit else {
            return Ok(0);
        };
        let window = chrono::Duration::from_std(self.config.window)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        let entries = audit.load_since(Utc::now() - window).await?;
        Ok(self.rehydrate(entries))
    }

    /// 删除保留期之前的审计条目
    pub async fn prune_audit(&self, retention: Duration) -> Result<u64, RepositoryError> {
        let Some(audit) = &self.audit else {
            return Ok(0);
        };
        let retention =
            chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::days(30));
        audit.prune_before(Utc::now() - retention).await
    }

    /// 当前窗口快照
    pub fn snapshot(&self, key: &SubjectKey) -> Option<RateWindow> {
        self.windows.get(key).map(|handle| handle.value().lock().clone())
    }
}
