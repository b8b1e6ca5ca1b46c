// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::domain::models::scrape_request::UserId;

/// 限流作用域
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateScope {
    /// 按目标域名
    Domain(String),
    /// 用户全局
    Global,
}

/// 限流主体键：(用户, 域名或全局)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectKey {
    pub user: UserId,
    pub scope: RateScope,
}

impl SubjectKey {
    pub fn domain(user: &UserId, domain: &str) -> Self {
        Self {
            user: user.clone(),
            scope: RateScope::Domain(domain.to_string()),
        }
    }

    pub fn global(user: &UserId) -> Self {
        Self {
            user: user.clone(),
            scope: RateScope::Global,
        }
    }

    /// 指标与错误信息中使用的作用域名称
    pub fn scope_label(&self) -> &'static str {
        match self.scope {
            RateScope::Domain(_) => "domain",
            RateScope::Global => "global",
        }
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.scope {
            RateScope::Domain(domain) => write!(f, "{}@{}", self.user, domain),
            RateScope::Global => write!(f, "{}@global", self.user),
        }
    }
}

/// 固定窗口计数器
///
/// 每个主体键只有一个活动窗口，只能在限流器对该键的串行访问中修改。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateWindow {
    pub subject: SubjectKey,
    pub window_start: DateTime<Utc>,
    pub count: u32,
    pub limit: u32,
    pub window_duration: Duration,
}

impl RateWindow {
    pub fn new(
        subject: SubjectKey,
        limit: u32,
        window_duration: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            subject,
            window_start: now,
            count: 0,
            limit,
            window_duration,
        }
    }

    fn window_end(&self) -> DateTime<Utc> {
        self.window_start
            + chrono::Duration::from_std(self.window_duration)
                .unwrap_or_else(|_| chrono::Duration::days(1))
    }

    /// 窗口到期后重置计数
    ///
    /// # 返回值
    ///
    /// 发生重置时返回 true
    pub fn roll(&mut self, now: DateTime<Utc>) -> bool {
        if now >= self.window_end() {
            self.window_start = now;
            self.count = 0;
            true
        } else {
            false
        }
    }

    /// 当前窗口剩余额度
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.count)
    }

    pub fn has_capacity(&self, cost: u32) -> bool {
        self.count.saturating_add(cost) <= self.limit
    }

    /// 消耗额度，调用方需先确认 `has_capacity`
    pub fn consume(&mut self, cost: u32) {
        self.count = self.count.saturating_add(cost);
    }

    /// 距离窗口重置的时间
    pub fn retry_after(&self, now: DateTime<Utc>) -> Duration {
        (self.window_end() - now).to_std().unwrap_or(Duration::ZERO)
    }
}
