// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// 仓库层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("存储读写错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("未找到数据")]
    NotFound,

    #[error("内部错误: {0}")]
    InternalError(String),
}

/// 抓取任务的拒绝/失败原因
///
/// 每个终止状态都携带一个可读的原因；`RateLimited` 额外携带重试等待秒数。
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScrapeError {
    /// 请求格式错误（字段为空、数量非法、实体类型不受支持）
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// 用户在当前窗口内的配额已用尽
    #[error("Rate limit exceeded for {scope}, retry after {retry_after_secs}s")]
    RateLimited { scope: String, retry_after_secs: u64 },

    /// robots.txt 禁止访问目标路径
    #[error("Crawling {path} on {domain} is disallowed by robots.txt")]
    RobotsDisallowed { domain: String, path: String },

    /// 浏览器会话无法启动
    #[error("Fetch session unavailable: {reason}")]
    FetchUnavailable { reason: String },

    /// 单页抓取在重试后仍然失败（降级为部分结果）
    #[error("Page {page} failed after {attempts} attempts: {reason}")]
    PageFetchFailed {
        page: u32,
        attempts: u32,
        reason: String,
    },

    /// 无适配器且启发式提取也失败
    #[error("No adapter for {domain} and heuristic extraction found nothing")]
    Unsupported { domain: String },

    /// 适配器内部错误
    #[error("Site adapter failed: {reason}")]
    AdapterFault { reason: String },

    /// 工作池与等待队列均已满
    #[error("Engine is at capacity, try again later")]
    QueueFull,

    /// 任务被用户或进程关闭取消
    #[error("Job was cancelled")]
    Cancelled,
}

impl ScrapeError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        ScrapeError::InvalidRequest {
            reason: reason.into(),
        }
    }

    pub fn rate_limited(scope: impl Into<String>, retry_after: Duration) -> Self {
        // 向上取整，避免客户端过早重试
        let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
        ScrapeError::RateLimited {
            scope: scope.into(),
            retry_after_secs: secs,
        }
    }

    /// 重试等待时间，仅 `RateLimited` 有值
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ScrapeError::RateLimited {
                retry_after_secs, ..
            } => Some(Duration::from_secs(*retry_after_secs)),
            _ => None,
        }
    }

    /// 指标标签
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::InvalidRequest { .. } => "invalid_request",
            ScrapeError::RateLimited { .. } => "rate_limited",
            ScrapeError::RobotsDisallowed { .. } => "robots_disallowed",
            ScrapeError::FetchUnavailable { .. } => "fetch_unavailable",
            ScrapeError::PageFetchFailed { .. } => "page_fetch_failed",
            ScrapeError::Unsupported { .. } => "unsupported",
            ScrapeError::AdapterFault { .. } => "adapter_fault",
            ScrapeError::QueueFull => "queue_full",
            ScrapeError::Cancelled => "cancelled",
        }
    }
}
