// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::record::Record;
use crate::domain::models::scrape_request::ScrapeRequest;
use crate::utils::errors::ScrapeError;

/// 抓取任务状态
///
/// 状态转换遵循以下流程：
/// Admitted → Checking → Fetching → Paginating → Completed
/// Admitted/Checking → Rejected；Fetching/Paginating → Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// 已接收，等待限流判定
    Admitted,
    /// 检查 robots.txt
    Checking,
    /// 打开会话并抓取第一页
    Fetching,
    /// 翻页提取
    Paginating,
    /// 已完成（可能带有警告的部分结果）
    Completed,
    /// 执行前被拒绝
    Rejected,
    /// 执行中失败
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Rejected | JobState::Failed
        )
    }

    fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Admitted, Checking)
                | (Admitted, Rejected)
                | (Checking, Fetching)
                | (Checking, Rejected)
                | (Fetching, Paginating)
                | (Fetching, Failed)
                | (Fetching, Completed)
                | (Paginating, Completed)
                | (Paginating, Failed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            JobState::Admitted => "admitted",
            JobState::Checking => "checking",
            JobState::Fetching => "fetching",
            JobState::Paginating => "paginating",
            JobState::Completed => "completed",
            JobState::Rejected => "rejected",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// 领域错误类型
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DomainError {
    /// 无效的状态转换
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: JobState, to: JobState },
}

/// 抓取任务
///
/// 在执行期间由编排器独占；进入终止状态后转换为 `JobResult`。
#[derive(Debug, Clone)]
pub struct ScrapeJob {
    pub id: Uuid,
    pub request: ScrapeRequest,
    pub state: JobState,
    pub pages_fetched: u32,
    pub items_collected: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ScrapeJob {
    pub fn new(request: ScrapeRequest) -> Self {
        Self::with_id(Uuid::new_v4(), request)
    }

    pub fn with_id(id: Uuid, request: ScrapeRequest) -> Self {
        Self {
            id,
            request,
            state: JobState::Admitted,
            pages_fetched: 0,
            items_collected: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// 状态转换
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 转换成功
    /// * `Err(DomainError)` - 转换不符合状态机规则
    pub fn transition(&mut self, next: JobState) -> Result<(), DomainError> {
        if !self.state.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// 剩余可收集的记录数
    pub fn remaining_items(&self) -> u32 {
        self.request.item_limit.saturating_sub(self.items_collected)
    }
}

/// 任务元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub pages_fetched: u32,
    pub items_collected: u32,
    pub item_limit: u32,
    pub domain: String,
    /// 使用的站点适配器
    pub adapter: Option<String>,
    /// 是否使用了启发式通用适配器
    pub heuristic: bool,
    /// 实际遵守的抓取间隔（毫秒）
    pub crawl_delay_ms: u64,
    /// robots.txt 是否为降级策略
    pub robots_degraded: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// 任务终止结果，交给展示/导出层
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: Uuid,
    pub state: JobState,
    /// 非 Completed 状态的原因
    pub reason: Option<ScrapeError>,
    /// 可读的原因描述
    pub message: Option<String>,
    pub records: Vec<Record>,
    pub warnings: Vec<String>,
    pub metadata: JobMetadata,
}

impl JobResult {
    /// 请求在创建任务前即被拒绝（格式错误、队列已满等）
    pub fn rejected_before_start(job_id: Uuid, request: &ScrapeRequest, reason: ScrapeError) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            state: JobState::Rejected,
            message: Some(reason.to_string()),
            reason: Some(reason),
            records: Vec::new(),
            warnings: Vec::new(),
            metadata: JobMetadata {
                item_limit: request.item_limit,
                domain: request.domain.clone(),
                started_at: Some(now),
                finished_at: Some(now),
                ..Default::default()
            },
        }
    }

    /// 任务在获得执行槽位前被取消
    pub fn cancelled_before_start(job_id: Uuid, request: &ScrapeRequest) -> Self {
        Self::aborted(job_id, request, ScrapeError::Cancelled)
    }

    /// 任务异常终止，不携带任何记录
    pub fn aborted(job_id: Uuid, request: &ScrapeRequest, reason: ScrapeError) -> Self {
        let mut result = Self::rejected_before_start(job_id, request, reason);
        result.state = JobState::Failed;
        result
    }

    pub fn is_success(&self) -> bool {
        self.state == JobState::Completed
    }
}
