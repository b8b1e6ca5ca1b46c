// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::models::rate_window::SubjectKey;
use crate::utils::errors::RepositoryError;

/// 限流审计日志条目
///
/// 只追加；进程启动时用于重建内存中的限流窗口。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub subject: SubjectKey,
    pub timestamp: DateTime<Utc>,
    pub cost: u32,
}

impl AuditEntry {
    pub fn new(subject: SubjectKey, timestamp: DateTime<Utc>, cost: u32) -> Self {
        Self {
            subject,
            timestamp,
            cost,
        }
    }
}

/// 限流审计日志仓库特质
#[async_trait]
pub trait RateAuditRepository: Send + Sync {
    /// 追加审计条目
    async fn append(&self, entries: &[AuditEntry]) -> Result<(), RepositoryError>;

    /// 读取指定时间之后的全部条目（按写入顺序）
    async fn load_since(&self, since: DateTime<Utc>) -> Result<Vec<AuditEntry>, RepositoryError>;

    /// 删除指定时间之前的条目，返回删除数量
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError>;
}
