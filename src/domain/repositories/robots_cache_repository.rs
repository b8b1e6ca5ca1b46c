// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;

use crate::domain::models::robots_policy::RobotsPolicy;
use crate::utils::errors::RepositoryError;

/// robots 策略缓存仓库特质
///
/// 以域名为键，条目的有效期由 `RobotsPolicy::expires_at` 决定。
#[async_trait]
pub trait RobotsCacheRepository: Send + Sync {
    /// 读取域名的缓存策略（可能已过期，由调用方判断）
    async fn get(&self, domain: &str) -> Result<Option<RobotsPolicy>, RepositoryError>;

    /// 写入或覆盖域名的策略
    async fn put(&self, policy: &RobotsPolicy) -> Result<(), RepositoryError>;

    /// 删除全部已过期条目，返回删除数量
    async fn purge_expired(&self) -> Result<u64, RepositoryError>;
}
