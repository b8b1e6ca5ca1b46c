// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 该模块定义了领域层的仓库接口，具体实现由基础设施层提供。
///
/// 引擎只拥有两类持久化数据：
/// - 限流审计日志（rate_audit_repository）：只追加的 `(主体键, 时间, 消耗)` 记录
/// - robots 策略缓存（robots_cache_repository）：按域名、带 TTL 的策略缓存
pub mod rate_audit_repository;
pub mod robots_cache_repository;
