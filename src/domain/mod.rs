// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// 该模块包含抓取引擎的核心业务逻辑，包括：
/// - 领域模型（models）：请求、任务、记录、爬取策略和限流窗口
/// - 仓库接口（repositories）：审计日志与策略缓存的持久化抽象
/// - 服务（services）：限流判定与提示词解析
///
/// 领域层不依赖具体的存储或浏览器实现。
pub mod models;
pub mod repositories;
pub mod services;
