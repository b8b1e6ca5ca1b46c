// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 该模块定义了抓取引擎的核心业务实体，包括：
/// - 抓取请求（scrape_request）：由提示词解析器生成的结构化请求
/// - 抓取任务（job）：编排器驱动的任务及其状态机
/// - 抓取记录（record）：适配器提取出的表格行
/// - 爬取策略（robots_policy）：解析后的 robots.txt
/// - 限流窗口（rate_window）：按主体键计数的固定窗口
pub mod job;
pub mod rate_window;
pub mod record;
pub mod robots_policy;
pub mod scrape_request;
