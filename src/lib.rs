// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 站点适配器模块
///
/// 按域名构造搜索地址、提取记录并判断是否有下一页
pub mod adapters;

/// 应用程序模块
///
/// 包含请求 DTO 与用例
pub mod application;

/// 配置模块
///
/// 分层加载默认值、配置文件与环境变量
pub mod config;

/// 领域模块
///
/// 请求、任务状态机、robots.txt 策略与限流窗口
pub mod domain;

/// 引擎模块
///
/// 浏览器会话、隐身参数与带重试的页面抓取
pub mod engines;

/// 基础设施模块
///
/// 审计日志与策略缓存的文件存储、指标记录器
pub mod infrastructure;

/// 展示层模块
///
/// HTTP 接口
pub mod presentation;

/// 工具模块
///
/// 错误类型、重试策略、robots.txt 解析与日志
pub mod utils;

/// 工作器模块
///
/// 任务编排与并发调度
pub mod workers;
