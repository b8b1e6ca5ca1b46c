// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 提供抓取任务的执行与调度：
/// - 编排器（orchestrator）：单个任务的状态机
/// - 管理器（manager）：工作池容量、等待队列、取消与结果保留
pub mod manager;
pub mod orchestrator;

pub use manager::{JobManager, JobManagerConfig, JobStatus, JobTicket};
pub use orchestrator::{OrchestratorConfig, ScrapeOrchestrator};
