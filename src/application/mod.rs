// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用程序模块
///
/// 包含请求 DTO 与用例实现，把 HTTP 层与任务管理器连接起来
pub mod dto;
pub mod usecases;
