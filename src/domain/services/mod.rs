// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 包含的服务：
/// - 提示词解析（prompt_interpreter）：自由文本到结构化请求的转换
/// - 限流器（rate_limiter）：按 (用户, 域名) 与 (用户, 全局) 的固定窗口准入判定
pub mod prompt_interpreter;
pub mod rate_limiter;
