// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// 该模块包含系统的技术实现细节，提供对领域层抽象的具体实现。
///
/// 包含的子模块：
/// - 指标（metrics）：Prometheus 记录器安装与指标说明
/// - 仓库实现（repositories）：限流审计日志与 robots.txt 缓存的文件存储
///
/// 基础设施层依赖于领域层的抽象接口，领域层不感知具体的存储方式。
pub mod metrics;
pub mod repositories;
