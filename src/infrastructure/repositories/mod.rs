// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库实现模块
///
/// 提供领域仓库接口的具体实现：文件持久化版本与内存版本
pub mod audit_log_repo_impl;
pub mod robots_cache_repo_impl;
