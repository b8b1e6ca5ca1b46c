// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 站点适配器模块
///
/// 每个适配器负责一个站点的搜索地址构造、分页判断和记录提取；
/// 注册表按域名选择适配器，未知域名回退到启发式通用适配器。
pub mod amazon;
pub mod extract;
pub mod flipkart;
pub mod generic;
pub mod registry;
pub mod traits;

pub use registry::{AdapterRegistry, AdapterSelection};
pub use traits::{AdapterError, Confidence, SiteAdapter};
