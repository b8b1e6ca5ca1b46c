// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 抓取引擎模块
///
/// 浏览器会话的启动与释放、隐身参数以及带重试的单页抓取。
pub mod chromium_engine;
pub mod fetch_session;
pub mod stealth;
pub mod traits;
pub mod validators;
