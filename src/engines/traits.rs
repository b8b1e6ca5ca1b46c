// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

/// 引擎错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    /// 请求失败
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    /// 目标返回错误状态码
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    /// 浏览器导航失败
    #[error("Navigation failed: {0}")]
    Navigation(String),
    /// 浏览器无法启动或连接
    #[error("Browser launch failed: {0}")]
    Launch(String),
    /// 超时
    #[error("Timeout")]
    Timeout,
    /// 目标地址被 SSRF 保护拦截
    #[error("Blocked URL: {0}")]
    Blocked(String),
    /// 其他错误
    #[error("Other error: {0}")]
    Other(String),
}

impl EngineError {
    /// 判断错误是否可重试
    ///
    /// # 返回值
    ///
    /// 超时、HTTP 错误状态和导航错误可重试；启动失败与地址拦截不可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::RequestFailed(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            EngineError::HttpStatus(_) => true,
            EngineError::Navigation(_) => true,
            EngineError::Timeout => true,
            EngineError::Launch(_) | EngineError::Blocked(_) | EngineError::Other(_) => false,
        }
    }
}

/// 浏览器视口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// 单个会话的伪装参数
#[derive(Debug, Clone, PartialEq)]
pub struct StealthProfile {
    /// User-Agent
    pub user_agent: String,
    /// 视口大小
    pub viewport: Viewport,
    /// 额外请求头
    pub extra_headers: BTreeMap<String, String>,
}

/// 导航得到的原始页面
#[derive(Debug, Clone)]
pub struct RawPage {
    /// 最终地址
    pub url: Url,
    /// HTTP 状态码（无法获取时为 200）
    pub status: u16,
    /// 页面 HTML
    pub html: String,
}

/// 交给站点适配器解析的页面内容
#[derive(Debug, Clone)]
pub struct PageContent {
    /// 页码（从 1 开始）
    pub page: u32,
    pub url: Url,
    pub html: String,
}

/// 浏览器启动器特质
///
/// 每次调用创建一个独立的会话；具体实现可以是本地启动的 Chromium、远程实例或测试桩。
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// 使用指定伪装参数启动会话
    async fn launch(&self, profile: &StealthProfile) -> Result<Box<dyn BrowserSession>, EngineError>;

    /// 启动器名称
    fn name(&self) -> &'static str;
}

/// 浏览器会话特质
#[async_trait]
pub trait BrowserSession: Send {
    /// 导航到页面并返回渲染后的内容
    ///
    /// # 参数
    ///
    /// * `url` - 目标地址
    /// * `scroll_passes` - 加载完成后执行的滚动次数（用于无限滚动页面）
    async fn navigate(&mut self, url: &Url, scroll_passes: u32) -> Result<RawPage, EngineError>;

    /// 释放会话持有的浏览器资源
    async fn close(&mut self) -> Result<(), EngineError>;
}
