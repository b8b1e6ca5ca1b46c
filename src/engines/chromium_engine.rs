// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{Headers, SetExtraHttpHeadersParams};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::engines::stealth::{SCROLL_SCRIPT, STEALTH_INIT_SCRIPT, STEALTH_LAUNCH_ARGS};
use crate::engines::traits::{BrowserLauncher, BrowserSession, EngineError, RawPage, StealthProfile};
use crate::engines::validators;

/// Chromium 启动配置
#[derive(Debug, Clone)]
pub struct ChromiumConfig {
    pub headless: bool,
    /// 远程 Chrome 调试地址；设置后连接该实例而不是本地启动
    pub remote_debugging_url: Option<String>,
    pub launch_timeout: Duration,
    /// 导航完成后等待动态内容的时间
    pub settle_delay: Duration,
    pub ssrf_protection: bool,
}

impl Default for ChromiumConfig {
    fn default() -> Self {
        Self {
            headless: true,
            remote_debugging_url: None,
            launch_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_millis(1500),
            ssrf_protection: true,
        }
    }
}

/// 基于 chromiumoxide 的浏览器启动器
///
/// 每个会话独占一个浏览器进程（或远程实例上的一个页面），伪装参数按会话随机。
pub struct ChromiumLauncher {
    config: ChromiumConfig,
}

impl ChromiumLauncher {
    pub fn new(config: ChromiumConfig) -> Self {
        Self { config }
    }

    async fn start_browser(
        &self,
        profile: &StealthProfile,
    ) -> Result<(Browser, JoinHandle<()>, bool), EngineError> {
        let (browser, mut handler, owned) = if let Some(ref url) = self.config.remote_debugging_url {
            info!("Connecting to remote Chrome instance at: {}", url);
            let (browser, handler) = Browser::connect(url)
                .await
                .map_err(|e| EngineError::Launch(format!("Failed to connect to remote Chrome: {}", e)))?;
            (browser, handler, false)
        } else {
            let mut builder = BrowserConfig::builder()
                .no_sandbox()
                .window_size(profile.viewport.width, profile.viewport.height)
                .request_timeout(self.config.launch_timeout);
            if !self.config.headless {
                builder = builder.with_head();
            }
            for arg in STEALTH_LAUNCH_ARGS {
                builder = builder.arg(*arg);
            }

            let config = builder.build().map_err(EngineError::Launch)?;
            let (browser, handler) = Browser::launch(config)
                .await
                .map_err(|e| EngineError::Launch(e.to_string()))?;
            (browser, handler, true)
        };

        // 处理浏览器事件
        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok((browser, handle, owned))
    }

    async fn prepare_page(&self, browser: &Browser, profile: &StealthProfile) -> Result<Page, EngineError> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| EngineError::Launch(e.to_string()))?;

        page.set_user_agent(profile.user_agent.as_str())
            .await
            .map_err(|e| EngineError::Launch(e.to_string()))?;
        page.evaluate_on_new_document(STEALTH_INIT_SCRIPT.to_string())
            .await
            .map_err(|e| EngineError::Launch(e.to_string()))?;
        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(profile.viewport.width),
            i64::from(profile.viewport.height),
            1.0,
            false,
        ))
        .await
        .map_err(|e| EngineError::Launch(e.to_string()))?;

        let headers = serde_json::to_value(&profile.extra_headers)
            .map_err(|e| EngineError::Other(e.to_string()))?;
        page.execute(SetExtraHttpHeadersParams::new(Headers::new(headers)))
            .await
            .map_err(|e| EngineError::Launch(e.to_string()))?;

        Ok(page)
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, profile: &StealthProfile) -> Result<Box<dyn BrowserSession>, EngineError> {
        let (mut browser, handler, owned) = tokio::time::timeout(
            self.config.launch_timeout,
            self.start_browser(profile),
        )
        .await
        .map_err(|_| EngineError::Launch("timed out starting browser".to_string()))??;

        let page = match self.prepare_page(&browser, profile).await {
            Ok(page) => page,
            Err(e) => {
                // 页面准备失败时不能遗留浏览器进程
                if owned {
                    let _ = browser.close().await;
                    let _ = browser.wait().await;
                }
                handler.abort();
                return Err(e);
            }
        };

        debug!(
            "Browser session ready (viewport {}x{})",
            profile.viewport.width, profile.viewport.height
        );

        Ok(Box::new(ChromiumSession {
            browser: Some(browser),
            page: Some(page),
            handler: Some(handler),
            owned,
            settle_delay: self.config.settle_delay,
            ssrf_protection: self.config.ssrf_protection,
        }))
    }

    fn name(&self) -> &'static str {
        "chromium"
    }
}

/// Chromium 浏览器会话
pub struct ChromiumSession {
    browser: Option<Browser>,
    page: Option<Page>,
    handler: Option<JoinHandle<()>>,
    /// 是否由本会话启动（远程实例只关闭页面）
    owned: bool,
    settle_delay: Duration,
    ssrf_protection: bool,
}

impl ChromiumSession {
    async fn scroll(page: &Page, passes: u32, pause: Duration) -> Result<(), EngineError> {
        let mut last_height = 0.0_f64;
        for pass in 0..passes {
            let height: f64 = page
                .evaluate(SCROLL_SCRIPT)
                .await
                .map_err(|e| EngineError::Navigation(format!("Scroll failed: {}", e)))?
                .into_value()
                .unwrap_or(0.0);
            tokio::time::sleep(pause).await;
            if pass > 0 && (height - last_height).abs() < f64::EPSILON {
                break;
            }
            last_height = height;
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &Url, scroll_passes: u32) -> Result<RawPage, EngineError> {
        if self.ssrf_protection {
            validators::validate_url(url).await?;
        }
        let page = self
            .page
            .as_ref()
            .ok_or_else(|| EngineError::Other("session already closed".to_string()))?;

        page.goto(url.as_str())
            .await
            .map_err(|e| EngineError::Navigation(e.to_string()))?;

        let status = match page.wait_for_navigation_response().await {
            Ok(Some(request)) => request
                .response
                .as_ref()
                .map(|response| response.status as u16)
                .unwrap_or(200),
            _ => 200,
        };
        if status >= 400 {
            return Err(EngineError::HttpStatus(status));
        }

        tokio::time::sleep(self.settle_delay).await;
        if scroll_passes > 0 {
            Self::scroll(page, scroll_passes, self.settle_delay).await?;
        }

        let html = page
            .content()
            .await
            .map_err(|e| EngineError::Navigation(e.to_string()))?;
        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .and_then(|u| Url::parse(&u).ok())
            .unwrap_or_else(|| url.clone());

        Ok(RawPage {
            url: final_url,
            status,
            html,
        })
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        let mut result = Ok(());
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                result = Err(EngineError::Other(format!("Failed to close page: {}", e)));
            }
        }
        if let Some(mut browser) = self.browser.take() {
            if self.owned {
                if let Err(e) = browser.close().await {
                    warn!("Failed to close browser: {}", e);
                }
                let _ = browser.wait().await;
            }
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        result
    }
}
