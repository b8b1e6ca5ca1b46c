// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::counter;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::engines::traits::{BrowserLauncher, BrowserSession, EngineError, RawPage, StealthProfile};
use crate::utils::retry_policy::RetryPolicy;

/// 单页抓取失败
#[derive(Error, Debug)]
pub enum FetchError {
    /// 在挂起点收到取消信号
    #[error("fetch cancelled")]
    Cancelled,
    /// 重试次数用尽
    #[error("fetch failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: EngineError,
    },
}

/// 会话抓取参数
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// 单次导航超时
    pub per_fetch_timeout: Duration,
    /// 超时或 HTTP 错误的重试策略
    pub retry_policy: RetryPolicy,
    /// 同一会话内相邻两次请求的最小间隔
    pub crawl_delay: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            per_fetch_timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy::default(),
            crawl_delay: Duration::ZERO,
        }
    }
}

/// 隐身抓取会话
///
/// 持有一个浏览器会话直到 `close`；未显式关闭就被丢弃时，会在后台补做关闭。
pub struct StealthFetchSession {
    session: Option<Box<dyn BrowserSession>>,
    settings: FetchSettings,
    profile: StealthProfile,
    last_fetch: Option<Instant>,
}

impl StealthFetchSession {
    /// 启动浏览器会话
    ///
    /// # 参数
    ///
    /// * `launcher` - 浏览器启动器
    /// * `profile` - 本会话的伪装参数
    /// * `settings` - 超时、重试与抓取间隔
    ///
    /// # 返回值
    ///
    /// * `Err(EngineError)` - 浏览器无法启动
    pub async fn open(
        launcher: &dyn BrowserLauncher,
        profile: StealthProfile,
        settings: FetchSettings,
    ) -> Result<Self, EngineError> {
        let session = launcher.launch(&profile).await?;
        debug!(
            "Opened {} session with user agent {}",
            launcher.name(),
            profile.user_agent
        );
        Ok(Self {
            session: Some(session),
            settings,
            profile,
            last_fetch: None,
        })
    }

    pub fn profile(&self) -> &StealthProfile {
        &self.profile
    }

    pub fn crawl_delay(&self) -> Duration {
        self.settings.crawl_delay
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// 可取消的定时等待
    async fn pause(duration: Duration, cancel: &CancellationToken) -> Result<(), FetchError> {
        if duration.is_zero() {
            return if cancel.is_cancelled() {
                Err(FetchError::Cancelled)
            } else {
                Ok(())
            };
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// 距离下一次允许请求还需等待的时间
    fn remaining_delay(&self) -> Duration {
        match self.last_fetch {
            Some(last) => self.settings.crawl_delay.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// 抓取一页
    ///
    /// 请求之间遵守抓取间隔；超时或 HTTP 错误按重试策略指数退避重试。
    /// 取消只在等待期间生效，进行中的导航会完成或超时。
    pub async fn fetch(
        &mut self,
        url: &Url,
        scroll_passes: u32,
        cancel: &CancellationToken,
    ) -> Result<RawPage, FetchError> {
        let mut retries = 0;
        loop {
            let remaining = self.remaining_delay();
            Self::pause(remaining, cancel).await?;

            let session = self.session.as_mut().ok_or_else(|| FetchError::Exhausted {
                attempts: retries,
                source: EngineError::Other("session already closed".to_string()),
            })?;
            let outcome = tokio::time::timeout(
                self.settings.per_fetch_timeout,
                session.navigate(url, scroll_passes),
            )
            .await
            .unwrap_or(Err(EngineError::Timeout));
            self.last_fetch = Some(Instant::now());

            match outcome {
                Ok(page) => {
                    counter!("scrape_pages_fetched_total").increment(1);
                    return Ok(page);
                }
                Err(e) if e.is_retryable() && self.settings.retry_policy.should_retry(retries) => {
                    retries += 1;
                    counter!("scrape_page_retries_total").increment(1);
                    let backoff = self.settings.retry_policy.calculate_backoff(retries);
                    warn!(
                        "Fetch of {} failed ({}), retry {} in {:?}",
                        url, e, retries, backoff
                    );
                    Self::pause(backoff, cancel).await?;
                }
                Err(e) => {
                    return Err(FetchError::Exhausted {
                        attempts: retries + 1,
                        source: e,
                    })
                }
            }
        }
    }

    /// 释放浏览器会话，可重复调用
    ///
    /// # 返回值
    ///
    /// 本次调用实际执行了关闭时返回 true
    pub async fn close(&mut self) -> bool {
        match self.session.take() {
            Some(mut session) => {
                if let Err(e) = session.close().await {
                    warn!("Error while closing browser session: {}", e);
                }
                true
            }
            None => false,
        }
    }
}

impl Drop for StealthFetchSession {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    warn!("Fetch session dropped without close, releasing in background");
                    handle.spawn(async move {
                        if let Err(e) = session.close().await {
                            warn!("Error while closing browser session: {}", e);
                        }
                    });
                }
                Err(_) => warn!("Fetch session dropped outside runtime, browser not released"),
            }
        }
    }
}
