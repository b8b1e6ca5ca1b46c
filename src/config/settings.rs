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

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::services::rate_limiter::RateLimiterConfig;
use crate::engines::chromium_engine::ChromiumConfig;
use crate::utils::retry_policy::RetryPolicy;
use crate::utils::robots::RobotsResolverConfig;
use crate::workers::manager::JobManagerConfig;
use crate::workers::orchestrator::OrchestratorConfig;

/// 应用程序配置设置
///
/// 包含服务器、抓取引擎、持久化存储和浏览器等所有配置项
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 服务器配置
    pub server: ServerSettings,
    /// 抓取引擎配置
    pub engine: EngineSettings,
    /// 存储配置
    pub storage: StorageSettings,
    /// 浏览器配置
    pub browser: BrowserSettings,
}

/// 服务器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// 服务器监听主机地址
    pub host: String,
    /// 服务器监听端口
    pub port: u16,
}

/// 抓取引擎配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    /// 每个 (用户, 域名) 窗口内允许的请求数
    pub rate_limit_per_domain: u32,
    /// 每个用户全局窗口内允许的请求数
    pub rate_limit_global: u32,
    /// 管理员全局限额
    pub admin_global_limit: u32,
    /// 限流窗口长度（秒）
    pub rate_window_secs: u64,
    /// robots.txt 缓存有效期（秒）
    pub robots_cache_ttl_secs: u64,
    /// robots.txt 读取失败后降级策略的有效期（秒）
    pub robots_failure_ttl_secs: u64,
    /// robots.txt 无法读取时是否放行
    pub robots_fail_open: bool,
    /// 匹配 robots.txt 规则使用的 User-Agent 名称
    pub robots_user_agent: String,
    /// 同时执行的任务数
    pub max_concurrent_jobs: usize,
    /// 等待队列深度
    pub max_queue_depth: usize,
    /// 单页抓取超时（秒）
    pub per_fetch_timeout_secs: u64,
    /// 单页最大重试次数
    pub max_page_retries: u32,
    /// 首次重试退避（毫秒）
    pub retry_initial_backoff_ms: u64,
    /// 单个任务最多翻页数
    pub max_pages_per_job: u32,
    /// 单个请求最大记录数
    pub max_item_limit: u32,
    /// 页面加载后的等待时间（毫秒）
    pub settle_delay_ms: u64,
    /// 终止结果保留时间（秒）
    pub result_retention_secs: u64,
}

/// 存储配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// 数据目录
    pub data_dir: String,
    /// 限流审计日志文件名（JSON lines）
    pub audit_log_file: String,
    /// robots.txt 缓存文件名
    pub robots_cache_file: String,
    /// 审计日志保留天数
    pub audit_retention_days: u64,
}

/// 浏览器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserSettings {
    /// 是否无头模式
    pub headless: bool,
    /// 远程浏览器调试地址，设置后不再启动本地浏览器
    pub remote_debugging_url: Option<String>,
    /// 启动超时（秒）
    pub launch_timeout_secs: u64,
    /// 是否拒绝访问内网地址
    pub ssrf_protection: bool,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 从默认值、配置文件和环境变量依次加载配置
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        Self::with_defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("PROMPTSCRAPE").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// 只含默认值的配置构建器
    pub fn with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            // Server
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            // Engine
            .set_default("engine.rate_limit_per_domain", 5)?
            .set_default("engine.rate_limit_global", 20)?
            .set_default("engine.admin_global_limit", 1000)?
            .set_default("engine.rate_window_secs", 86400)?
            .set_default("engine.robots_cache_ttl_secs", 86400)?
            .set_default("engine.robots_failure_ttl_secs", 300)?
            .set_default("engine.robots_fail_open", true)?
            .set_default("engine.robots_user_agent", "promptscrape-bot")?
            .set_default("engine.max_concurrent_jobs", 4)?
            .set_default("engine.max_queue_depth", 16)?
            .set_default("engine.per_fetch_timeout_secs", 30)?
            .set_default("engine.max_page_retries", 2)?
            .set_default("engine.retry_initial_backoff_ms", 500)?
            .set_default("engine.max_pages_per_job", 50)?
            .set_default("engine.max_item_limit", 500)?
            .set_default("engine.settle_delay_ms", 1500)?
            .set_default("engine.result_retention_secs", 600)?
            // Storage
            .set_default("storage.data_dir", "./data")?
            .set_default("storage.audit_log_file", "rate_audit.jsonl")?
            .set_default("storage.robots_cache_file", "robots_cache.json")?
            .set_default("storage.audit_retention_days", 30)?
            // Browser
            .set_default("browser.headless", true)?
            .set_default("browser.launch_timeout_secs", 30)?
            .set_default("browser.ssrf_protection", true)
    }

    pub fn rate_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            per_domain_limit: self.engine.rate_limit_per_domain,
            global_limit: self.engine.rate_limit_global,
            admin_global_limit: self.engine.admin_global_limit,
            window: Duration::from_secs(self.engine.rate_window_secs),
        }
    }

    pub fn robots_config(&self) -> RobotsResolverConfig {
        RobotsResolverConfig {
            ttl: Duration::from_secs(self.engine.robots_cache_ttl_secs),
            failure_ttl: Duration::from_secs(self.engine.robots_failure_ttl_secs),
            fail_open: self.engine.robots_fail_open,
            user_agent: self.engine.robots_user_agent.clone(),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_item_limit: self.engine.max_item_limit,
            max_pages_per_job: self.engine.max_pages_per_job,
            per_fetch_timeout: Duration::from_secs(self.engine.per_fetch_timeout_secs),
            retry_policy: RetryPolicy::for_page_fetch(
                self.engine.max_page_retries,
                Duration::from_millis(self.engine.retry_initial_backoff_ms),
            ),
        }
    }

    pub fn manager_config(&self) -> JobManagerConfig {
        JobManagerConfig {
            max_concurrent_jobs: self.engine.max_concurrent_jobs,
            max_queue_depth: self.engine.max_queue_depth,
            result_retention: Duration::from_secs(self.engine.result_retention_secs),
        }
    }

    pub fn chromium_config(&self) -> ChromiumConfig {
        ChromiumConfig {
            headless: self.browser.headless,
            remote_debugging_url: self.browser.remote_debugging_url.clone(),
            launch_timeout: Duration::from_secs(self.browser.launch_timeout_secs),
            settle_delay: Duration::from_millis(self.engine.settle_delay_ms),
            ssrf_protection: self.browser.ssrf_protection,
        }
    }

    pub fn audit_log_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.data_dir).join(&self.storage.audit_log_file)
    }

    pub fn robots_cache_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.data_dir).join(&self.storage.robots_cache_file)
    }

    pub fn audit_retention(&self) -> Duration {
        Duration::from_secs(self.storage.audit_retention_days * 24 * 3600)
    }
}
