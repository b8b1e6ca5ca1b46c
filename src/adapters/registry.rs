// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use tracing::debug;

use crate::adapters::amazon::AmazonAdapter;
use crate::adapters::flipkart::FlipkartAdapter;
use crate::adapters::generic::GenericAdapter;
use crate::adapters::traits::{Confidence, SiteAdapter};
use crate::utils::errors::ScrapeError;

/// 注册表查找结果
#[derive(Clone)]
pub struct AdapterSelection {
    pub adapter: Arc<dyn SiteAdapter>,
    /// 是否为启发式回退适配器
    pub heuristic: bool,
}

impl std::fmt::Debug for AdapterSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterSelection")
            .field("adapter", &self.adapter.name())
            .field("heuristic", &self.heuristic)
            .finish()
    }
}

/// 站点适配器注册表
///
/// 按域名精确或后缀匹配；多个适配器匹配时取最长的域名。
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn SiteAdapter>>,
    fallback: Option<Arc<dyn SiteAdapter>>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl AdapterRegistry {
    /// 空注册表，未知域名回退到通用适配器
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
            fallback: Some(Arc::new(GenericAdapter::new())),
        }
    }

    /// 内置 Flipkart 与 Amazon 适配器
    pub fn with_defaults() -> Self {
        Self::new()
            .register(Arc::new(FlipkartAdapter::new()))
            .register(Arc::new(AmazonAdapter::new()))
    }

    pub fn register(mut self, adapter: Arc<dyn SiteAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// 替换回退适配器；`None` 表示未知域名直接返回 Unsupported
    pub fn with_fallback(mut self, fallback: Option<Arc<dyn SiteAdapter>>) -> Self {
        self.fallback = fallback;
        self
    }

    /// 查找域名对应的适配器
    ///
    /// # 返回值
    ///
    /// * `Ok(AdapterSelection)` - 匹配的适配器或启发式回退
    /// * `Err(ScrapeError::Unsupported)` - 没有匹配且未配置回退
    pub fn adapter_for(&self, domain: &str) -> Result<AdapterSelection, ScrapeError> {
        let best = self
            .adapters
            .iter()
            .filter_map(|adapter| {
                adapter
                    .domains()
                    .iter()
                    .filter(|d| domain_matches(domain, d))
                    .map(|d| d.len())
                    .max()
                    .map(|len| (len, adapter))
            })
            .max_by_key(|(len, _)| *len);

        if let Some((_, adapter)) = best {
            debug!("Selected adapter {} for {}", adapter.name(), domain);
            return Ok(AdapterSelection {
                adapter: Arc::clone(adapter),
                heuristic: adapter.confidence() == Confidence::Heuristic,
            });
        }

        match &self.fallback {
            Some(fallback) => {
                debug!("No adapter for {}, using heuristic {}", domain, fallback.name());
                Ok(AdapterSelection {
                    adapter: Arc::clone(fallback),
                    heuristic: true,
                })
            }
            None => Err(ScrapeError::Unsupported {
                domain: domain.to_string(),
            }),
        }
    }
}

/// 精确匹配或子域名匹配
fn domain_matches(domain: &str, candidate: &str) -> bool {
    domain == candidate
        || domain
            .strip_suffix(candidate)
            .is_some_and(|prefix| prefix.ends_with('.'))
}
