// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::domain::models::record::Record;
use crate::engines::traits::PageContent;

/// 适配器错误类型
#[derive(Error, Debug)]
pub enum AdapterError {
    /// CSS 选择器无效
    #[error("Invalid selector '{selector}': {reason}")]
    Selector { selector: String, reason: String },
    /// 无法构造搜索地址
    #[error("Invalid search URL: {0}")]
    Url(#[from] url::ParseError),
    /// 页面结构无法解析
    #[error("Malformed page: {0}")]
    MalformedPage(String),
}

/// 提取结果的可信度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// 针对站点定制的适配器
    High,
    /// 通用启发式提取
    Heuristic,
}

/// 站点适配器特质
///
/// 新增支持的站点只需提供一个新的实现并注册。
pub trait SiteAdapter: Send + Sync {
    /// 适配器名称
    fn name(&self) -> &'static str;

    /// 负责的域名（按精确或后缀匹配）
    fn domains(&self) -> &[&'static str];

    /// 构造第 `page` 页的搜索地址（从 1 开始）
    fn build_search_url(&self, domain: &str, entity_type: &str, page: u32) -> Result<Url, AdapterError>;

    /// 从页面内容中提取记录，按页面中的出现顺序返回
    fn extract_records(&self, page: &PageContent) -> Result<Vec<Record>, AdapterError>;

    /// 页面是否存在下一页
    fn has_next_page(&self, page: &PageContent) -> bool;

    /// 加载后需要的无限滚动次数
    fn scroll_passes(&self) -> u32 {
        0
    }

    fn confidence(&self) -> Confidence {
        Confidence::High
    }
}
