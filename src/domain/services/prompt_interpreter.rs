// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use url::Url;

use crate::domain::models::scrape_request::{normalize_domain, ScrapeRequest, UserId};
use crate::utils::errors::ScrapeError;

/// 未指定数量时的默认记录数
pub const DEFAULT_ITEM_LIMIT: u32 = 50;

static ITEM_COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d+)\b").expect("Failed to compile item count regex"));
static WORD_AFTER_COUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d+\s+([A-Za-z][A-Za-z-]*)").expect("Failed to compile entity regex")
});
static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s,;]+").expect("Failed to compile URL regex"));

/// 站点关键词与域名
const SITE_KEYWORDS: &[(&str, &str)] = &[("flipkart", "flipkart.com"), ("amazon", "amazon.in")];

/// 字段关键词
const FIELD_KEYWORDS: &[(&str, &[&str])] = &[
    ("price", &["price", "cost", "amount"]),
    ("rating", &["rating", "review", "star"]),
    ("discount", &["discount", "offer", "sale"]),
    ("title", &["title", "name", "product"]),
    ("description", &["description", "detail", "spec"]),
    ("availability", &["available", "stock"]),
];

const DEFAULT_FIELDS: &[&str] = &["title", "price", "rating"];

/// 类别关键词及其搜索用复数形式
const CATEGORIES: &[(&str, &str)] = &[
    ("mobile", "mobiles"),
    ("laptop", "laptops"),
    ("phone", "phones"),
    ("electronics", "electronics"),
    ("fashion", "fashion"),
    ("book", "books"),
];

/// 不能作为实体类型的常见词
const FILLER_WORDS: &[&str] = &["items", "results", "from", "on", "of", "top", "best", "the"];

/// 提示词解析器接口
///
/// 把自由文本转换为结构化抓取请求。
pub trait PromptInterpreter: Send + Sync {
    fn interpret(&self, prompt: &str, requester: UserId) -> Result<ScrapeRequest, ScrapeError>;
}

/// 基于关键词规则的提示词解析器
#[derive(Debug, Default, Clone)]
pub struct KeywordPromptInterpreter;

impl KeywordPromptInterpreter {
    pub fn new() -> Self {
        Self
    }

    fn item_limit(prompt: &str) -> u32 {
        ITEM_COUNT
            .captures(prompt)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(DEFAULT_ITEM_LIMIT)
    }

    fn domain(prompt: &str, lower: &str) -> Result<String, ScrapeError> {
        if let Some((_, domain)) = SITE_KEYWORDS.iter().find(|(kw, _)| lower.contains(kw)) {
            return Ok(domain.to_string());
        }
        let url = URL_PATTERN
            .find(prompt)
            .ok_or_else(|| ScrapeError::invalid("prompt names no supported site and no URL"))?;
        let parsed = Url::parse(url.as_str())
            .map_err(|e| ScrapeError::invalid(format!("invalid URL in prompt: {}", e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| ScrapeError::invalid("URL in prompt has no host"))?;
        let domain = match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        Ok(normalize_domain(&domain))
    }

    fn fields(lower: &str) -> BTreeSet<String> {
        let fields: BTreeSet<String> = FIELD_KEYWORDS
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|kw| lower.contains(kw)))
            .map(|(field, _)| field.to_string())
            .collect();
        if fields.is_empty() {
            DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect()
        } else {
            fields
        }
    }

    fn entity_type(lower: &str) -> String {
        if let Some((_, plural)) = CATEGORIES.iter().find(|(cat, _)| lower.contains(cat)) {
            return plural.to_string();
        }
        WORD_AFTER_COUNT
            .captures(lower)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .filter(|word| !FILLER_WORDS.contains(word))
            .unwrap_or("products")
            .to_string()
    }
}

impl PromptInterpreter for KeywordPromptInterpreter {
    fn interpret(&self, prompt: &str, requester: UserId) -> Result<ScrapeRequest, ScrapeError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ScrapeError::invalid("prompt cannot be empty"));
        }
        let lower = prompt.to_lowercase();

        let domain = Self::domain(prompt, &lower)?;
        Ok(ScrapeRequest::new(
            domain,
            Self::entity_type(&lower),
            Self::fields(&lower),
            Self::item_limit(prompt),
            requester,
        ))
    }
}
