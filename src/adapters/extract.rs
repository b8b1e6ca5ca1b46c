// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::adapters::traits::AdapterError;

static RATING_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("Failed to compile rating regex"));

/// 解析 CSS 选择器
pub fn selector(css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::Selector {
        selector: css.to_string(),
        reason: e.to_string(),
    })
}

/// 文档中匹配的最外层元素
///
/// 嵌套在另一个匹配元素内部的节点被跳过，同一商品卡片只产出一次。
pub fn outermost<'a>(
    document: &'a Html,
    selector: &'a Selector,
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    document.select(selector).filter(move |element| {
        !element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|ancestor| selector.matches(&ancestor))
    })
}

/// 元素内第一个匹配节点的文本（空白折叠）
pub fn text_of(element: &ElementRef, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .map(|node| collapse_whitespace(&node.text().collect::<Vec<_>>().join(" ")))
        .find(|text| !text.is_empty())
}

/// 元素内第一个匹配节点的属性
pub fn attr_of(element: &ElementRef, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .filter_map(|node| node.value().attr(attr))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

pub fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 价格只保留数字、`,` 和 `.`
pub fn clean_price(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == ',').to_string();
    if cleaned.chars().any(|c| c.is_ascii_digit()) {
        Some(cleaned)
    } else {
        None
    }
}

/// 评分取第一个十进制数
pub fn clean_rating(raw: &str) -> Option<String> {
    RATING_NUMBER.find(raw).map(|m| m.as_str().to_string())
}

/// 搜索关键词编码为查询参数
pub fn search_term(entity_type: &str) -> String {
    collapse_whitespace(entity_type)
}
