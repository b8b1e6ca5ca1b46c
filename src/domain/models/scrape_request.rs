// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::utils::errors::ScrapeError;

/// 用户标识，由外部身份服务提供
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 用户等级，影响限流参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserTier {
    #[default]
    Standard,
    /// 管理员绕过按域名限流，仅受全局限流约束
    Admin,
}

impl fmt::Display for UserTier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UserTier::Standard => write!(f, "standard"),
            UserTier::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for UserTier {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(UserTier::Standard),
            "admin" => Ok(UserTier::Admin),
            _ => Err(()),
        }
    }
}

/// 结构化抓取请求
///
/// 由提示词解析器生成，创建后不可变。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeRequest {
    /// 目标域名（不含协议）
    pub domain: String,
    /// 目标实体类型，同时作为站内搜索关键词
    pub entity_type: String,
    /// 需要输出的字段集合
    pub fields: BTreeSet<String>,
    /// 最多返回的记录数
    pub item_limit: u32,
    /// 请求者
    pub requester: UserId,
}

impl ScrapeRequest {
    /// 创建抓取请求，字段名与域名统一转为小写
    pub fn new<I, S>(
        domain: impl Into<String>,
        entity_type: impl Into<String>,
        fields: I,
        item_limit: u32,
        requester: UserId,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            domain: normalize_domain(&domain.into()),
            entity_type: entity_type.into().trim().to_string(),
            fields: fields
                .into_iter()
                .map(|f| f.as_ref().trim().to_ascii_lowercase())
                .filter(|f| !f.is_empty())
                .collect(),
            item_limit,
            requester,
        }
    }

    /// 校验请求格式
    ///
    /// # 参数
    ///
    /// * `max_item_limit` - 单个任务允许的最大记录数
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 请求合法
    /// * `Err(ScrapeError::InvalidRequest)` - 请求格式错误
    pub fn validate(&self, max_item_limit: u32) -> Result<(), ScrapeError> {
        if self.domain.is_empty() || !self.domain.contains('.') {
            return Err(ScrapeError::invalid(format!(
                "domain '{}' is not a valid host name",
                self.domain
            )));
        }
        if self.fields.is_empty() {
            return Err(ScrapeError::invalid("field list cannot be empty"));
        }
        if self.item_limit == 0 {
            return Err(ScrapeError::invalid("item limit must be positive"));
        }
        if self.item_limit > max_item_limit {
            return Err(ScrapeError::invalid(format!(
                "item limit {} exceeds maximum of {}",
                self.item_limit, max_item_limit
            )));
        }
        if !is_valid_entity_type(&self.entity_type) {
            return Err(ScrapeError::invalid(format!(
                "unsupported entity type '{}'",
                self.entity_type
            )));
        }
        Ok(())
    }
}

/// 统一域名格式：小写、去掉协议、路径、端口前的 `www.`
pub fn normalize_domain(raw: &str) -> String {
    let trimmed = raw.trim().to_ascii_lowercase();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(&trimmed);
    let host = without_scheme.split('/').next().unwrap_or_default();
    host.strip_prefix("www.").unwrap_or(host).to_string()
}

fn is_valid_entity_type(entity_type: &str) -> bool {
    !entity_type.is_empty()
        && entity_type.len() <= 100
        && entity_type
            .chars()
            .all(|c| c.is_alphanumeric() || c == ' ' || c == '-' || c == '_')
}
