// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// 抓取记录
///
/// 站点适配器从页面内容中提取的一行数据。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// 字段名到值的映射
    pub fields: BTreeMap<String, Value>,
    /// 来源页面
    pub source_url: String,
    /// 提取时间
    pub extracted_at: DateTime<Utc>,
}

impl Record {
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            fields: BTreeMap::new(),
            source_url: source_url.into(),
            extracted_at: Utc::now(),
        }
    }

    /// 设置字段，空字符串视为缺失
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let value = match value.into() {
            Value::String(s) if s.trim().is_empty() => Value::Null,
            Value::String(s) => Value::String(s.trim().to_string()),
            other => other,
        };
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// 是否至少有一个非空字段
    pub fn has_data(&self) -> bool {
        self.fields.values().any(|v| !v.is_null())
    }

    /// 投影到请求的字段集合
    ///
    /// 结果中每条记录的字段集合完全一致：缺失字段补 `null`，多余字段丢弃。
    pub fn project(mut self, fields: &BTreeSet<String>) -> Self {
        let projected = fields
            .iter()
            .map(|name| {
                let value = self.fields.remove(name).unwrap_or(Value::Null);
                (name.clone(), value)
            })
            .collect();
        self.fields = projected;
        self
    }
}
