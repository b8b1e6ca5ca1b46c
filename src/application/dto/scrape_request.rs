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

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::models::scrape_request::{ScrapeRequest, UserId};
use crate::domain::services::prompt_interpreter::{PromptInterpreter, DEFAULT_ITEM_LIMIT};
use crate::utils::errors::ScrapeError;

/// 抓取请求数据传输对象
///
/// 客户端可以提交自由文本提示词，也可以直接提交结构化字段。
/// 两者同时出现时以提示词为准，`item_limit` 仍可覆盖解析结果。
#[derive(Debug, Default, Deserialize, Serialize, Validate)]
pub struct ScrapeRequestDto {
    /// 自由文本提示词
    #[validate(length(min = 1, max = 2000))]
    pub prompt: Option<String>,
    /// 目标域名
    #[validate(length(min = 1, max = 253))]
    pub domain: Option<String>,
    /// 实体类型，如 "mobiles"
    #[validate(length(min = 1, max = 100))]
    pub entity_type: Option<String>,
    /// 需要的字段
    pub fields: Option<Vec<String>>,
    /// 最大记录数
    pub item_limit: Option<u32>,
    /// 是否同步等待结果
    #[serde(default)]
    pub sync_wait: bool,
    /// 同步等待的最长时间（秒）
    #[validate(range(min = 1, max = 600))]
    pub wait_timeout_secs: Option<u64>,
}

impl ScrapeRequestDto {
    /// 转换为领域请求
    ///
    /// # 参数
    ///
    /// * `requester` - 请求者
    /// * `interpreter` - 提示词解析器
    ///
    /// # 返回值
    ///
    /// * `Err(ScrapeError::InvalidRequest)` - 既没有提示词也没有完整的结构化字段
    pub fn into_request(
        self,
        requester: UserId,
        interpreter: &dyn PromptInterpreter,
    ) -> Result<ScrapeRequest, ScrapeError> {
        let mut request = match self.prompt {
            Some(prompt) => interpreter.interpret(&prompt, requester)?,
            None => {
                let domain = self
                    .domain
                    .ok_or_else(|| ScrapeError::invalid("either prompt or domain is required"))?;
                let entity_type = self
                    .entity_type
                    .ok_or_else(|| ScrapeError::invalid("entity_type is required"))?;
                ScrapeRequest::new(
                    domain,
                    entity_type,
                    self.fields.unwrap_or_default(),
                    DEFAULT_ITEM_LIMIT,
                    requester,
                )
            }
        };
        if let Some(limit) = self.item_limit {
            request.item_limit = limit;
        }
        Ok(request)
    }
}
