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
use uuid::Uuid;

/// 抓取任务已受理的响应
#[derive(Debug, Deserialize, Serialize)]
pub struct ScrapeAcceptedDto {
    /// 请求处理是否成功
    pub success: bool,
    /// 任务的唯一标识符
    pub id: Uuid,
    /// 查询任务状态的地址
    pub status_url: String,
}

impl ScrapeAcceptedDto {
    pub fn new(id: Uuid) -> Self {
        Self {
            success: true,
            id,
            status_url: format!("/v1/scrape/{}", id),
        }
    }
}

/// 取消请求的响应
#[derive(Debug, Deserialize, Serialize)]
pub struct CancelResponseDto {
    pub success: bool,
    pub id: Uuid,
    /// 任务仍在运行并已发出取消信号
    pub cancelled: bool,
}
