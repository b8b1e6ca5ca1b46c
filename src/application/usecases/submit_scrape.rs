// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::application::dto::scrape_request::ScrapeRequestDto;
use crate::domain::models::job::JobResult;
use crate::domain::models::scrape_request::{UserId, UserTier};
use crate::domain::services::prompt_interpreter::PromptInterpreter;
use crate::utils::errors::ScrapeError;
use crate::workers::manager::{JobManager, JobTicket};

/// 同步等待的默认上限
const DEFAULT_SYNC_WAIT: Duration = Duration::from_secs(120);

/// 提交结果
#[derive(Debug)]
pub enum SubmitOutcome {
    /// 已受理，结果稍后查询
    Accepted(uuid::Uuid),
    /// 同步等待到了终止结果
    Finished(Box<JobResult>),
}

// === Section: Use Case Definition ===

pub struct SubmitScrapeUseCase {
    manager: Arc<JobManager>,
    interpreter: Arc<dyn PromptInterpreter>,
}

// === Section: Implementation ===

impl SubmitScrapeUseCase {
    pub fn new(manager: Arc<JobManager>, interpreter: Arc<dyn PromptInterpreter>) -> Self {
        Self {
            manager,
            interpreter,
        }
    }

    pub fn manager(&self) -> &Arc<JobManager> {
        &self.manager
    }

    /// 解析并提交抓取请求
    ///
    /// # 参数
    ///
    /// * `dto` - 客户端请求
    /// * `user` - 请求者
    /// * `tier` - 请求者等级
    ///
    /// # 返回值
    ///
    /// * `Ok(SubmitOutcome)` - 已受理或已得到终止结果
    /// * `Err(ScrapeError)` - 请求无法解析或队列已满
    pub async fn execute(
        &self,
        dto: ScrapeRequestDto,
        user: UserId,
        tier: UserTier,
    ) -> Result<SubmitOutcome, ScrapeError> {
        let sync_wait = dto.sync_wait;
        let wait = dto
            .wait_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SYNC_WAIT);

        let request = dto.into_request(user, self.interpreter.as_ref())?;
        debug!(
            "Submitting {} x{} on {}",
            request.entity_type, request.item_limit, request.domain
        );
        let JobTicket { job_id, result } = self.manager.submit(request, tier)?;

        if !sync_wait {
            return Ok(SubmitOutcome::Accepted(job_id));
        }
        match tokio::time::timeout(wait, result).await {
            Ok(Ok(result)) => Ok(SubmitOutcome::Finished(Box::new(result))),
            Ok(Err(_)) => {
                warn!("Job {} ended without delivering a result", job_id);
                Ok(SubmitOutcome::Accepted(job_id))
            }
            Err(_) => {
                debug!("Job {} still running after {:?}", job_id, wait);
                Ok(SubmitOutcome::Accepted(job_id))
            }
        }
    }
}
