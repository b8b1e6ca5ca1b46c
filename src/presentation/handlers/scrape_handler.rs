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

use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    application::dto::{
        scrape_request::ScrapeRequestDto,
        scrape_response::{CancelResponseDto, ScrapeAcceptedDto},
    },
    application::usecases::submit_scrape::{SubmitOutcome, SubmitScrapeUseCase},
    domain::models::job::{JobResult, JobState},
    domain::models::scrape_request::UserTier,
    presentation::errors::{status_for, with_retry_after, AppError},
    presentation::extractors::UserIdentity,
    utils::errors::RepositoryError,
    workers::manager::{JobManager, JobStatus},
};

/// 终止结果的响应：Completed 为 200，其余按原因映射状态码
fn result_response(result: JobResult) -> Response {
    let status = match (&result.state, &result.reason) {
        (JobState::Completed, _) => StatusCode::OK,
        (_, Some(reason)) => status_for(reason),
        (_, None) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let reason = result.reason.clone();
    let response = (status, Json(result)).into_response();
    match reason {
        Some(reason) => with_retry_after(response, &reason),
        None => response,
    }
}

/// 只有提交者本人或管理员可以查看和取消任务
fn ensure_visible(
    manager: &JobManager,
    identity: &UserIdentity,
    id: &Uuid,
) -> Result<(), AppError> {
    match manager.owner(id) {
        Some(owner) if owner == identity.user || identity.tier == UserTier::Admin => Ok(()),
        _ => Err(RepositoryError::NotFound.into()),
    }
}

pub async fn create_scrape(
    Extension(use_case): Extension<Arc<SubmitScrapeUseCase>>,
    identity: UserIdentity,
    Json(payload): Json<ScrapeRequestDto>,
) -> Result<Response, AppError> {
    payload.validate()?;

    let outcome = use_case
        .execute(payload, identity.user.clone(), identity.tier)
        .await?;
    match outcome {
        SubmitOutcome::Accepted(id) => {
            info!("Accepted scrape job {} for {}", id, identity.user);
            Ok((StatusCode::ACCEPTED, Json(ScrapeAcceptedDto::new(id))).into_response())
        }
        SubmitOutcome::Finished(result) => Ok(result_response(*result)),
    }
}

pub async fn get_scrape_status(
    Extension(manager): Extension<Arc<JobManager>>,
    identity: UserIdentity,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    ensure_visible(&manager, &identity, &id)?;
    let status = manager.status(&id).ok_or(RepositoryError::NotFound)?;
    Ok((StatusCode::OK, Json(status)).into_response())
}

pub async fn cancel_scrape(
    Extension(manager): Extension<Arc<JobManager>>,
    identity: UserIdentity,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    ensure_visible(&manager, &identity, &id)?;
    let cancelled = manager.cancel(&id);
    let status = if cancelled {
        StatusCode::ACCEPTED
    } else {
        match manager.status(&id) {
            Some(JobStatus::Finished { .. }) => StatusCode::CONFLICT,
            _ => StatusCode::OK,
        }
    };
    let body = CancelResponseDto {
        success: cancelled,
        id,
        cancelled,
    };
    Ok((status, Json(body)).into_response())
}
