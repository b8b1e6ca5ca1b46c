// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::utils::errors::{RepositoryError, ScrapeError};

/// 抓取错误对应的 HTTP 状态码
pub fn status_for(error: &ScrapeError) -> StatusCode {
    match error {
        ScrapeError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
        ScrapeError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        ScrapeError::RobotsDisallowed { .. } => StatusCode::FORBIDDEN,
        ScrapeError::Unsupported { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ScrapeError::FetchUnavailable { .. } | ScrapeError::QueueFull => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ScrapeError::PageFetchFailed { .. } => StatusCode::BAD_GATEWAY,
        ScrapeError::AdapterFault { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        ScrapeError::Cancelled => StatusCode::CONFLICT,
    }
}

/// 为限流错误附加 `Retry-After` 头
pub fn with_retry_after(mut response: Response, error: &ScrapeError) -> Response {
    if let Some(retry_after) = error.retry_after() {
        if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}

/// 应用错误类型
///
/// 封装所有可能的应用层错误，提供统一的错误处理接口
#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error_message = self.0.to_string();

        if let Some(scrape_error) = self.0.downcast_ref::<ScrapeError>() {
            let body = Json(json!({
                "success": false,
                "error": error_message,
                "reason": scrape_error,
            }));
            let response = (status_for(scrape_error), body).into_response();
            return with_retry_after(response, scrape_error);
        }

        let status = if self.0.downcast_ref::<validator::ValidationErrors>().is_some() {
            StatusCode::BAD_REQUEST
        } else {
            match self.0.downcast_ref::<RepositoryError>() {
                Some(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        };

        let body = Json(json!({ "success": false, "error": error_message }));
        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
