// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::domain::models::scrape_request::{UserId, UserTier};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_TIER_HEADER: &str = "x-user-tier";

/// 由外部身份服务注入的请求者身份
#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub user: UserId,
    pub tier: UserTier,
}

fn reject(message: &str) -> Response {
    let body = Json(json!({ "success": false, "error": message }));
    (StatusCode::BAD_REQUEST, body).into_response()
}

impl<S> FromRequestParts<S> for UserIdentity
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| reject("Missing or invalid X-User-Id header"))?;

        let tier = match parts.headers.get(USER_TIER_HEADER) {
            None => UserTier::Standard,
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|raw| raw.parse::<UserTier>().ok())
                .ok_or_else(|| reject("Invalid X-User-Tier header"))?,
        };

        Ok(UserIdentity {
            user: UserId::new(user),
            tier,
        })
    }
}
