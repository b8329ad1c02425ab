//! Caller identity extractors.
//!
//! Sessions are handled upstream; the gateway forwards the signed-in user as
//! `X-User-Id` and any sharing token the visitor presented as
//! `X-Access-Token`.

use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::server::AppState;
use crate::server::response::ApiError;

pub const USER_HEADER: &str = "x-user-id";
pub const TOKEN_HEADER: &str = "x-access-token";

/// Extractor that requires a signed-in user
pub struct RequireUser {
    pub user_id: String,
}

/// Extractor for reads that anonymous token holders may also perform
pub struct Viewer {
    pub user_id: Option<String>,
    pub token: Option<String>,
}

impl Viewer {
    pub fn user(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

fn header(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl FromRequestParts<Arc<AppState>> for RequireUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user_id =
            header(parts, USER_HEADER).ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
        Ok(RequireUser { user_id })
    }
}

impl FromRequestParts<Arc<AppState>> for Viewer {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(Viewer {
            user_id: header(parts, USER_HEADER),
            token: header(parts, TOKEN_HEADER),
        })
    }
}
