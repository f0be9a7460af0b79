//! Request extractors.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, header};
use tracing::debug;

use super::ApiState;
use super::error::ApiError;
use crate::auth::TokenError;
use crate::store::UserId;

/// The authenticated caller, resolved from an `Authorization: Bearer` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

#[derive(Debug, PartialEq, Eq)]
enum Bearer<'a> {
    Missing,
    Malformed,
    Token(&'a str),
}

fn bearer_token(headers: &HeaderMap) -> Bearer<'_> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Bearer::Missing;
    };
    let Ok(value) = value.to_str() else {
        return Bearer::Malformed;
    };
    match value.strip_prefix("Bearer ").map(str::trim) {
        Some(token) if !token.is_empty() => Bearer::Token(token),
        _ => Bearer::Malformed,
    }
}

impl FromRequestParts<ApiState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let token = match bearer_token(&parts.headers) {
            Bearer::Token(token) => token,
            Bearer::Missing => return Err(ApiError::missing_token()),
            Bearer::Malformed => return Err(ApiError::invalid_token()),
        };

        match state.tokens.verify(token) {
            Ok(user_id) => Ok(Self(user_id)),
            Err(TokenError::Expired) => Err(ApiError::token_expired()),
            Err(TokenError::Invalid(reason)) => {
                debug!("rejected access token: {reason}");
                Err(ApiError::invalid_token())
            }
        }
    }
}
