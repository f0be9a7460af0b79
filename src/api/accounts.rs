//! Signup and login routes.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use super::ApiState;
use super::error::ApiError;
use crate::auth::{hash_password, verify_password};
use crate::store::{StoreError, User, UserId};

#[derive(Debug, Deserialize)]
pub(super) struct SignupBody {
    email: Option<String>,
    password: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct LoginBody {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Serialize)]
struct UserView<'a> {
    id: UserId,
    email: &'a str,
    name: Option<&'a str>,
}

impl<'a> From<&'a User> for UserView<'a> {
    fn from(user: &'a User) -> Self {
        Self {
            id: user.id,
            email: &user.email,
            name: user.name.as_deref(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

pub(super) async fn signup(
    State(state): State<ApiState>,
    body: Result<Json<SignupBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(body) = body.map_err(|_| ApiError::bad_request("Email and password required"))?;
    let (Some(email), Some(password)) = (non_blank(body.email), body.password) else {
        return Err(ApiError::bad_request("Email and password required"));
    };
    if password.is_empty() {
        return Err(ApiError::bad_request("Email and password required"));
    }
    let name = non_blank(body.name);

    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(ApiError::internal)??;

    let created = state
        .on_store(move |store| store.create_user(&email, name.as_deref(), &hash))
        .await?;
    match created {
        Ok(user) => {
            info!(user_id = user.id, "user registered");
            Ok((
                StatusCode::CREATED,
                Json(json!({ "message": "User created successfully" })),
            ))
        }
        Err(StoreError::Conflict(_)) => Err(ApiError::bad_request("Email already exists")),
        Err(e) => Err(e.into()),
    }
}

pub(super) async fn login(
    State(state): State<ApiState>,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body.map_err(|_| ApiError::invalid_credentials())?;
    let (Some(email), Some(password)) = (non_blank(body.email), body.password) else {
        return Err(ApiError::invalid_credentials());
    };

    let found = state
        .on_store(move |store| store.find_credentials_by_email(&email))
        .await??;
    let Some(credentials) = found else {
        return Err(ApiError::invalid_credentials());
    };
    let stored_hash = credentials.password_hash.clone();
    let matches = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(ApiError::internal)?;
    if !matches {
        return Err(ApiError::invalid_credentials());
    }

    let user = credentials.user;
    let token = state.tokens.issue(user.id)?;
    Ok(Json(json!({ "token": token, "user": UserView::from(&user) })))
}
