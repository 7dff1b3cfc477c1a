//! Signup and login.

use crate::api::AppState;
use crate::auth::{TokenSubject, create_token, hash_password, verify_password};
use crate::error::ApiError;
use crate::models::ROLE_NORMAL;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct UserRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub role: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
}

pub async fn sign_up(
    State(state): State<AppState>,
    Json(request): Json<UserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let username = request.username.trim().to_string();
    if username.is_empty() || request.password.is_empty() {
        return Err(ApiError::BadRequest("username and password are required".into()));
    }
    if state.store.find_user(&username).await?.is_some() {
        return Err(ApiError::Conflict("Username Already Exists"));
    }

    // CPU bound; runs on the blocking pool.
    let cost = state.auth.bcrypt_cost;
    let password = request.password;
    let hashed = tokio::task::spawn_blocking(move || hash_password(&password, cost)).await??;

    let user = state
        .store
        .create_user(&username, &hashed, ROLE_NORMAL)
        .await
        .map_err(|e| match e {
            // A concurrent signup won the UNIQUE index.
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                ApiError::Conflict("Username Already Exists")
            }
            other => ApiError::Storage(other),
        })?;
    info!(user_id = user.id, %username, "User signed up");
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            id: user.id,
            username: user.username,
            role: user.role,
        }),
    ))
}

pub async fn log_in(
    State(state): State<AppState>,
    Json(request): Json<UserRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user = state
        .store
        .find_user(request.username.trim())
        .await?
        .ok_or(ApiError::NotFound("User Not Found"))?;

    let hashed = user.password.clone();
    let password = request.password;
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &hashed)).await??;
    if !verified {
        warn!(username = %user.username, "Login rejected: wrong password");
        return Err(ApiError::Unauthorized);
    }

    let access_token = create_token(
        &state.auth,
        &TokenSubject {
            username: user.username,
            role: user.role,
        },
    )?;
    Ok(Json(TokenResponse { access_token }))
}
