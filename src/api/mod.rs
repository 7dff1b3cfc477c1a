//! HTTP API.
//!
//! Ranking and search endpoints are public. Article mutations need a bearer
//! token whose role is privileged. Signup always creates a normal user.
//!
//! | Method | Path | Auth |
//! |--------|------|------|
//! | GET | `/` | - |
//! | GET | `/articles/rank` | - |
//! | GET | `/articles/rank/:journal` | - |
//! | GET | `/articles/top` | - |
//! | GET | `/articles/search` | - |
//! | GET | `/articles/:id` | - |
//! | POST | `/articles` | privileged |
//! | PATCH | `/articles/:id` | privileged |
//! | DELETE | `/articles/:id` | privileged |
//! | POST | `/users/sign-up` | - |
//! | POST | `/users/log-in` | - |

pub mod articles;
pub mod users;

use crate::auth::{TokenSubject, verify_token};
use crate::config::AuthConfig;
use crate::error::ApiError;
use crate::storage::ArticleStore;
use crate::utils::{days_back, today_in};
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub store: ArticleStore,
    pub auth: Arc<AuthConfig>,
    /// Cap on ranking results.
    pub rank_limit: i64,
    pub day_offset: i64,
    pub time_zone: Tz,
}

impl AppState {
    /// Date used when a ranking request names none: the latest scraped day.
    pub fn default_date(&self) -> NaiveDate {
        days_back(today_in(self.time_zone), self.day_offset)
    }
}

/// Token from an `Authorization` value; the scheme name is case-insensitive.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Any caller holding a valid bearer token.
#[derive(Debug, Clone)]
pub struct Authenticated(pub TokenSubject);

/// A caller whose token carries a privileged role.
#[derive(Debug, Clone)]
pub struct Privileged(pub TokenSubject);

#[axum::async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or(ApiError::Unauthorized)?;
        Ok(Authenticated(verify_token(&state.auth, token)?))
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Privileged {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Authenticated(subject) = Authenticated::from_request_parts(parts, state).await?;
        if !subject.is_privileged() {
            return Err(ApiError::Unauthorized);
        }
        Ok(Privileged(subject))
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({ "message": "hello world" }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/articles", post(articles::create_article))
        .route("/articles/rank", get(articles::rank))
        .route("/articles/rank/:journal", get(articles::rank_by_journal))
        .route("/articles/top", get(articles::top_per_journal))
        .route("/articles/search", get(articles::search))
        .route(
            "/articles/:id",
            get(articles::get_article)
                .patch(articles::update_article)
                .delete(articles::delete_article),
        )
        .route("/users/sign-up", post(users::sign_up))
        .route("/users/log-in", post(users::log_in))
        .with_state(state)
}

/// Serve the API until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "news_rank API listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
