//! Error types for every layer of the service.
//!
//! Scrape failures are scoped to a single section and never abort a run.
//! Validation and storage failures end a pipeline run. API errors map onto
//! HTTP status codes with a JSON `{"message": ...}` body.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Failure while fetching or parsing one section's ranking page.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected status {status} from {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },
    #[error("unexpected page shape: {0}")]
    UnexpectedShape(String),
    #[error("invalid selector `{selector}`: {reason}")]
    Selector { selector: String, reason: String },
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

/// A scraped record that could not be turned into a [`crate::models::NormalizedArticle`].
#[derive(Debug, Error, PartialEq, Eq)]
#[error("record {index} ({journal}): invalid `{field}`: {reason}")]
pub struct ValidationError {
    pub index: usize,
    pub journal: String,
    pub field: &'static str,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("storage failed: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("task queue closed")]
    QueueClosed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown time zone `{0}`")]
    TimeZone(String),
    #[error("schedule {hour:02}:{minute:02} is not a valid time of day")]
    Schedule { hour: u32, minute: u32 },
    #[error("could not read selectors file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse selectors file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Scrape(#[from] ScrapeError),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not Authorized")]
    Unauthorized,
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(&'static str),
    #[error("{0}")]
    BadRequest(String),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("password hashing error: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Storage(_) | ApiError::Hash(_) | ApiError::Token(_) | ApiError::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "Internal Server Error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorBody { message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::NotFound("Article Not Found").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Conflict("dup").status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::BadRequest("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_server_error_body_hides_detail() {
        let response = ApiError::Storage(sqlx::Error::RowNotFound).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["message"], "Internal Server Error");
    }

    #[tokio::test]
    async fn test_client_error_body_keeps_message() {
        let response = ApiError::NotFound("Article Not Found").into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["message"], "Article Not Found");
    }

    #[test]
    fn test_validation_error_message() {
        let err = ValidationError {
            index: 3,
            journal: "연합뉴스".into(),
            field: "publish_date",
            reason: "not a YYYYMMDD date".into(),
        };
        assert_eq!(
            err.to_string(),
            "record 3 (연합뉴스): invalid `publish_date`: not a YYYYMMDD date"
        );
    }
}
