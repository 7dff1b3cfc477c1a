//! Article ranking, search and CRUD handlers.

use crate::api::{AppState, Privileged};
use crate::error::ApiError;
use crate::models::{Article, ArticleUpdate, ScrapedRecord};
use crate::normalize::normalize_record;
use crate::utils::{compact_date, parse_compact_date};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

const MAX_SEARCH_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub publish_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ArticleList {
    pub articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
pub struct ArticleRequest {
    pub title: String,
    pub image: String,
    pub journal: String,
    pub url: String,
    pub view: i64,
    /// `YYYY-MM-DD` or `YYYYMMDD`.
    pub publish_date: String,
}

fn parse_request_date(text: &str) -> Result<NaiveDate, ApiError> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_compact_date(text))
        .ok_or_else(|| ApiError::BadRequest(format!("invalid publish_date `{text}`")))
}

pub async fn rank(
    State(state): State<AppState>,
    Query(query): Query<DateQuery>,
) -> Result<Json<ArticleList>, ApiError> {
    let date = query.publish_date.unwrap_or_else(|| state.default_date());
    let articles = state.store.rank_by_date(date, state.rank_limit).await?;
    Ok(Json(ArticleList { articles }))
}

pub async fn rank_by_journal(
    State(state): State<AppState>,
    Path(journal): Path<String>,
    Query(query): Query<DateQuery>,
) -> Result<Json<ArticleList>, ApiError> {
    let date = query.publish_date.unwrap_or_else(|| state.default_date());
    let articles = state
        .store
        .rank_by_date_and_journal(date, &journal, state.rank_limit)
        .await?;
    Ok(Json(ArticleList { articles }))
}

pub async fn top_per_journal(
    State(state): State<AppState>,
    Query(query): Query<DateQuery>,
) -> Result<Json<ArticleList>, ApiError> {
    let date = query.publish_date.unwrap_or_else(|| state.default_date());
    let articles = state.store.top_per_journal(date).await?;
    Ok(Json(ArticleList { articles }))
}

pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ArticleList>, ApiError> {
    let keyword = query.q.trim();
    if keyword.is_empty() {
        return Err(ApiError::BadRequest("search keyword must not be empty".into()));
    }
    let limit = query
        .limit
        .unwrap_or(state.rank_limit)
        .clamp(1, MAX_SEARCH_LIMIT);
    let articles = state.store.search(keyword, limit).await?;
    Ok(Json(ArticleList { articles }))
}

pub async fn get_article(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Article>, ApiError> {
    state
        .store
        .get(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Article Not Found"))
}

/// Create one article. Unlike the bulk pipeline path this rejects an exact
/// title + journal + date duplicate.
pub async fn create_article(
    State(state): State<AppState>,
    Privileged(subject): Privileged,
    Json(request): Json<ArticleRequest>,
) -> Result<(StatusCode, Json<Article>), ApiError> {
    let date = parse_request_date(&request.publish_date)?;
    let record = ScrapedRecord {
        title: request.title,
        image: request.image,
        journal: request.journal,
        url: request.url,
        view: request.view,
        publish_date: compact_date(date),
    };
    let article = normalize_record(0, &record).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if state
        .store
        .exists(&article.title, &article.journal, article.publish_date)
        .await?
    {
        return Err(ApiError::Conflict("Article Already Exists"));
    }
    let created = state.store.insert(&article).await?;
    info!(id = created.id, by = %subject.username, "Article created");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_article(
    State(state): State<AppState>,
    Privileged(subject): Privileged,
    Path(id): Path<i64>,
    Json(update): Json<ArticleUpdate>,
) -> Result<Json<Article>, ApiError> {
    if update.is_empty() {
        return Err(ApiError::BadRequest("nothing to update: give image or url".into()));
    }
    let updated = state
        .store
        .update(id, &update)
        .await?
        .ok_or(ApiError::NotFound("Article Not Found"))?;
    info!(id, by = %subject.username, "Article updated");
    Ok(Json(updated))
}

pub async fn delete_article(
    State(state): State<AppState>,
    Privileged(subject): Privileged,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if !state.store.delete(id).await? {
        return Err(ApiError::NotFound("Article Not Found"));
    }
    info!(id, by = %subject.username, "Article deleted");
    Ok(StatusCode::NO_CONTENT)
}
