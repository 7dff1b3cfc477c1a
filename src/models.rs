//! Data models for scraped rankings, stored articles and users.
//!
//! This module defines the data structures that flow through the service:
//! - [`ScrapedRecord`] / [`SectionRanking`]: raw parser output for one section
//! - [`NormalizedArticle`]: validated record handed across the pipeline boundary
//! - [`Article`]: a persisted row, as returned by the query layer and the API
//! - [`User`]: an account that can log in and receive a bearer token

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One ranked article as scraped from a section page.
///
/// `view` has already been reduced to the digits of the page's view-count
/// text. `publish_date` is the `YYYYMMDD` date the page was requested for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedRecord {
    pub title: String,
    pub image: String,
    pub journal: String,
    pub url: String,
    pub view: i64,
    pub publish_date: String,
}

/// Everything parsed out of one section's ranking page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionRanking {
    /// The section identifier used in the request URL (e.g. `001`).
    pub section_id: String,
    /// The display name read from the page heading.
    pub journal: String,
    /// The `YYYYMMDD` date the page was requested for.
    pub publish_date: String,
    pub records: Vec<ScrapedRecord>,
}

/// A validated article ready to be persisted.
///
/// This is the unit passed from the scrape stage to the persist stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedArticle {
    pub title: String,
    pub image: String,
    pub journal: String,
    pub url: String,
    pub view: i64,
    pub publish_date: NaiveDate,
}

/// A persisted article row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub image: String,
    pub journal: String,
    pub url: String,
    pub view: i64,
    pub publish_date: NaiveDate,
}

/// Fields that may change on an existing article.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ArticleUpdate {
    pub image: Option<String>,
    pub url: Option<String>,
}

impl ArticleUpdate {
    pub fn is_empty(&self) -> bool {
        self.image.is_none() && self.url.is_none()
    }
}

/// Role value for ordinary accounts. Any other value is privileged.
pub const ROLE_NORMAL: i64 = 0;

/// A registered account. `password` holds a bcrypt hash, never plaintext.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub role: i64,
}

impl User {
    pub fn is_privileged(&self) -> bool {
        self.role != ROLE_NORMAL
    }
}
