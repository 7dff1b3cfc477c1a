//! Command-line interface definitions for the news ranking service.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Every option can also be supplied through an environment variable, which
//! is how the service is normally configured in deployment.

use crate::config::{
    AuthConfig, DEFAULT_FALLBACK_IMAGE, DEFAULT_SOURCE_BASE_URL, DEFAULT_USER_AGENT, DelayRange,
    PageSelectors, ScheduleConfig, ScrapeConfig, parse_time_zone,
};
use crate::error::{ConfigError, ScrapeError};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Command-line arguments for the news ranking service.
///
/// # Examples
///
/// ```sh
/// # Serve the API and run the daily scrape at 23:00 Asia/Seoul
/// news_rank --sections 001,020,023 serve --jwt-secret change-me
///
/// # Scrape and store yesterday's rankings right now
/// news_rank --sections 001,020 scrape
///
/// # Provision a privileged account
/// news_rank add-user --username admin --password s3cret --role 1
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// SQLite connection string
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://news.db", global = true)]
    pub database_url: String,

    #[command(flatten)]
    pub scrape: ScrapeArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug)]
pub struct ScrapeArgs {
    /// Comma-separated section identifiers, scraped in this order
    #[arg(long, env = "SCRAP_LIST", value_delimiter = ',', global = true)]
    pub sections: Vec<String>,

    /// Scrape the ranking of this many days before today
    #[arg(long, env = "DAYS", default_value_t = 1, global = true)]
    pub days: i64,

    /// IANA time zone for "today" and for the daily schedule
    #[arg(long, env = "TIMEZONE", default_value = "Asia/Seoul", global = true)]
    pub timezone: String,

    /// Base URL of the ranking pages
    #[arg(long, env = "SOURCE_BASE_URL", default_value = DEFAULT_SOURCE_BASE_URL, global = true)]
    pub source_base_url: String,

    /// Image used for articles without a thumbnail
    #[arg(long, env = "FALLBACK_IMAGE_URL", default_value = DEFAULT_FALLBACK_IMAGE, global = true)]
    pub fallback_image_url: String,

    /// User-Agent sent with every ranking request
    #[arg(long, env = "SCRAPE_USER_AGENT", default_value = DEFAULT_USER_AGENT, global = true)]
    pub user_agent: String,

    /// Lower bound of the pause between section requests, in milliseconds
    #[arg(long, default_value_t = 10_000, global = true)]
    pub delay_min_ms: u64,

    /// Upper bound of the pause between section requests, in milliseconds
    #[arg(long, default_value_t = 13_000, global = true)]
    pub delay_max_ms: u64,

    /// Per-request timeout for ranking pages, in seconds
    #[arg(long, default_value_t = 30, global = true)]
    pub request_timeout_secs: u64,

    /// Optional YAML file overriding the page selectors
    #[arg(long, env = "SELECTORS_FILE", global = true)]
    pub selectors: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API, the pipeline worker and the daily scheduler
    Serve(ServeArgs),
    /// Run the scrape → persist pipeline once, now
    Scrape,
    /// Create a user with an explicit role
    AddUser(AddUserArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind the HTTP server to (host:port)
    #[arg(long, env = "BIND", default_value = "127.0.0.1:8000")]
    pub bind: String,

    /// Hour of the daily scrape
    #[arg(long, env = "HOUR", default_value_t = 23)]
    pub hour: u32,

    /// Minute of the daily scrape
    #[arg(long, env = "MINUTE", default_value_t = 0)]
    pub minute: u32,

    /// Secret used to sign bearer tokens
    #[arg(long, env = "JWT_SECRET_KEY", hide_env_values = true)]
    pub jwt_secret: String,

    /// Days until an issued token expires
    #[arg(long, default_value_t = 7)]
    pub token_ttl_days: i64,

    /// Bcrypt work factor for new passwords
    #[arg(long, default_value_t = bcrypt::DEFAULT_COST)]
    pub bcrypt_cost: u32,

    /// Maximum number of articles in a ranking response
    #[arg(long, default_value_t = 10)]
    pub rank_limit: i64,
}

#[derive(Args, Debug)]
pub struct AddUserArgs {
    #[arg(long)]
    pub username: String,

    #[arg(long, env = "NEW_USER_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// 0 for a normal account, anything else for privileged
    #[arg(long, default_value_t = 0)]
    pub role: i64,

    #[arg(long, default_value_t = bcrypt::DEFAULT_COST)]
    pub bcrypt_cost: u32,
}

impl ScrapeArgs {
    pub fn to_config(&self) -> Result<ScrapeConfig, ConfigError> {
        let selectors = match &self.selectors {
            Some(path) => PageSelectors::from_yaml_file(path)?,
            None => PageSelectors::default(),
        };
        let base_url = Url::parse(&self.source_base_url).map_err(ScrapeError::from)?;
        Ok(ScrapeConfig {
            sections: self
                .sections
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            fallback_image_url: self.fallback_image_url.clone(),
            day_offset: self.days,
            time_zone: parse_time_zone(&self.timezone)?,
            base_url,
            user_agent: self.user_agent.clone(),
            delay: DelayRange::from_millis(self.delay_min_ms, self.delay_max_ms),
            request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
            selectors,
        })
    }
}

impl ServeArgs {
    pub fn schedule(&self, scrape: &ScrapeConfig) -> Result<ScheduleConfig, ConfigError> {
        ScheduleConfig::new(self.hour, self.minute, scrape.time_zone)
    }

    pub fn auth(&self) -> AuthConfig {
        AuthConfig {
            jwt_secret: self.jwt_secret.clone(),
            token_ttl: chrono::Duration::days(self.token_ttl_days),
            bcrypt_cost: self.bcrypt_cost,
        }
    }
}
