//! Runtime configuration built once at startup.
//!
//! The CLI layer ([`crate::cli`]) collects flags and environment variables;
//! this module turns them into plain structs that are handed explicitly to
//! the scraper, the scheduler and the API. Nothing here is read as ambient
//! global state.

use crate::error::ConfigError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

pub const DEFAULT_FALLBACK_IMAGE: &str = "https://user-images.githubusercontent.com/81741466/263754639-170bee96-6728-40c6-b60d-9d45d0db4e99.jpeg";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/116.0.0.0 Safari/537.36";

pub const DEFAULT_SOURCE_BASE_URL: &str = "https://media.naver.com";

/// CSS selectors for the ranking page.
///
/// The markup belongs to a third party, so the selectors are data rather
/// than code. Defaults match the current page; a YAML file can override any
/// subset of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSelectors {
    /// Element whose text is the journal display name.
    pub heading: String,
    /// Ranking list containers.
    pub ranking_list: String,
    /// Article anchors inside a ranking list.
    pub article: String,
    pub title: String,
    /// Wrapper that is present only when the article has a thumbnail.
    pub image_container: String,
    pub image: String,
    pub view: String,
}

impl Default for PageSelectors {
    fn default() -> Self {
        Self {
            heading: "a.press_hd_name_link".to_string(),
            ranking_list: "ul.press_ranking_list".to_string(),
            article: "a._es_pc_link".to_string(),
            title: "strong.list_title".to_string(),
            image_container: "div.list_img".to_string(),
            image: "img".to_string(),
            view: "span.list_view".to_string(),
        }
    }
}

impl PageSelectors {
    /// Load selectors from a YAML file; missing keys keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }
}

/// Bounds of the random pause between two consecutive section fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        let (min_ms, max_ms) = if min_ms <= max_ms {
            (min_ms, max_ms)
        } else {
            (max_ms, min_ms)
        };
        Self {
            min: Duration::from_millis(min_ms),
            max: Duration::from_millis(max_ms),
        }
    }

    pub fn none() -> Self {
        Self::from_millis(0, 0)
    }
}

impl Default for DelayRange {
    fn default() -> Self {
        Self::from_millis(10_000, 13_000)
    }
}

/// Everything the fetcher and parser need.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Section identifiers, fetched in this order.
    pub sections: Vec<String>,
    pub fallback_image_url: String,
    /// How many days before "today" the requested ranking date is.
    pub day_offset: i64,
    pub time_zone: Tz,
    pub base_url: Url,
    pub user_agent: String,
    pub delay: DelayRange,
    pub request_timeout: Duration,
    pub selectors: PageSelectors,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            sections: Vec::new(),
            fallback_image_url: DEFAULT_FALLBACK_IMAGE.to_string(),
            day_offset: 1,
            time_zone: chrono_tz::Asia::Seoul,
            base_url: Url::parse(DEFAULT_SOURCE_BASE_URL).expect("default base url is valid"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            delay: DelayRange::default(),
            request_timeout: Duration::from_secs(30),
            selectors: PageSelectors::default(),
        }
    }
}

/// When the daily pipeline fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub hour: u32,
    pub minute: u32,
    pub time_zone: Tz,
}

impl ScheduleConfig {
    pub fn new(hour: u32, minute: u32, time_zone: Tz) -> Result<Self, ConfigError> {
        if hour > 23 || minute > 59 {
            return Err(ConfigError::Schedule { hour, minute });
        }
        Ok(Self {
            hour,
            minute,
            time_zone,
        })
    }

    /// Six-field cron expression (`sec min hour dom month dow`).
    pub fn cron_expression(&self) -> String {
        format!("0 {} {} * * *", self.minute, self.hour)
    }
}

/// Token signing and password hashing parameters.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub bcrypt_cost: u32,
}

pub fn parse_time_zone(name: &str) -> Result<Tz, ConfigError> {
    name.parse::<Tz>()
        .map_err(|_| ConfigError::TimeZone(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_range_orders_bounds() {
        let delay = DelayRange::from_millis(13_000, 10_000);
        assert_eq!(delay.min, Duration::from_millis(10_000));
        assert_eq!(delay.max, Duration::from_millis(13_000));
    }

    #[test]
    fn test_schedule_cron_expression() {
        let schedule = ScheduleConfig::new(23, 0, chrono_tz::Asia::Seoul).unwrap();
        assert_eq!(schedule.cron_expression(), "0 0 23 * * *");
    }

    #[test]
    fn test_schedule_rejects_out_of_range() {
        assert!(ScheduleConfig::new(24, 0, chrono_tz::UTC).is_err());
        assert!(ScheduleConfig::new(0, 60, chrono_tz::UTC).is_err());
    }

    #[test]
    fn test_parse_time_zone() {
        assert_eq!(parse_time_zone("Asia/Seoul").unwrap(), chrono_tz::Asia::Seoul);
        assert!(parse_time_zone("Mars/Olympus").is_err());
    }

    #[test]
    fn test_selectors_yaml_override_keeps_defaults() {
        let yaml = "view: span.view_count\n";
        let selectors: PageSelectors = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(selectors.view, "span.view_count");
        assert_eq!(selectors.heading, PageSelectors::default().heading);
    }
}
