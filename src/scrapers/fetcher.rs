//! Ranking page fetcher.
//!
//! Issues one GET per section with a fixed User-Agent. Sections are fetched
//! strictly one after another with a random pause in between; a failed
//! section is logged and skipped.

use crate::config::{DelayRange, ScrapeConfig};
use crate::error::ScrapeError;
use futures::stream::{self, StreamExt};
use rand::{Rng, rng};
use reqwest::Client;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Raw HTML of one section's ranking page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub section_id: String,
    pub url: Url,
    /// `YYYYMMDD` date embedded in the request URL.
    pub publish_date: String,
    pub html: String,
}

#[derive(Debug, Clone)]
pub struct RankingFetcher {
    client: Client,
    base_url: Url,
    delay: DelayRange,
}

impl RankingFetcher {
    pub fn new(config: &ScrapeConfig) -> Result<Self, ScrapeError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            delay: config.delay,
        })
    }

    /// `<base>/press/<section>/ranking?type=popular&date=<YYYYMMDD>`
    pub fn ranking_url(&self, section_id: &str, publish_date: &str) -> Result<Url, ScrapeError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ScrapeError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(["press", section_id, "ranking"]);
        url.query_pairs_mut()
            .append_pair("type", "popular")
            .append_pair("date", publish_date);
        Ok(url)
    }

    /// Fetch a single section page. Any non-success status is an error.
    #[instrument(level = "info", skip(self), fields(%section_id))]
    pub async fn fetch_section(
        &self,
        section_id: &str,
        publish_date: &str,
    ) -> Result<FetchedPage, ScrapeError> {
        let url = self.ranking_url(section_id, publish_date)?;
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status {
                status,
                url: url.to_string(),
            });
        }
        let html = response.text().await?;
        debug!(bytes = html.len(), "Fetched ranking page");
        Ok(FetchedPage {
            section_id: section_id.to_string(),
            url,
            publish_date: publish_date.to_string(),
            html,
        })
    }

    /// Fetch every section in order, pausing between consecutive requests.
    ///
    /// Failed sections are logged and left out of the result.
    #[instrument(level = "info", skip_all, fields(sections = sections.len(), %publish_date))]
    pub async fn fetch_all(&self, sections: &[String], publish_date: &str) -> Vec<FetchedPage> {
        let pages: Vec<FetchedPage> = stream::iter(sections.iter().enumerate())
            .then(|(i, section_id)| async move {
                if i > 0 {
                    let pause = self.pick_delay();
                    debug!(?pause, "Pausing before next section");
                    sleep(pause).await;
                }
                match self.fetch_section(section_id, publish_date).await {
                    Ok(page) => Some(page),
                    Err(e) => {
                        warn!(section = %section_id, error = %e, "Section fetch failed; skipping");
                        None
                    }
                }
            })
            .filter_map(std::future::ready)
            .collect()
            .await;

        info!(
            fetched = pages.len(),
            skipped = sections.len() - pages.len(),
            "Fetched ranking pages"
        );
        pages
    }

    fn pick_delay(&self) -> Duration {
        let min = self.delay.min.as_millis() as u64;
        let max = self.delay.max.as_millis() as u64;
        Duration::from_millis(rng().random_range(min..=max))
    }
}
