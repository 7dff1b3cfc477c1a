//! Daily "most viewed" ranking scraper.
//!
//! Scraping runs in two phases so the pipeline can report them separately:
//!
//! 1. **Fetching** ([`fetcher`]): one GET per configured section, strictly
//!    sequential, with a random pause between requests
//! 2. **Parsing** ([`ranking`]): extract ranked articles from each page
//!
//! Either phase may fail for a single section. That section is logged and
//! skipped; the remaining sections are still scraped.
//!
//! # Remote page
//!
//! | Part | Default selector |
//! |------|------------------|
//! | Journal heading | `a.press_hd_name_link` |
//! | Ranking lists | `ul.press_ranking_list` |
//! | Article anchor | `a._es_pc_link` |
//! | Title | `strong.list_title` |
//! | Thumbnail | `div.list_img img` |
//! | View count | `span.list_view` |

pub mod fetcher;
pub mod ranking;

use crate::config::ScrapeConfig;
use crate::error::ScrapeError;
use crate::models::SectionRanking;
use crate::utils::{compact_date, days_back, today_in, truncate_for_log};
use chrono::NaiveDate;
use chrono_tz::Tz;
use fetcher::{FetchedPage, RankingFetcher};
use ranking::RankingParser;
use tracing::{info, instrument, warn};

/// Fetcher and parser bound to one [`ScrapeConfig`].
#[derive(Debug, Clone)]
pub struct RankingScraper {
    fetcher: RankingFetcher,
    parser: RankingParser,
    sections: Vec<String>,
    day_offset: i64,
    time_zone: Tz,
}

impl RankingScraper {
    pub fn new(config: &ScrapeConfig) -> Result<Self, ScrapeError> {
        Ok(Self {
            fetcher: RankingFetcher::new(config)?,
            parser: RankingParser::new(&config.selectors, config.fallback_image_url.clone())?,
            sections: config.sections.clone(),
            day_offset: config.day_offset,
            time_zone: config.time_zone,
        })
    }

    /// `today - day_offset` in the configured time zone.
    pub fn target_date(&self) -> NaiveDate {
        days_back(today_in(self.time_zone), self.day_offset)
    }

    /// Fetch all configured sections for `date`.
    pub async fn fetch(&self, date: NaiveDate) -> Vec<FetchedPage> {
        self.fetcher.fetch_all(&self.sections, &compact_date(date)).await
    }

    /// Parse fetched pages. Pages with an unexpected shape are skipped.
    #[instrument(level = "info", skip_all, fields(pages = pages.len()))]
    pub fn parse(&self, pages: &[FetchedPage]) -> Vec<SectionRanking> {
        let rankings: Vec<SectionRanking> = pages
            .iter()
            .filter_map(|page| match self.parser.parse(page) {
                Ok(ranking) => {
                    info!(
                        section = %ranking.section_id,
                        journal = %ranking.journal,
                        publish_date = %ranking.publish_date,
                        records = ranking.records.len(),
                        "Parsed section"
                    );
                    Some(ranking)
                }
                Err(e) => {
                    warn!(
                        section = %page.section_id,
                        error = %e,
                        html_preview = %truncate_for_log(&page.html, 300),
                        "Section parse failed; skipping"
                    );
                    None
                }
            })
            .collect();
        info!(
            sections = rankings.len(),
            records = rankings.iter().map(|r| r.records.len()).sum::<usize>(),
            "Parsed ranking pages"
        );
        rankings
    }
}
