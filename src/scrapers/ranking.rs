//! Ranking page parser.
//!
//! Turns one section's HTML into a [`SectionRanking`]. The journal name comes
//! from the page heading; every article anchor inside a ranking list becomes a
//! [`ScrapedRecord`] unless it has no view-count element, in which case it is
//! not an article and is skipped.

use crate::config::PageSelectors;
use crate::error::ScrapeError;
use crate::models::{ScrapedRecord, SectionRanking};
use crate::scrapers::fetcher::FetchedPage;
use crate::utils::digits_only;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};

/// [`PageSelectors`] compiled once and reused for every page.
#[derive(Debug, Clone)]
pub struct CompiledSelectors {
    heading: Selector,
    ranking_list: Selector,
    article: Selector,
    title: Selector,
    image_container: Selector,
    image: Selector,
    view: Selector,
    source: PageSelectors,
}

fn compile(selector: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(selector).map_err(|e| ScrapeError::Selector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

impl CompiledSelectors {
    pub fn compile(selectors: &PageSelectors) -> Result<Self, ScrapeError> {
        Ok(Self {
            heading: compile(&selectors.heading)?,
            ranking_list: compile(&selectors.ranking_list)?,
            article: compile(&selectors.article)?,
            title: compile(&selectors.title)?,
            image_container: compile(&selectors.image_container)?,
            image: compile(&selectors.image)?,
            view: compile(&selectors.view)?,
            source: selectors.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RankingParser {
    selectors: CompiledSelectors,
    fallback_image: String,
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

impl RankingParser {
    pub fn new(selectors: &PageSelectors, fallback_image: impl Into<String>) -> Result<Self, ScrapeError> {
        Ok(Self {
            selectors: CompiledSelectors::compile(selectors)?,
            fallback_image: fallback_image.into(),
        })
    }

    /// Parse one fetched page.
    ///
    /// # Errors
    ///
    /// [`ScrapeError::UnexpectedShape`] when the heading is missing, or when
    /// an anchor that carries a view count has no title or no `href`.
    #[instrument(level = "debug", skip_all, fields(section = %page.section_id))]
    pub fn parse(&self, page: &FetchedPage) -> Result<SectionRanking, ScrapeError> {
        let document = Html::parse_document(&page.html);
        let sel = &self.selectors;

        let journal = document
            .select(&sel.heading)
            .next()
            .map(element_text)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                ScrapeError::UnexpectedShape(format!(
                    "no journal heading matching `{}`",
                    sel.source.heading
                ))
            })?;

        let mut records = Vec::new();
        for list in document.select(&sel.ranking_list) {
            for anchor in list.select(&sel.article) {
                let Some(view_node) = anchor.select(&sel.view).next() else {
                    continue;
                };
                let digits = digits_only(&view_node.text().collect::<String>());
                let Ok(view) = digits.parse::<i64>() else {
                    debug!(raw = %element_text(view_node), "View count has no usable digits; dropping");
                    continue;
                };

                let title = anchor
                    .select(&sel.title)
                    .next()
                    .map(element_text)
                    .ok_or_else(|| {
                        ScrapeError::UnexpectedShape(format!(
                            "article without title matching `{}`",
                            sel.source.title
                        ))
                    })?;
                let href = anchor.value().attr("href").ok_or_else(|| {
                    ScrapeError::UnexpectedShape("article anchor without href".to_string())
                })?;
                let url = page.url.join(href)?.to_string();

                let image = anchor
                    .select(&sel.image_container)
                    .next()
                    .and_then(|container| container.select(&sel.image).next())
                    .and_then(|img| img.value().attr("src"))
                    .map(str::to_string)
                    .unwrap_or_else(|| self.fallback_image.clone());

                records.push(ScrapedRecord {
                    title,
                    image,
                    journal: journal.clone(),
                    url,
                    view,
                    publish_date: page.publish_date.clone(),
                });
            }
        }

        debug!(%journal, count = records.len(), "Parsed ranking page");
        Ok(SectionRanking {
            section_id: page.section_id.clone(),
            journal,
            publish_date: page.publish_date.clone(),
            records,
        })
    }
}
