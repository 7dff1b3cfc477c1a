//! Scraped record validation.
//!
//! Flattens per-section parser output into [`NormalizedArticle`]s. A single
//! bad record rejects the whole batch.

use crate::error::ValidationError;
use crate::models::{NormalizedArticle, ScrapedRecord, SectionRanking};
use crate::utils::parse_compact_date;
use tracing::{info, instrument};

fn require(
    index: usize,
    record: &ScrapedRecord,
    field: &'static str,
    value: &str,
) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError {
            index,
            journal: record.journal.clone(),
            field,
            reason: "missing or blank".to_string(),
        });
    }
    Ok(trimmed.to_string())
}

/// Validate one record. `index` is its position in the flattened batch.
pub fn normalize_record(
    index: usize,
    record: &ScrapedRecord,
) -> Result<NormalizedArticle, ValidationError> {
    let title = require(index, record, "title", &record.title)?;
    let image = require(index, record, "image", &record.image)?;
    let journal = require(index, record, "journal", &record.journal)?;
    let url = require(index, record, "url", &record.url)?;

    if record.view < 0 {
        return Err(ValidationError {
            index,
            journal,
            field: "view",
            reason: format!("negative count {}", record.view),
        });
    }

    let publish_date = parse_compact_date(record.publish_date.trim()).ok_or_else(|| {
        ValidationError {
            index,
            journal: journal.clone(),
            field: "publish_date",
            reason: format!("`{}` is not a YYYYMMDD date", record.publish_date),
        }
    })?;

    Ok(NormalizedArticle {
        title,
        image,
        journal,
        url,
        view: record.view,
        publish_date,
    })
}

/// Flatten and validate every section's records, failing fast.
#[instrument(level = "info", skip_all, fields(sections = rankings.len()))]
pub fn normalize(rankings: &[SectionRanking]) -> Result<Vec<NormalizedArticle>, ValidationError> {
    let articles = rankings
        .iter()
        .flat_map(|ranking| ranking.records.iter())
        .enumerate()
        .map(|(index, record)| normalize_record(index, record))
        .collect::<Result<Vec<_>, _>>()?;
    info!(count = articles.len(), "Normalized scraped records");
    Ok(articles)
}
