use super::ArticleSummary;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{Fact, MAX_SUMMARY_CHARS};
use chrono::Utc;
use uuid::Uuid;

const ELLIPSIS: &str = "...";

/// Turn a fetched summary into a storable fact with a fresh id.
pub fn normalize(summary: ArticleSummary) -> ServiceResult<Fact> {
    let title = collapse_whitespace(&summary.title);
    let extract = collapse_whitespace(&summary.extract);
    let page_url = summary.page_url.trim().to_string();

    if title.is_empty() {
        return Err(ServiceError::Validation("article has no title".to_string()));
    }
    if extract.is_empty() {
        return Err(ServiceError::Validation(format!(
            "article '{}' has no extract",
            title
        )));
    }
    if page_url.is_empty() {
        return Err(ServiceError::Validation(format!(
            "article '{}' has no page url",
            title
        )));
    }

    let image_url = summary
        .image_url
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty());

    Ok(Fact {
        id: Uuid::new_v4().to_string(),
        title,
        category: summary.category,
        summary: truncate_summary(&extract),
        image_url,
        source_url: page_url,
        language: summary.language,
        fetched_at: Utc::now(),
    })
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_summary(text: &str) -> String {
    if text.chars().count() <= MAX_SUMMARY_CHARS {
        return text.to_string();
    }

    let keep = MAX_SUMMARY_CHARS - ELLIPSIS.len();
    let mut cut: String = text.chars().take(keep).collect();
    cut.truncate(cut.trim_end().len());
    cut.push_str(ELLIPSIS);
    cut
}
