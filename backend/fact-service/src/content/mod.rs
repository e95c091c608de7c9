//! Content fetch port
//!
//! Everything the service needs from the outside catalogue: article
//! summaries per category, subcategory lookup and a liveness probe.

mod fixture;
mod normalize;
mod retry;

pub use fixture::FixtureContentSource;
pub use normalize::normalize;
pub use retry::{RetryConfig, RetryingSource};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Raw article as returned by a content source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleSummary {
    pub title: String,
    pub category: String,
    pub extract: String,
    pub image_url: Option<String>,
    pub page_url: String,
    pub language: String,
}

#[derive(Error, Debug, Clone)]
pub enum ContentError {
    #[error("Content source unavailable: {0}")]
    Unavailable(String),

    #[error("Content source timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Invalid content: {0}")]
    Invalid(String),
}

impl ContentError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ContentError::Unavailable(_) | ContentError::Timeout(_))
    }
}

pub type ContentResult<T> = Result<T, ContentError>;

#[async_trait::async_trait]
pub trait ContentSource: Send + Sync {
    /// Up to `limit` validated summaries for `category`
    async fn fetch_summaries(&self, category: &str, limit: usize)
        -> ContentResult<Vec<ArticleSummary>>;

    /// Up to `limit` subcategory names of `category`
    async fn fetch_subcategories(&self, category: &str, limit: usize) -> ContentResult<Vec<String>>;

    async fn ping(&self) -> ContentResult<()>;
}

pub type SharedContentSource = Arc<dyn ContentSource>;

#[async_trait::async_trait]
impl<T: ContentSource + ?Sized> ContentSource for Arc<T> {
    async fn fetch_summaries(
        &self,
        category: &str,
        limit: usize,
    ) -> ContentResult<Vec<ArticleSummary>> {
        (**self).fetch_summaries(category, limit).await
    }

    async fn fetch_subcategories(&self, category: &str, limit: usize) -> ContentResult<Vec<String>> {
        (**self).fetch_subcategories(category, limit).await
    }

    async fn ping(&self) -> ContentResult<()> {
        (**self).ping().await
    }
}
