use crate::error::{ServiceError, ServiceResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Sentinel id of the fact served when nothing is cached
pub const PLACEHOLDER_FACT_ID: &str = "-1";

/// Upper bound on a fact summary, in characters
pub const MAX_SUMMARY_CHARS: usize = 280;

const MAX_CATEGORY_LEN: usize = 255;

/// A cached, ready-to-serve fact. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub id: String,
    pub title: String,
    pub category: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub source_url: String,
    pub language: String,
    pub fetched_at: DateTime<Utc>,
}

impl Fact {
    /// Clearly-marked stand-in served on cache underrun
    pub fn placeholder() -> Self {
        Self {
            id: PLACEHOLDER_FACT_ID.to_string(),
            title: "FUN FACT".to_string(),
            category: String::new(),
            summary: "We currently don't have any facts ready. Please check back in a moment."
                .to_string(),
            image_url: None,
            source_url: String::new(),
            language: "en".to_string(),
            fetched_at: Utc::now(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.id == PLACEHOLDER_FACT_ID
    }
}

/// Validated category name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    pub fn parse(raw: impl Into<String>) -> ServiceResult<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err(ServiceError::Validation(
                "category must not be empty".to_string(),
            ));
        }
        if trimmed.len() > MAX_CATEGORY_LEN {
            return Err(ServiceError::Validation(format!(
                "category longer than {} bytes",
                MAX_CATEGORY_LEN
            )));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(ServiceError::Validation(
                "category contains control characters".to_string(),
            ));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Category {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One unit of affinity expansion; lives only in the propagation queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationTask {
    pub user_id: Uuid,
    pub category: Category,
    pub depth: u32,
}

impl PropagationTask {
    pub fn root(user_id: Uuid, category: Category) -> Self {
        Self {
            user_id,
            category,
            depth: 0,
        }
    }

    pub fn child(&self, category: Category) -> Self {
        Self {
            user_id: self.user_id,
            category,
            depth: self.depth + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_fact() {
        let fact = Fact::placeholder();
        assert_eq!(fact.id, PLACEHOLDER_FACT_ID);
        assert_eq!(fact.title, "FUN FACT");
        assert!(fact.is_placeholder());
    }

    #[test]
    fn test_category_validation() {
        assert_eq!(Category::parse("  Go  ").unwrap().as_str(), "Go");
        assert!(Category::parse("   ").is_err());
        assert!(Category::parse("a\nb").is_err());
        assert!(Category::parse("x".repeat(300)).is_err());
    }

    #[test]
    fn test_child_task_increments_depth() {
        let user = Uuid::new_v4();
        let root = PropagationTask::root(user, Category::parse("Root").unwrap());
        let child = root.child(Category::parse("Sub1").unwrap());
        assert_eq!(child.depth, 1);
        assert_eq!(child.user_id, user);
        assert_eq!(child.category.as_str(), "Sub1");
    }

    #[test]
    fn test_fact_json_shape() {
        let fact = Fact {
            id: "abc".into(),
            title: "Goroutine".into(),
            category: "Go".into(),
            summary: "A goroutine is a lightweight thread.".into(),
            image_url: None,
            source_url: "https://en.wikipedia.org/wiki/Goroutine".into(),
            language: "en".into(),
            fetched_at: Utc::now(),
        };
        let json = serde_json::to_value(&fact).unwrap();
        assert!(json.get("image_url").is_none());
        let back: Fact = serde_json::from_value(json).unwrap();
        assert_eq!(back, fact);
    }
}
