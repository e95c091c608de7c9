//! In-process content catalogue
//!
//! Serves a fixed set of articles and subcategory edges. Backs local runs
//! (`STORAGE_MODE=memory`) and tests in place of a network client.

use super::{ArticleSummary, ContentError, ContentResult, ContentSource};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct FixtureContentSource {
    articles: HashMap<String, Vec<ArticleSummary>>,
    subcategories: HashMap<String, Vec<String>>,
    language: String,
}

impl FixtureContentSource {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            ..Self::default()
        }
    }

    pub fn with_article(
        mut self,
        category: &str,
        title: &str,
        extract: &str,
        image_url: Option<&str>,
        page_url: &str,
    ) -> Self {
        let article = ArticleSummary {
            title: title.to_string(),
            category: category.to_string(),
            extract: extract.to_string(),
            image_url: image_url.map(str::to_string),
            page_url: page_url.to_string(),
            language: self.language.clone(),
        };
        self.articles
            .entry(category.to_string())
            .or_default()
            .push(article);
        self
    }

    pub fn with_subcategories(mut self, category: &str, subcategories: &[&str]) -> Self {
        self.subcategories
            .entry(category.to_string())
            .or_default()
            .extend(subcategories.iter().map(|s| s.to_string()));
        self
    }

    pub fn categories(&self) -> Vec<String> {
        let mut names: Vec<String> = self.articles.keys().cloned().collect();
        names.sort();
        names
    }

    /// Small built-in catalogue covering three topics
    pub fn demo(language: impl Into<String>) -> Self {
        Self::new(language)
            .with_article(
                "World_War_II",
                "Battle of Stalingrad",
                "The Battle of Stalingrad was a major battle on the Eastern Front of World War II in which Nazi Germany and its allies fought the Soviet Union for control of the city of Stalingrad.",
                Some("https://upload.wikimedia.org/wikipedia/commons/a/a3/Stamp_of_Russia-2001-2004-198.jpg"),
                "https://en.wikipedia.org/wiki/Battle_of_Stalingrad",
            )
            .with_article(
                "World_War_II",
                "D-Day",
                "D-Day was the Allied invasion of Normandy on 6 June 1944. It was one of the largest amphibious military assaults in history and began the liberation of German-occupied Western Europe.",
                Some("https://upload.wikimedia.org/wikipedia/commons/a/a2/Omaha_beach_casualties.jpg"),
                "https://en.wikipedia.org/wiki/Normandy_landings",
            )
            .with_article(
                "World_War_II",
                "Operation Barbarossa",
                "Operation Barbarossa was the code name for the Axis invasion of the Soviet Union, which started on 22 June 1941.",
                None,
                "https://en.wikipedia.org/wiki/Operation_Barbarossa",
            )
            .with_article(
                "World_War_II",
                "Battle of Kursk",
                "The Battle of Kursk was a Second World War engagement between German and Soviet forces on the Eastern Front near Kursk in the Soviet Union.",
                Some("https://upload.wikimedia.org/wikipedia/commons/9/95/Kursk_tank_battle_map.png"),
                "https://en.wikipedia.org/wiki/Battle_of_Kursk",
            )
            .with_article(
                "Go_(programming_language)",
                "Go (programming language)",
                "Go is a statically typed, compiled programming language designed at Google by Robert Griesemer, Rob Pike, and Ken Thompson.",
                Some("https://upload.wikimedia.org/wikipedia/commons/0/05/Go_Logo_Blue.svg"),
                "https://en.wikipedia.org/wiki/Go_(programming_language)",
            )
            .with_article(
                "Go_(programming_language)",
                "Goroutine",
                "A goroutine is a lightweight thread managed by the Go runtime.",
                None,
                "https://en.wikipedia.org/wiki/Goroutine",
            )
            .with_article(
                "Go_(programming_language)",
                "Channels (Go)",
                "Channels are a typed conduit through which you can send and receive values with the channel operator.",
                None,
                "https://en.wikipedia.org/wiki/Channel_(programming)",
            )
            .with_article(
                "Machine_learning",
                "Machine learning",
                "Machine learning is the study of computer algorithms that improve automatically through experience.",
                Some("https://upload.wikimedia.org/wikipedia/commons/4/44/Machine_learning.svg"),
                "https://en.wikipedia.org/wiki/Machine_learning",
            )
            .with_article(
                "Machine_learning",
                "Supervised learning",
                "Supervised learning is the machine learning task of learning a function that maps an input to an output based on example input-output pairs.",
                None,
                "https://en.wikipedia.org/wiki/Supervised_learning",
            )
            .with_article(
                "Machine_learning",
                "Neural network",
                "In machine learning, a neural network is a network of artificial neurons modeled after biological neural networks.",
                Some("https://upload.wikimedia.org/wikipedia/commons/6/60/Artificial_neural_network.svg"),
                "https://en.wikipedia.org/wiki/Artificial_neural_network",
            )
            .with_subcategories("World_War_II", &["Eastern_Front_(World_War_II)", "Battles_of_World_War_II"])
            .with_subcategories("Machine_learning", &["Supervised_learning", "Artificial_neural_networks"])
            .with_subcategories("Go_(programming_language)", &["Concurrent_programming_languages"])
    }
}

#[async_trait::async_trait]
impl ContentSource for FixtureContentSource {
    async fn fetch_summaries(
        &self,
        category: &str,
        limit: usize,
    ) -> ContentResult<Vec<ArticleSummary>> {
        let items = self
            .articles
            .get(category)
            .ok_or_else(|| ContentError::UnknownCategory(category.to_string()))?;

        Ok(items.iter().take(limit).cloned().collect())
    }

    async fn fetch_subcategories(&self, category: &str, limit: usize) -> ContentResult<Vec<String>> {
        Ok(self
            .subcategories
            .get(category)
            .map(|subs| subs.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn ping(&self) -> ContentResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_demo_catalogue_respects_limit() {
        let source = FixtureContentSource::demo("en");
        let items = source.fetch_summaries("World_War_II", 2).await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|a| a.category == "World_War_II"));
        assert!(items.iter().all(|a| a.language == "en"));
    }

    #[tokio::test]
    async fn test_unknown_category_is_an_error() {
        let source = FixtureContentSource::demo("en");
        let err = source.fetch_summaries("Nope", 5).await.unwrap_err();
        assert!(matches!(err, ContentError::UnknownCategory(c) if c == "Nope"));
    }

    #[tokio::test]
    async fn test_subcategories_of_leaf_are_empty() {
        let source = FixtureContentSource::demo("en");
        assert_eq!(
            source.fetch_subcategories("Machine_learning", 1).await.unwrap(),
            vec!["Supervised_learning"]
        );
        assert!(source.fetch_subcategories("Leaf", 10).await.unwrap().is_empty());
    }
}
