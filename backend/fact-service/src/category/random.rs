use super::CategoryError;
use parking_lot::RwLock;
use rand::seq::SliceRandom;

pub(super) const NAME: &str = "random";

/// Uniform pick from a catalogue that only grows through `add`/`set`.
#[derive(Debug, Default)]
pub struct RandomProvider {
    categories: RwLock<Vec<String>>,
}

impl RandomProvider {
    pub fn new<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = Self::default();
        provider.set(categories.into_iter().map(Into::into).collect());
        provider
    }

    pub fn next(&self) -> Result<String, CategoryError> {
        self.categories
            .read()
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or(CategoryError::Empty(NAME))
    }

    pub fn add(&self, category: &str) {
        let mut categories = self.categories.write();
        if !categories.iter().any(|c| c == category) {
            categories.push(category.to_string());
        }
    }

    pub fn set(&self, categories: Vec<String>) {
        let mut deduped: Vec<String> = Vec::with_capacity(categories.len());
        for category in categories {
            if !deduped.contains(&category) {
                deduped.push(category);
            }
        }
        *self.categories.write() = deduped;
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.categories.read().clone()
    }

    pub fn len(&self) -> usize {
        self.categories.read().len()
    }
}
