use super::CategoryError;
use parking_lot::Mutex;

pub(super) const NAME: &str = "stack";

/// LIFO of discovered categories. Re-pushing an entry moves it to the top
/// instead of duplicating it.
#[derive(Debug, Default)]
pub struct StackProvider {
    items: Mutex<Vec<String>>,
}

impl StackProvider {
    pub fn new<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = Self::default();
        provider.set(categories.into_iter().map(Into::into).collect());
        provider
    }

    pub fn push(&self, category: &str) {
        let mut items = self.items.lock();
        items.retain(|c| c != category);
        items.push(category.to_string());
    }

    pub fn pop(&self) -> Result<String, CategoryError> {
        self.items.lock().pop().ok_or(CategoryError::Empty(NAME))
    }

    pub fn set(&self, categories: Vec<String>) {
        let mut items = self.items.lock();
        items.clear();
        for category in categories {
            items.retain(|c| *c != category);
            items.push(category);
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.items.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }
}
