pub(super) const NAME: &str = "fixed";

#[derive(Debug, Clone)]
pub struct FixedProvider {
    category: String,
}

impl FixedProvider {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
        }
    }

    pub fn get(&self) -> &str {
        &self.category
    }
}
