//! Category selection strategies
//!
//! The prefetcher holds two providers: a "basic" catalogue (usually
//! [`CategoryProvider::Random`]) and an "advanced" one fed by propagation
//! discoveries (a [`CategoryProvider::Stack`]).

mod fixed;
mod random;
mod stack;

pub use fixed::FixedProvider;
pub use random::RandomProvider;
pub use stack::StackProvider;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CategoryError {
    #[error("{0} provider has no categories")]
    Empty(&'static str),

    #[error("{provider} provider does not support {operation}")]
    Unsupported {
        provider: &'static str,
        operation: &'static str,
    },
}

#[derive(Debug)]
pub enum CategoryProvider {
    Random(RandomProvider),
    Stack(StackProvider),
    Fixed(FixedProvider),
}

impl CategoryProvider {
    pub fn random<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Random(RandomProvider::new(categories))
    }

    pub fn stack<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Stack(StackProvider::new(categories))
    }

    pub fn fixed(category: impl Into<String>) -> Self {
        Self::Fixed(FixedProvider::new(category))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Random(_) => random::NAME,
            Self::Stack(_) => stack::NAME,
            Self::Fixed(_) => fixed::NAME,
        }
    }

    /// Category for the next fetch
    pub fn next(&self) -> Result<String, CategoryError> {
        match self {
            Self::Random(p) => p.next(),
            Self::Stack(p) => p.pop(),
            Self::Fixed(p) => Ok(p.get().to_string()),
        }
    }

    /// Offer a newly discovered category
    pub fn register(&self, category: &str) -> Result<(), CategoryError> {
        match self {
            Self::Random(p) => {
                p.add(category);
                Ok(())
            }
            Self::Stack(p) => {
                p.push(category);
                Ok(())
            }
            Self::Fixed(_) => Err(CategoryError::Unsupported {
                provider: fixed::NAME,
                operation: "register",
            }),
        }
    }

    pub fn replace(&self, categories: Vec<String>) -> Result<(), CategoryError> {
        match self {
            Self::Random(p) => {
                p.set(categories);
                Ok(())
            }
            Self::Stack(p) => {
                p.set(categories);
                Ok(())
            }
            Self::Fixed(_) => Err(CategoryError::Unsupported {
                provider: fixed::NAME,
                operation: "replace",
            }),
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        match self {
            Self::Random(p) => p.snapshot(),
            Self::Stack(p) => p.snapshot(),
            Self::Fixed(p) => vec![p.get().to_string()],
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Random(p) => p.len(),
            Self::Stack(p) => p.len(),
            Self::Fixed(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
