//! Fact service library
//!
//! Serves short encyclopedia facts out of a TTL-bounded cache that a
//! background prefetcher keeps topped up, and learns per-user category
//! preferences from likes, propagating part of each like to related
//! subcategories.
//!
//! The binary in `main.rs` wires these pieces together; transports sit
//! outside this crate and call into [`services::FactService`].

pub mod cache;
pub mod category;
pub mod config;
pub mod content;
pub mod context;
pub mod db;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod models;
pub mod services;
pub mod shutdown;

pub use cache::{CacheConfig, FactCache, SweepReport};
pub use category::{CategoryError, CategoryProvider};
pub use config::Config;
pub use context::RequestContext;
pub use error::{ServiceError, ServiceResult};
pub use models::{Category, Fact, PropagationTask};
pub use services::{FactService, PropagationEngine, PropagationQueue};
