pub mod fact_service;
pub mod propagation;

pub use fact_service::{DependencyStatus, FactService, ReadinessReport, ServingConfig};
pub use propagation::{HandleOutcome, PropagationConfig, PropagationEngine, PropagationQueue};
