//! Per-call context carried explicitly through the core

use uuid::Uuid;

/// Correlation id plus the (already authenticated) caller, if any.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: Uuid,
    pub user_id: Option<Uuid>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            user_id: None,
        }
    }

    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            user_id: Some(user_id),
        }
    }

    /// Context for one cycle of a background job
    pub fn background() -> Self {
        Self::new()
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
