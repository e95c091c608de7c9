//! Key schema for the fact cache
//!
//! Key format: v{VERSION}:{entity}:{identifier}

/// Cache schema version - increment when changing key formats
pub const CACHE_VERSION: u32 = 1;

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    // ============= Fact Keys =============

    /// Serialized fact body
    /// Format: v1:fact:{fact_id}
    pub fn fact(fact_id: &str) -> String {
        format!("v{}:fact:{}", CACHE_VERSION, fact_id)
    }

    /// Delivery queue of ready fact ids
    /// Format: v1:queue:ready
    pub fn ready_queue() -> String {
        format!("v{}:queue:ready", CACHE_VERSION)
    }

    // ============= Category Keys =============

    /// Fact ids tagged with a category
    /// Format: v1:category:{name}
    pub fn category(name: &str) -> String {
        format!("v{}:category:{}", CACHE_VERSION, name)
    }

    /// Registry of every category that owns an index set
    /// Format: v1:categories:registry
    pub fn category_registry() -> String {
        format!("v{}:categories:registry", CACHE_VERSION)
    }

    // ============= Utility =============

    /// Extract entity type from key
    pub fn entity_type(key: &str) -> Option<&str> {
        // Format: v{N}:{entity}:...
        let mut parts = key.split(':');
        match (parts.next(), parts.next()) {
            (Some(_), Some(entity)) => Some(entity),
            _ => None,
        }
    }

    /// Strip the fact key prefix, returning the bare id
    pub fn fact_id(key: &str) -> Option<&str> {
        key.strip_prefix(&format!("v{}:fact:", CACHE_VERSION))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fact_key() {
        let key = CacheKey::fact("550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(key, "v1:fact:550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn test_category_keys() {
        assert_eq!(CacheKey::category("World_War_II"), "v1:category:World_War_II");
        assert_eq!(CacheKey::category_registry(), "v1:categories:registry");
        assert_eq!(CacheKey::ready_queue(), "v1:queue:ready");
    }

    #[test]
    fn test_entity_type() {
        assert_eq!(CacheKey::entity_type("v1:fact:123"), Some("fact"));
        assert_eq!(CacheKey::entity_type("v1:category:Go"), Some("category"));
        assert_eq!(CacheKey::entity_type("invalid"), None);
    }

    #[test]
    fn test_fact_id_roundtrip() {
        let key = CacheKey::fact("abc");
        assert_eq!(CacheKey::fact_id(&key), Some("abc"));
        assert_eq!(CacheKey::fact_id("v1:category:abc"), None);
    }
}
