pub mod affinity_repo;

pub use affinity_repo::{
    AffinityStore, CategoryAffinity, InMemoryAffinityStore, PgAffinityStore, SharedAffinityStore,
};
