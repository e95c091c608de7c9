//! Background jobs
//!
//! Long-running loops spawned by `main`. Each one takes a
//! [`ShutdownSignal`](crate::shutdown::ShutdownSignal) and returns once it fires.

pub mod cache_cleaner;
pub mod prefetcher;

pub use cache_cleaner::{run_cleanup_cycle, start_cache_cleaner, CacheCleanerConfig};
pub use prefetcher::{PrefetchConfig, Prefetcher, TickOutcome};
