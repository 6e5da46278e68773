//! Cache Module
//!
//! Content-addressed disk cache with URL-pattern eligibility rules and
//! access-time eviction under a byte budget.

mod eviction;
mod key;
mod policy;
mod rules;
mod store;
mod usage;


// Re-export public types
pub use eviction::{eviction_order, EvictionCandidate, EvictionPlan};
pub use key::{location_for, StorageLocation};
pub use policy::CachePolicy;
pub use rules::{is_eligible, CacheRule, CompiledRule, InvalidPattern, RuleSet};
pub use store::CacheStore;
pub use usage::{DiskUsage, BYTES_PER_MB};
