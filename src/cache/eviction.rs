//! Eviction Policy Module
//!
//! Orders tracked artifacts for eviction by last access, oldest first.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::cache::StorageLocation;

// == Eviction Candidate ==
/// A tracked artifact that still exists on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionCandidate {
    /// Artifact file name
    pub location: StorageLocation,
    /// Full path of the artifact file
    pub path: PathBuf,
    /// Last recorded access in this process
    pub last_access: DateTime<Utc>,
    /// Size on disk, re-read when the candidate was collected
    pub size: u64,
}

// == Eviction Order ==
/// Sorts candidates oldest access first.
///
/// Equal timestamps fall back to location order so the result is a total
/// order.
pub fn eviction_order(mut candidates: Vec<EvictionCandidate>) -> Vec<EvictionCandidate> {
    candidates.sort_by(|a, b| {
        a.last_access
            .cmp(&b.last_access)
            .then_with(|| a.location.cmp(&b.location))
    });
    candidates
}

// == Eviction Plan ==
/// Running tally for one eviction pass.
#[derive(Debug, Clone, Copy)]
pub struct EvictionPlan {
    current_size: u64,
    needed: u64,
    budget: u64,
}

impl EvictionPlan {
    /// Creates a plan for writing `needed` bytes into a directory currently
    /// holding `current_size` bytes.
    pub fn new(current_size: u64, needed: u64, budget: u64) -> Self {
        Self {
            current_size,
            needed,
            budget,
        }
    }

    /// True once the pending write fits within the budget.
    pub fn satisfied(&self) -> bool {
        self.current_size.saturating_add(self.needed) <= self.budget
    }

    /// Accounts for a successfully deleted file.
    pub fn record_freed(&mut self, size: u64) {
        self.current_size = self.current_size.saturating_sub(size);
    }

    /// Projected directory size before the pending write.
    pub fn current_size(&self) -> u64 {
        self.current_size
    }
}
