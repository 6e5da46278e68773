//! Cache Store Module
//!
//! On-disk artifact store with a byte budget enforced by access-time
//! eviction. The directory listing is the only source of truth for content
//! and size; the in-memory access records only order eviction.

use std::collections::{hash_map::Entry, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cache::{
    eviction_order, location_for, DiskUsage, EvictionCandidate, EvictionPlan, StorageLocation,
};
use crate::error::{ProxyError, Result};

// == Cache Store ==
/// Content-addressed artifact store backed by a flat directory.
///
/// Safe to share across request handlers behind an `Arc`. Access records
/// sit behind a reader/writer lock; eviction holds the write side for the
/// whole pass. Writers are serialized so the size check, eviction and
/// write of one `put` never interleave with another; reads never wait on
/// them.
#[derive(Debug)]
pub struct CacheStore {
    /// Directory holding one file per artifact
    directory: PathBuf,
    /// Soft upper bound on total artifact bytes
    budget: u64,
    /// Last access per artifact touched by this process
    access: RwLock<HashMap<StorageLocation, DateTime<Utc>>>,
    /// Held for the whole of a `put`
    writer: Mutex<()>,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a store over `directory` with a byte budget.
    ///
    /// The directory is created lazily on the first `put`.
    pub fn new(directory: impl Into<PathBuf>, budget: u64) -> Self {
        Self {
            directory: directory.into(),
            budget,
            access: RwLock::new(HashMap::new()),
            writer: Mutex::new(()),
        }
    }

    /// Directory the artifacts live in.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Configured byte budget.
    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Full path of the artifact for a key.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.path_of(&location_for(key))
    }

    fn path_of(&self, location: &StorageLocation) -> PathBuf {
        self.directory.join(location.as_str())
    }

    // == Exists ==
    /// Returns true if an artifact file exists for the key.
    ///
    /// Does not touch the access records.
    pub fn exists(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }

    // == Get ==
    /// Reads the artifact for a key and records the access.
    ///
    /// A missing file is `NotFound`; any other failure is `StoreIo` and
    /// leaves the access records untouched.
    pub fn get(&self, key: &str) -> Result<Vec<u8>> {
        let location = location_for(key);
        let data = match fs::read(self.path_of(&location)) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ProxyError::NotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        self.record_access(location);
        Ok(data)
    }

    // == Put ==
    /// Stores an artifact, evicting least recently accessed artifacts first
    /// if the write would exceed the budget.
    ///
    /// The budget is best effort: when nothing evictable is left the write
    /// still happens.
    pub fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let _writer = self.writer.lock();
        fs::create_dir_all(&self.directory)?;

        let needed = data.len() as u64;
        let current = self.scan()?.total_bytes;
        if current.saturating_add(needed) > self.budget {
            self.evict(current, needed);
        }

        let location = location_for(key);
        fs::write(self.path_of(&location), data)?;
        self.record_access(location);
        Ok(())
    }

    // == Stats ==
    /// Scans the directory for total bytes and file count.
    pub fn stats(&self) -> Result<DiskUsage> {
        self.scan()
    }

    // == Seed From Disk ==
    /// Records every artifact already on disk using its modification time,
    /// making files from earlier runs eligible for eviction.
    ///
    /// Artifacts already tracked keep their recorded access. Returns the
    /// number of newly tracked artifacts.
    pub fn seed_from_disk(&self) -> Result<usize> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut access = self.access.write();
        let mut seeded = 0;
        for entry in entries {
            let entry = entry?;
            let Some(location) = entry
                .file_name()
                .to_str()
                .and_then(StorageLocation::from_file_name)
            else {
                continue;
            };
            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => DateTime::<Utc>::from(modified),
                Err(e) => {
                    debug!(location = %location, error = %e, "skipping unreadable artifact");
                    continue;
                }
            };
            if let Entry::Vacant(slot) = access.entry(location) {
                slot.insert(modified);
                seeded += 1;
            }
        }
        Ok(seeded)
    }

    // == Tracked ==
    /// Number of artifacts with an access record.
    pub fn tracked(&self) -> usize {
        self.access.read().len()
    }

    /// Last recorded access for a key, if any.
    pub fn last_access(&self, key: &str) -> Option<DateTime<Utc>> {
        self.access.read().get(&location_for(key)).copied()
    }

    fn record_access(&self, location: StorageLocation) {
        self.access.write().insert(location, Utc::now());
    }

    // == Evict ==
    /// Deletes tracked artifacts oldest first until `needed` more bytes fit
    /// or no candidates remain. Returns the number of files deleted.
    fn evict(&self, current: u64, needed: u64) -> usize {
        let mut access = self.access.write();

        let mut candidates = Vec::with_capacity(access.len());
        let mut vanished = Vec::new();
        for (location, last_access) in access.iter() {
            let path = self.path_of(location);
            match fs::metadata(&path) {
                Ok(meta) if meta.is_file() => candidates.push(EvictionCandidate {
                    location: location.clone(),
                    path,
                    last_access: *last_access,
                    size: meta.len(),
                }),
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => vanished.push(location.clone()),
                Err(e) => debug!(location = %location, error = %e, "cannot stat candidate"),
            }
        }
        for location in vanished {
            access.remove(&location);
        }

        let mut plan = EvictionPlan::new(current, needed, self.budget);
        let mut evicted = 0;
        for candidate in eviction_order(candidates) {
            if plan.satisfied() {
                break;
            }
            match fs::remove_file(&candidate.path) {
                Ok(()) => {
                    access.remove(&candidate.location);
                    plan.record_freed(candidate.size);
                    evicted += 1;
                    debug!(location = %candidate.location, size = candidate.size, "evicted artifact");
                }
                Err(e) => {
                    debug!(location = %candidate.location, error = %e, "eviction skipped");
                }
            }
        }

        info!(
            evicted,
            remaining_bytes = plan.current_size(),
            needed,
            budget = self.budget,
            "eviction pass complete"
        );
        if !plan.satisfied() {
            warn!(
                needed,
                budget = self.budget,
                "no evictable artifacts left, writing over budget"
            );
        }
        evicted
    }

    // == Scan ==
    /// Sums regular files in the cache directory. A missing directory is
    /// empty.
    fn scan(&self) -> Result<DiskUsage> {
        let mut usage = DiskUsage::new();
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(usage),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            match entry.metadata() {
                Ok(meta) if meta.is_file() => usage.record_file(meta.len()),
                Ok(_) => {}
                // Removed between listing and stat.
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(usage)
    }

    #[cfg(test)]
    fn record_access_at(&self, key: &str, at: DateTime<Utc>) {
        self.access.write().insert(location_for(key), at);
    }
}
