//! Disk Usage Module
//!
//! Result of scanning the cache directory, and the plain-text report served
//! by the stats endpoint.

use std::fmt;

/// Bytes per reported megabyte.
pub const BYTES_PER_MB: u64 = 1024 * 1024;

// == Disk Usage ==
/// Total size and file count of the cache directory at scan time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskUsage {
    /// Sum of artifact file sizes in bytes
    pub total_bytes: u64,
    /// Number of files in the directory
    pub file_count: usize,
}

impl DiskUsage {
    /// Creates an empty usage record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one file of the given size.
    pub fn record_file(&mut self, size: u64) {
        self.total_bytes += size;
        self.file_count += 1;
    }

    /// Whole megabytes, rounded down.
    pub fn megabytes(&self) -> u64 {
        self.total_bytes / BYTES_PER_MB
    }
}

impl fmt::Display for DiskUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cache Size: {} bytes ({} MB)\nFiles: {}\n",
            self.total_bytes,
            self.megabytes(),
            self.file_count
        )
    }
}
