//! Content Addressing Module
//!
//! Maps a cache key (the request URL) to the file name its artifact is
//! stored under.

use std::fmt;

use sha2::{Digest, Sha256};

// == Storage Location ==
/// Lowercase hex SHA-256 digest of a cache key.
///
/// Used verbatim as the artifact's file name inside the cache directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageLocation(String);

impl StorageLocation {
    /// Returns the hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accepts a file name only if it has the shape of a stored digest.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let valid = name.len() == 64
            && name
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(name.to_string()))
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageLocation {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// == Location For ==
/// Computes the storage location for a cache key.
///
/// Hashes the UTF-8 bytes of the key, so the result is independent of
/// locale, platform and process.
pub fn location_for(key: &str) -> StorageLocation {
    let digest = Sha256::digest(key.as_bytes());
    StorageLocation(digest.iter().map(|b| format!("{b:02x}")).collect())
}
