//! # Hasher Module
//!
//! Computes content digests of files.
//!
//! The digest depends only on the file's bytes, never on its name,
//! timestamps, or EXIF data. Files are streamed in fixed-size chunks so
//! large RAW files are never loaded into memory at once.
//!
//! ## Example
//! ```rust,ignore
//! use photo_orbit::core::hasher::hash_file;
//!
//! let digest = hash_file(&path)?;
//! println!("{}", digest);
//! ```

use crate::error::HashError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

/// Chunk size used when streaming file contents
pub const BUFFER_SIZE: usize = 64 * 1024;

/// BLAKE3 digest of a file's full byte content, stored as lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Hex representation of the digest
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for compact display
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl From<blake3::Hash> for ContentDigest {
    fn from(hash: blake3::Hash) -> Self {
        Self(hash.to_hex().to_string())
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stream a reader through BLAKE3 in [`BUFFER_SIZE`] chunks
pub fn hash_reader<R: Read>(mut reader: R) -> std::io::Result<ContentDigest> {
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().into())
}

/// Compute the content digest of a file
pub fn hash_file(path: &Path) -> Result<ContentDigest, HashError> {
    let file = File::open(path).map_err(|source| HashError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    hash_reader(file).map_err(|source| HashError::Io {
        path: path.to_path_buf(),
        source,
    })
}
