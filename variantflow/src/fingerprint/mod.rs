//! Content hashing for artifacts and upstream dependencies.
//!
//! The engine never interprets file contents; it only needs stable digests
//! to build workspace identities. Snapshotting is a trait so hosts with
//! their own virtual filesystem layer can plug it in.

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A sha-256 digest rendered as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HashDigest(String);

impl HashDigest {
    /// Wraps an already-computed hex digest.
    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Digest of empty input, used when a step declares no dependencies.
    #[must_use]
    pub fn empty() -> Self {
        Self(hex::encode(Sha256::digest([])))
    }

    /// The hex string backing the digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HashDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hashes arbitrary bytes.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> HashDigest {
    HashDigest(hex::encode(Sha256::digest(bytes)))
}

/// Hashes a sequence of string parts with separators, for composite keys.
#[must_use]
pub fn hash_parts<'a>(parts: impl IntoIterator<Item = &'a str>) -> HashDigest {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    HashDigest(hex::encode(hasher.finalize()))
}

/// Content snapshotting service.
///
/// Produces a digest covering a file's bytes, or a directory's relative
/// structure and contents. Two logically equal trees at different absolute
/// locations snapshot to the same digest.
pub trait Snapshotter: Send + Sync + fmt::Debug {
    /// Snapshots the file or directory at `path`.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the path cannot be read.
    fn snapshot(&self, path: &Path) -> io::Result<HashDigest>;
}

/// Default snapshotter reading straight from the filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSnapshotter;

impl FileSnapshotter {
    /// Creates the snapshotter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn hash_file_into(hasher: &mut Sha256, path: &Path) -> io::Result<()> {
        let mut file = fs::File::open(path)?;
        let mut buf = [0u8; 8192];
        loop {
            let read = file.read(&mut buf)?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        Ok(())
    }
}

impl Snapshotter for FileSnapshotter {
    fn snapshot(&self, path: &Path) -> io::Result<HashDigest> {
        let metadata = fs::metadata(path)?;
        let mut hasher = Sha256::new();

        if metadata.is_file() {
            Self::hash_file_into(&mut hasher, path)?;
            return Ok(HashDigest(hex::encode(hasher.finalize())));
        }

        // Directories hash as (relative path, content) pairs in sorted
        // order so the digest is independent of the absolute location.
        let mut entries: Vec<PathBuf> = WalkDir::new(path)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .collect();
        entries.sort();

        for entry in entries {
            let relative = entry
                .strip_prefix(path)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
            hasher.update(relative.to_string_lossy().as_bytes());
            hasher.update([0u8]);
            Self::hash_file_into(&mut hasher, &entry)?;
            hasher.update([0u8]);
        }
        Ok(HashDigest(hex::encode(hasher.finalize())))
    }
}

/// Combined fingerprint of a step's upstream dependency files.
///
/// Dependency order does not affect the fingerprint; individual file
/// digests are sorted before combining.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyFingerprint(HashDigest);

impl DependencyFingerprint {
    /// Fingerprint for a step that consumes no upstream dependencies.
    #[must_use]
    pub fn none() -> Self {
        Self(HashDigest::empty())
    }

    /// Snapshots and combines the given dependency files.
    ///
    /// # Errors
    ///
    /// Returns an IO error when any dependency cannot be read.
    pub fn of(snapshotter: &dyn Snapshotter, dependencies: &[PathBuf]) -> io::Result<Self> {
        if dependencies.is_empty() {
            return Ok(Self::none());
        }
        let mut digests: Vec<HashDigest> = dependencies
            .iter()
            .map(|dep| snapshotter.snapshot(dep))
            .collect::<io::Result<_>>()?;
        digests.sort();
        Ok(Self(hash_parts(digests.iter().map(HashDigest::as_str))))
    }

    /// The combined digest.
    #[must_use]
    pub fn digest(&self) -> &HashDigest {
        &self.0
    }
}
