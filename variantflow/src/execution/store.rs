//! The persistent execution cache.
//!
//! Entries live under one root directory, one workspace per identity
//! string. Mutations happen under an on-demand cross-process lock file;
//! pure lookups read without taking the lock. Access times feed a journal
//! used for least-recently-used eviction once the entry count exceeds the
//! configured bound.

use super::outputs::TransformOutput;
use super::workspace::TransformWorkspace;
use crate::errors::VariantFlowError;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tracing::{debug, trace, warn};

const LOCK_FILE_NAME: &str = ".lock";
const JOURNAL_FILE_NAME: &str = "journal.json";
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(10);
const LOCK_WARN_AFTER_RETRIES: u32 = 50;
const LOCK_GIVE_UP_AFTER_RETRIES: u32 = 200;

/// A stored execution outcome: tagged outputs on success, the failure
/// rendered as displayable parts otherwise. Failures are valid, stable
/// entries — never reasons to retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StoredOutcome {
    /// Successful execution with its encoded output tags.
    Success {
        /// Encoded [`TransformOutput`] tags in registration order.
        outputs: Vec<String>,
    },
    /// Failed execution, replayed to every later requester.
    Failure {
        /// The failing step's display name.
        step: String,
        /// The input artifact's display name.
        input: String,
        /// The failure rendered as text.
        message: String,
    },
}

impl StoredOutcome {
    /// Encodes a successful output list.
    #[must_use]
    pub fn success(outputs: &[TransformOutput]) -> Self {
        Self::Success {
            outputs: outputs.iter().map(TransformOutput::encode).collect(),
        }
    }

    /// Decodes the output tags of a success entry.
    ///
    /// # Errors
    ///
    /// Returns an error when a stored tag cannot be parsed.
    pub fn decode_outputs(&self) -> Result<Option<Vec<TransformOutput>>, VariantFlowError> {
        match self {
            Self::Success { outputs } => Ok(Some(
                outputs
                    .iter()
                    .map(|o| TransformOutput::decode(o))
                    .collect::<Result<_, _>>()?,
            )),
            Self::Failure { .. } => Ok(None),
        }
    }
}

/// Exclusive cross-process guard around store mutations.
///
/// Implemented as a lock file created with `create_new`; the holder's drop
/// removes it. Contending processes retry with a short delay, but the wait
/// is bounded: a lock file orphaned by a crashed holder surfaces as a
/// timeout error instead of spinning forever.
struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    fn acquire(root: &Path) -> io::Result<Self> {
        let path = root.join(LOCK_FILE_NAME);
        let mut retries: u32 = 0;
        loop {
            match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(Self { path }),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    retries += 1;
                    if retries == LOCK_WARN_AFTER_RETRIES {
                        warn!(lock = %path.display(), "still waiting for store lock");
                    }
                    if retries >= LOCK_GIVE_UP_AFTER_RETRIES {
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!(
                                "store lock at {} still held after {:?}; \
                                 remove the file if its holder crashed",
                                path.display(),
                                LOCK_RETRY_DELAY * LOCK_GIVE_UP_AFTER_RETRIES,
                            ),
                        ));
                    }
                    std::thread::sleep(LOCK_RETRY_DELAY);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), %err, "failed to release store lock");
        }
    }
}

/// The on-disk execution cache with LRU eviction.
#[derive(Debug)]
pub struct CacheStore {
    root: PathBuf,
    max_entries: usize,
    /// Access times observed by this process; merged into the persisted
    /// journal on the next mutation, so lock-free reads still refresh LRU
    /// tracking.
    recent_access: DashMap<String, i64>,
    /// Last access time handed out, kept strictly increasing so two
    /// accesses within one millisecond still have a defined LRU order.
    clock: AtomicI64,
}

impl CacheStore {
    /// Opens (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the root directory cannot be created.
    pub fn open(root: impl Into<PathBuf>, max_entries: usize) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            max_entries,
            recent_access: DashMap::new(),
            clock: AtomicI64::new(0),
        })
    }

    /// The workspace granted to (and the cache entry of) an identity.
    #[must_use]
    pub fn workspace(&self, identity: &str) -> TransformWorkspace {
        TransformWorkspace::new(self.root.join(identity))
    }

    /// Looks up a persisted outcome without taking the store lock.
    ///
    /// A hit refreshes the identity's access time.
    ///
    /// # Errors
    ///
    /// Returns an error when an existing entry cannot be read or parsed.
    pub fn load(&self, identity: &str) -> Result<Option<StoredOutcome>, VariantFlowError> {
        let workspace = self.workspace(identity);
        if !workspace.has_result() {
            return Ok(None);
        }
        let raw = fs::read_to_string(workspace.results_file())?;
        let outcome: StoredOutcome = serde_json::from_str(&raw)?;
        self.touch(identity);
        trace!(identity, "persistent cache hit");
        Ok(Some(outcome))
    }

    /// Persists an outcome under `identity` and evicts stale entries.
    ///
    /// The write happens under the cross-process lock and lands via a
    /// temporary file so a concurrent lock-free reader never observes a
    /// half-written results file.
    ///
    /// # Errors
    ///
    /// Returns an error when the entry cannot be written.
    pub fn record(&self, identity: &str, outcome: &StoredOutcome) -> Result<(), VariantFlowError> {
        let workspace = self.workspace(identity);
        workspace.ensure()?;
        self.touch(identity);

        let _lock = StoreLock::acquire(&self.root)?;
        let encoded = serde_json::to_string_pretty(outcome)?;
        let staging = workspace.root().join("results.json.tmp");
        fs::write(&staging, encoded)?;
        fs::rename(&staging, workspace.results_file())?;
        debug!(identity, "recorded transform outcome");

        let mut journal = self.read_journal();
        self.merge_recent_access(&mut journal);
        self.evict_over_capacity(&mut journal);
        self.write_journal(&journal)?;
        Ok(())
    }

    /// Records an access time for `identity` in this process.
    pub fn touch(&self, identity: &str) {
        self.recent_access
            .insert(identity.to_string(), self.next_access_time());
    }

    fn next_access_time(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.clock.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self
                .clock
                .compare_exchange(prev, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    /// Number of completed entries currently on disk.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the root cannot be listed.
    pub fn entry_count(&self) -> io::Result<usize> {
        let mut count = 0;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir()
                && TransformWorkspace::new(entry.path()).has_result()
            {
                count += 1;
            }
        }
        Ok(count)
    }

    fn journal_path(&self) -> PathBuf {
        self.root.join(JOURNAL_FILE_NAME)
    }

    fn read_journal(&self) -> BTreeMap<String, i64> {
        let Ok(raw) = fs::read_to_string(self.journal_path()) else {
            return BTreeMap::new();
        };
        serde_json::from_str(&raw).unwrap_or_default()
    }

    fn write_journal(&self, journal: &BTreeMap<String, i64>) -> Result<(), VariantFlowError> {
        let encoded = serde_json::to_string(journal)?;
        fs::write(self.journal_path(), encoded)?;
        Ok(())
    }

    fn merge_recent_access(&self, journal: &mut BTreeMap<String, i64>) {
        for entry in self.recent_access.iter() {
            let at = *entry.value();
            journal
                .entry(entry.key().clone())
                .and_modify(|existing| *existing = (*existing).max(at))
                .or_insert(at);
        }
    }

    /// Removes least-recently-used entries until the count fits the bound.
    fn evict_over_capacity(&self, journal: &mut BTreeMap<String, i64>) {
        let completed: Vec<String> = journal
            .keys()
            .filter(|identity| self.workspace(identity).has_result())
            .cloned()
            .collect();
        if completed.len() <= self.max_entries {
            return;
        }

        let mut by_age: Vec<(i64, String)> = completed
            .into_iter()
            .map(|identity| (journal.get(&identity).copied().unwrap_or(0), identity))
            .collect();
        by_age.sort();

        let excess = by_age.len() - self.max_entries;
        for (_, identity) in by_age.into_iter().take(excess) {
            let workspace = self.workspace(&identity);
            if let Err(err) = fs::remove_dir_all(workspace.root()) {
                warn!(identity, %err, "failed to evict cache entry");
                continue;
            }
            journal.remove(&identity);
            self.recent_access.remove(&identity);
            debug!(identity, "evicted least-recently-used cache entry");
        }
    }
}
