//! Workspace directories granted to transform executions.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the directory an action may produce outputs into.
const OUTPUT_DIR_NAME: &str = "transformed";
/// Name of the file recording the execution's encoded result.
const RESULTS_FILE_NAME: &str = "results.json";

/// The on-disk area granted to one execution identity.
///
/// The workspace doubles as the persistent cache entry: a completed results
/// file marks the entry valid, and the produced outputs stay in place under
/// the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformWorkspace {
    root: PathBuf,
}

impl TransformWorkspace {
    /// Wraps the workspace rooted at `root`.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// The workspace root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The directory the action may write outputs into.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR_NAME)
    }

    /// The file holding the encoded execution result.
    #[must_use]
    pub fn results_file(&self) -> PathBuf {
        self.root.join(RESULTS_FILE_NAME)
    }

    /// True when a completed result is present.
    #[must_use]
    pub fn has_result(&self) -> bool {
        self.results_file().is_file()
    }

    /// Creates the workspace directories.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the directories cannot be created.
    pub fn ensure(&self) -> io::Result<()> {
        fs::create_dir_all(self.output_dir())
    }
}
