//! Input artifacts and their provenance.

use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Where an artifact comes from, decided once and carried with it.
///
/// Provenance selects the workspace identity kind: artifacts from outside
/// the current build are content-addressed, artifacts produced inside it
/// are path-addressed because they may legitimately change between builds
/// while keeping the same location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provenance {
    /// Resolved from an external component; immutable for this build.
    External,
    /// Produced by the current build tree; mutable between builds.
    Project,
}

/// A concrete artifact fed into a transform chain.
#[derive(Debug, Clone)]
pub struct InputArtifact {
    /// Stable identity within this build session, used for node dedup.
    id: Uuid,
    /// Display name (typically the file name).
    name: String,
    /// Absolute location of the artifact.
    path: PathBuf,
    /// Origin classification.
    provenance: Provenance,
    /// Upstream dependency files handed to steps that request them.
    dependencies: Vec<PathBuf>,
}

impl InputArtifact {
    /// Creates an artifact with a fresh session id.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, provenance: Provenance) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Self {
            id: Uuid::new_v4(),
            name,
            path,
            provenance,
            dependencies: Vec::new(),
        }
    }

    /// Attaches upstream dependency files.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<PathBuf>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// The artifact's session identity.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The artifact's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The artifact's absolute location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The artifact's provenance tag.
    #[must_use]
    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// Upstream dependency files.
    #[must_use]
    pub fn dependencies(&self) -> &[PathBuf] {
        &self.dependencies
    }

    /// Derives an artifact for an intermediate file produced by a chained
    /// step, keeping the parent's session id, provenance and dependencies.
    ///
    /// Keeping the id means all intermediates of one root artifact share a
    /// dedup lineage; the path alone distinguishes fan-out siblings.
    #[must_use]
    pub fn derived(&self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Self {
            id: self.id,
            name,
            path,
            provenance: self.provenance,
            dependencies: self.dependencies.clone(),
        }
    }
}
