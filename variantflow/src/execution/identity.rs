//! Workspace identities: the cache keys of transform executions.

use crate::artifact::{InputArtifact, Provenance};
use crate::fingerprint::{hash_parts, DependencyFingerprint, HashDigest, Snapshotter};
use crate::registry::TransformStep;
use std::io;

/// Identifies one execution of one step on one input.
///
/// Equality fully determines cache-hit eligibility. Artifacts resolved from
/// outside the current build are content-addressed; artifacts produced
/// within it are path-addressed, because they may legitimately change
/// between builds while keeping the same location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WorkspaceIdentity {
    /// Content-addressed identity for external artifacts.
    Immutable {
        /// Normalized input name (content-equal inputs at different
        /// locations share it).
        input_name: String,
        /// Digest of the input artifact's contents.
        input_hash: HashDigest,
        /// The step's implementation/parameter hash.
        secondary_hash: HashDigest,
        /// Fingerprint of the upstream dependencies.
        dependencies_hash: HashDigest,
    },
    /// Path-addressed identity for artifacts produced in the build tree.
    Mutable {
        /// Absolute input location.
        input_path: String,
        /// The step's implementation/parameter hash.
        secondary_hash: HashDigest,
        /// Fingerprint of the upstream dependencies.
        dependencies_hash: HashDigest,
    },
}

impl WorkspaceIdentity {
    /// Computes the identity for executing `step` against `artifact`.
    ///
    /// Dependencies are only fingerprinted when the step declares it needs
    /// them; otherwise a stable empty fingerprint keeps identities of
    /// dependency-free steps unaffected by ambient dependency sets.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the input or a dependency cannot be read.
    pub fn for_execution(
        step: &TransformStep,
        artifact: &InputArtifact,
        snapshotter: &dyn Snapshotter,
    ) -> io::Result<Self> {
        let dependencies_hash = if step.capabilities().requires_dependencies {
            DependencyFingerprint::of(snapshotter, artifact.dependencies())?
                .digest()
                .clone()
        } else {
            DependencyFingerprint::none().digest().clone()
        };

        match artifact.provenance() {
            Provenance::External => Ok(Self::Immutable {
                input_name: artifact.name().to_string(),
                input_hash: snapshotter.snapshot(artifact.path())?,
                secondary_hash: step.secondary_hash().clone(),
                dependencies_hash,
            }),
            Provenance::Project => Ok(Self::Mutable {
                input_path: artifact.path().display().to_string(),
                secondary_hash: step.secondary_hash().clone(),
                dependencies_hash,
            }),
        }
    }

    /// The stable hex string naming this identity's workspace directory.
    #[must_use]
    pub fn uniq_string(&self) -> String {
        match self {
            Self::Immutable {
                input_name,
                input_hash,
                secondary_hash,
                dependencies_hash,
            } => hash_parts([
                "immutable",
                input_name.as_str(),
                input_hash.as_str(),
                secondary_hash.as_str(),
                dependencies_hash.as_str(),
            ])
            .as_str()
            .to_string(),
            Self::Mutable {
                input_path,
                secondary_hash,
                dependencies_hash,
            } => hash_parts([
                "mutable",
                input_path.as_str(),
                secondary_hash.as_str(),
                dependencies_hash.as_str(),
            ])
            .as_str()
            .to_string(),
        }
    }
}
