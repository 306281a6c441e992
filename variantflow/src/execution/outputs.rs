//! Three-tag categorization of transform outputs.
//!
//! Outputs are stored relative to the input artifact or the workspace, not
//! as absolute paths. A cached result can therefore be replayed against any
//! input-artifact instance logically equal to the one originally executed
//! against: resolving the tags against the new instance yields analogous
//! paths.

use crate::errors::VariantFlowError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Wire prefix for outputs rooted at the input artifact.
const INPUT_PREFIX: &str = "i/";
/// Wire prefix for outputs rooted at the workspace output directory.
const WORKSPACE_PREFIX: &str = "o/";

/// One output of a transform execution, tagged by where it lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransformOutput {
    /// The whole input artifact was selected as an output.
    EntireInput,
    /// A location inside the input artifact, by relative path.
    InsideInput(String),
    /// A location inside the workspace output directory, by relative path.
    /// An empty path selects the whole directory.
    InWorkspace(String),
}

impl TransformOutput {
    /// Categorizes an absolute path registered by an action.
    ///
    /// Returns `None` when the path is neither the input artifact, inside
    /// it, nor inside the output directory — the caller turns that into a
    /// configuration error naming the step and artifact.
    #[must_use]
    pub fn categorize(path: &Path, input: &Path, output_dir: &Path) -> Option<Self> {
        if path == input {
            return Some(Self::EntireInput);
        }
        if path == output_dir {
            return Some(Self::InWorkspace(String::new()));
        }
        if let Ok(relative) = path.strip_prefix(output_dir) {
            return Some(Self::InWorkspace(relative.to_string_lossy().into_owned()));
        }
        if let Ok(relative) = path.strip_prefix(input) {
            return Some(Self::InsideInput(relative.to_string_lossy().into_owned()));
        }
        None
    }

    /// Resolves the tag against a concrete input instance and workspace.
    #[must_use]
    pub fn resolve(&self, input: &Path, output_dir: &Path) -> PathBuf {
        match self {
            Self::EntireInput => input.to_path_buf(),
            Self::InsideInput(relative) => input.join(relative),
            Self::InWorkspace(relative) if relative.is_empty() => output_dir.to_path_buf(),
            Self::InWorkspace(relative) => output_dir.join(relative),
        }
    }

    /// Encodes the tag for the persistent store.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::EntireInput => INPUT_PREFIX.to_string(),
            Self::InsideInput(relative) => format!("{INPUT_PREFIX}{relative}"),
            Self::InWorkspace(relative) => format!("{WORKSPACE_PREFIX}{relative}"),
        }
    }

    /// Decodes a stored tag.
    ///
    /// # Errors
    ///
    /// Returns an internal error for an unrecognized prefix; stored entries
    /// are written by this module only, so that indicates corruption.
    pub fn decode(encoded: &str) -> Result<Self, VariantFlowError> {
        if let Some(relative) = encoded.strip_prefix(INPUT_PREFIX) {
            if relative.is_empty() {
                return Ok(Self::EntireInput);
            }
            return Ok(Self::InsideInput(relative.to_string()));
        }
        if let Some(relative) = encoded.strip_prefix(WORKSPACE_PREFIX) {
            return Ok(Self::InWorkspace(relative.to_string()));
        }
        Err(VariantFlowError::Internal(format!(
            "cannot parse stored output path: {encoded}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_categorize_entire_input() {
        let out = TransformOutput::categorize(
            Path::new("/in/lib.jar"),
            Path::new("/in/lib.jar"),
            Path::new("/ws/out"),
        );
        assert_eq!(out, Some(TransformOutput::EntireInput));
    }

    #[test]
    fn test_categorize_inside_input_and_workspace() {
        let input = Path::new("/in/lib");
        let output_dir = Path::new("/ws/out");

        assert_eq!(
            TransformOutput::categorize(Path::new("/in/lib/META-INF/a.txt"), input, output_dir),
            Some(TransformOutput::InsideInput("META-INF/a.txt".into()))
        );
        assert_eq!(
            TransformOutput::categorize(Path::new("/ws/out/classes"), input, output_dir),
            Some(TransformOutput::InWorkspace("classes".into()))
        );
        assert_eq!(
            TransformOutput::categorize(output_dir, input, output_dir),
            Some(TransformOutput::InWorkspace(String::new()))
        );
    }

    #[test]
    fn test_categorize_rejects_foreign_paths() {
        let out = TransformOutput::categorize(
            Path::new("/tmp/elsewhere.txt"),
            Path::new("/in/lib.jar"),
            Path::new("/ws/out"),
        );
        assert_eq!(out, None);
    }

    #[test]
    fn test_encode_decode_round_trip_resolves_to_original_paths() {
        let input = Path::new("/in/lib");
        let output_dir = Path::new("/ws/out");
        let original = vec![
            PathBuf::from("/in/lib"),
            PathBuf::from("/in/lib/inner.txt"),
            PathBuf::from("/ws/out/produced.bin"),
        ];

        let tagged: Vec<TransformOutput> = original
            .iter()
            .map(|p| TransformOutput::categorize(p, input, output_dir).unwrap())
            .collect();
        let decoded: Vec<TransformOutput> = tagged
            .iter()
            .map(|t| TransformOutput::decode(&t.encode()).unwrap())
            .collect();
        let resolved: Vec<PathBuf> = decoded
            .iter()
            .map(|t| t.resolve(input, output_dir))
            .collect();

        assert_eq!(resolved, original);
    }

    #[test]
    fn test_resolution_against_equal_instance_yields_analogous_paths() {
        let tagged = vec![
            TransformOutput::EntireInput,
            TransformOutput::InsideInput("inner.txt".into()),
            TransformOutput::InWorkspace("produced.bin".into()),
        ];

        let resolved: Vec<PathBuf> = tagged
            .iter()
            .map(|t| t.resolve(Path::new("/other/copy-of-lib"), Path::new("/ws/out")))
            .collect();

        assert_eq!(
            resolved,
            vec![
                PathBuf::from("/other/copy-of-lib"),
                PathBuf::from("/other/copy-of-lib/inner.txt"),
                PathBuf::from("/ws/out/produced.bin"),
            ]
        );
    }

    #[test]
    fn test_bare_input_prefix_decodes_to_entire_input() {
        assert_eq!(TransformOutput::decode("i/").unwrap(), TransformOutput::EntireInput);
        assert_eq!(
            TransformOutput::decode("o/").unwrap(),
            TransformOutput::InWorkspace(String::new())
        );
    }

    #[test]
    fn test_unknown_prefix_is_rejected() {
        assert!(TransformOutput::decode("x/whatever").is_err());
    }
}
