//! Error types for the variantflow engine.
//!
//! The taxonomy distinguishes configuration errors (a step declared an
//! invalid output), resolution errors (variant selection could not produce
//! an unambiguous answer), and execution failures (a step's action failed,
//! cached as a negative outcome). Infrastructure problems pass through as
//! plain IO errors.

use crate::attributes::AttributeContainer;
use thiserror::Error;

/// The main error type for variantflow operations.
#[derive(Debug, Error)]
pub enum VariantFlowError {
    /// A step declared an output outside the permitted locations.
    #[error("{0}")]
    InvalidOutput(#[from] InvalidOutputError),

    /// More than one producer variant directly satisfies a request.
    #[error("{0}")]
    AmbiguousVariants(#[from] AmbiguousVariantsError),

    /// No producer variant satisfies a request, directly or via transforms.
    #[error("{0}")]
    NoMatchingVariant(#[from] NoMatchingVariantError),

    /// Multiple transform chains satisfy a request and cannot be told apart.
    #[error("{0}")]
    AmbiguousTransform(#[from] AmbiguousTransformError),

    /// A transform step's action failed.
    #[error("{0}")]
    Execution(#[from] ExecutionFailure),

    /// IO error from the workspace or the persistent store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error in the persistent store.
    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error raised when a step registers an output that is neither the input
/// artifact, inside it, nor inside the granted workspace.
#[derive(Debug, Clone, Error)]
#[error("Transform '{step}' on '{artifact}' declared an invalid output: {path}")]
pub struct InvalidOutputError {
    /// The offending step's display name.
    pub step: String,
    /// The input artifact's display name.
    pub artifact: String,
    /// The rejected path (or a description of the missing declaration).
    pub path: String,
}

impl InvalidOutputError {
    /// Creates a new invalid output error.
    #[must_use]
    pub fn new(
        step: impl Into<String>,
        artifact: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            step: step.into(),
            artifact: artifact.into(),
            path: path.into(),
        }
    }
}

/// Error raised when more than one producer variant directly matches a
/// request. This is a configuration defect and is never auto-resolved.
#[derive(Debug, Clone, Error)]
#[error("Request {requested} matches multiple variants: {}", format_candidates(.candidates))]
pub struct AmbiguousVariantsError {
    /// The requested attributes.
    pub requested: AttributeContainer,
    /// Display names and attributes of every directly matching variant.
    pub candidates: Vec<(String, AttributeContainer)>,
}

impl AmbiguousVariantsError {
    /// Creates a new ambiguous match error.
    #[must_use]
    pub fn new(requested: AttributeContainer, candidates: Vec<(String, AttributeContainer)>) -> Self {
        Self {
            requested,
            candidates,
        }
    }
}

/// Error raised when neither a direct match nor a transform chain can
/// satisfy a request and empty results are not allowed.
#[derive(Debug, Clone, Error)]
#[error("No variant matches {requested}; available: {}", format_candidates(.available))]
pub struct NoMatchingVariantError {
    /// The requested attributes.
    pub requested: AttributeContainer,
    /// Display names and attributes of every variant that was considered.
    pub available: Vec<(String, AttributeContainer)>,
}

impl NoMatchingVariantError {
    /// Creates a new no-matching-variant error.
    #[must_use]
    pub fn new(requested: AttributeContainer, available: Vec<(String, AttributeContainer)>) -> Self {
        Self {
            requested,
            available,
        }
    }
}

/// Error raised when transform chain disambiguation leaves more than one
/// viable candidate.
#[derive(Debug, Clone, Error)]
#[error("Multiple transform chains produce {requested}: {}", format_candidates(.survivors))]
pub struct AmbiguousTransformError {
    /// The requested attributes.
    pub requested: AttributeContainer,
    /// Chain descriptions and resulting attributes of the surviving candidates.
    pub survivors: Vec<(String, AttributeContainer)>,
}

impl AmbiguousTransformError {
    /// Creates a new ambiguous transformation error.
    #[must_use]
    pub fn new(requested: AttributeContainer, survivors: Vec<(String, AttributeContainer)>) -> Self {
        Self {
            requested,
            survivors,
        }
    }
}

/// A failed transform execution.
///
/// Failures are first-class cache entries: once an identity has failed, all
/// later requests for it observe this same value without re-executing. The
/// type is therefore cheap to clone and carries only displayable state.
#[derive(Debug, Clone, Error)]
#[error("Execution failed for transform '{step}' on '{input}': {message}")]
pub struct ExecutionFailure {
    /// The step's display name.
    pub step: String,
    /// The input artifact's display name.
    pub input: String,
    /// The underlying failure rendered as text.
    pub message: String,
}

impl ExecutionFailure {
    /// Creates a new execution failure.
    #[must_use]
    pub fn new(step: impl Into<String>, input: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            input: input.into(),
            message: message.into(),
        }
    }
}

fn format_candidates(candidates: &[(String, AttributeContainer)]) -> String {
    candidates
        .iter()
        .map(|(name, attrs)| format!("'{name}' {attrs}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_variants_error_lists_candidates() {
        let requested = AttributeContainer::new().with("type", "jar");
        let err = AmbiguousVariantsError::new(
            requested,
            vec![
                ("runtime".to_string(), AttributeContainer::new().with("type", "jar")),
                ("api".to_string(), AttributeContainer::new().with("type", "jar")),
            ],
        );

        let rendered = err.to_string();
        assert!(rendered.contains("'runtime'"));
        assert!(rendered.contains("'api'"));
    }

    #[test]
    fn test_execution_failure_names_step_and_input() {
        let err = ExecutionFailure::new("minify", "library.jar", "boom");
        assert_eq!(
            err.to_string(),
            "Execution failed for transform 'minify' on 'library.jar': boom"
        );
    }

    #[test]
    fn test_invalid_output_error_display() {
        let err = InvalidOutputError::new("unpack", "library.jar", "/etc/passwd");
        assert!(err.to_string().contains("/etc/passwd"));
        assert!(err.to_string().contains("unpack"));
    }

    #[test]
    fn test_top_level_conversions() {
        let err: VariantFlowError = ExecutionFailure::new("a", "b", "c").into();
        assert!(matches!(err, VariantFlowError::Execution(_)));
    }
}
