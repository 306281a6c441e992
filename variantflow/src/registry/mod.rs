//! Transform step registration.
//!
//! Steps are registered once at configuration time and the registry is
//! immutable afterwards. A step pairs a source attribute pattern with a
//! target attribute delta and an opaque action; capability differences are
//! expressed as explicit flags rather than as distinct step types.

use crate::attributes::AttributeContainer;
use crate::fingerprint::{hash_parts, HashDigest};
use async_trait::async_trait;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Error raised when a transform registration is rejected.
#[derive(Debug, Clone, Error)]
#[error("Could not register transform '{name}': {reason}")]
pub struct RegistrationError {
    /// The rejected step's display name.
    pub name: String,
    /// Why the registration is invalid.
    pub reason: String,
}

impl RegistrationError {
    fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Incremental-change information handed to actions that request it.
#[derive(Debug, Clone)]
pub struct InputChanges {
    /// False on the first execution in a fresh workspace; the action must
    /// process the whole input.
    pub incremental: bool,
    /// Files reported as changed since the previous execution.
    pub changed_files: Vec<PathBuf>,
}

impl InputChanges {
    /// Change info for a fresh workspace: everything counts as changed.
    #[must_use]
    pub fn full_rebuild(input: &Path) -> Self {
        Self {
            incremental: false,
            changed_files: vec![input.to_path_buf()],
        }
    }
}

/// Execution context handed to a transform action.
///
/// The action reads its input and dependencies from here and registers
/// every output it produces. Registered paths are validated after the
/// action returns; anything outside the input artifact or the granted
/// workspace is a configuration error.
#[derive(Debug)]
pub struct TransformContext {
    input: PathBuf,
    output_dir: PathBuf,
    dependencies: Vec<PathBuf>,
    input_changes: Option<InputChanges>,
    registered: Vec<PathBuf>,
}

impl TransformContext {
    /// Creates a context for one execution.
    #[must_use]
    pub fn new(
        input: PathBuf,
        output_dir: PathBuf,
        dependencies: Vec<PathBuf>,
        input_changes: Option<InputChanges>,
    ) -> Self {
        Self {
            input,
            output_dir,
            dependencies,
            input_changes,
            registered: Vec::new(),
        }
    }

    /// The input artifact's location.
    #[must_use]
    pub fn input(&self) -> &Path {
        &self.input
    }

    /// Directory the action may produce outputs into.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Upstream dependency files, empty unless the step requires them.
    #[must_use]
    pub fn dependencies(&self) -> &[PathBuf] {
        &self.dependencies
    }

    /// Incremental-change info, present only for steps that request it.
    #[must_use]
    pub fn input_changes(&self) -> Option<&InputChanges> {
        self.input_changes.as_ref()
    }

    /// Registers a produced (or selected) output location.
    pub fn register_output(&mut self, path: impl Into<PathBuf>) {
        self.registered.push(path.into());
    }

    /// The outputs registered so far, in registration order.
    #[must_use]
    pub fn registered_outputs(&self) -> &[PathBuf] {
        &self.registered
    }

    /// Consumes the context, yielding the registered outputs.
    #[must_use]
    pub fn into_outputs(self) -> Vec<PathBuf> {
        self.registered
    }
}

/// The executable part of a transform step.
///
/// Implementations must be deterministic with respect to their fingerprint:
/// two actions with equal fingerprints are assumed to produce equal outputs
/// for equal inputs, which is what makes cached results reusable.
#[async_trait]
pub trait TransformAction: Send + Sync + Debug {
    /// Human-readable name used in diagnostics.
    fn display_name(&self) -> &str;

    /// Stable identity of the implementation and its parameters.
    ///
    /// Feeds the workspace identity; changing the fingerprint invalidates
    /// every cached execution of this action.
    fn fingerprint(&self) -> HashDigest;

    /// Runs the transform.
    ///
    /// # Errors
    ///
    /// Any error is captured as a failed outcome and cached under the
    /// execution's workspace identity.
    async fn transform(&self, ctx: &mut TransformContext) -> anyhow::Result<()>;
}

/// Capability flags of a registered step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepCapabilities {
    /// The action consumes the upstream dependencies of its input.
    pub requires_dependencies: bool,
    /// Results may be persisted to the cross-build store.
    pub cacheable: bool,
    /// The action wants incremental-change information.
    pub requires_input_changes: bool,
}

impl Default for StepCapabilities {
    fn default() -> Self {
        Self {
            requires_dependencies: false,
            cacheable: true,
            requires_input_changes: false,
        }
    }
}

/// A registered transform step.
///
/// Immutable once registered; equality is by id.
#[derive(Debug)]
pub struct TransformStep {
    id: Uuid,
    name: String,
    from: AttributeContainer,
    to: AttributeContainer,
    action: Arc<dyn TransformAction>,
    capabilities: StepCapabilities,
    secondary_hash: HashDigest,
}

impl TransformStep {
    fn new(
        name: String,
        from: AttributeContainer,
        to: AttributeContainer,
        action: Arc<dyn TransformAction>,
        capabilities: StepCapabilities,
    ) -> Self {
        // Implementation, parameters, both attribute patterns and the flags
        // all feed the secondary-inputs hash used by workspace identities.
        let secondary_hash = hash_parts([
            action.fingerprint().as_str(),
            from.signature().as_str(),
            to.signature().as_str(),
            if capabilities.requires_dependencies { "deps" } else { "" },
            if capabilities.requires_input_changes { "incremental" } else { "" },
        ]);
        Self {
            id: Uuid::new_v4(),
            name,
            from,
            to,
            action,
            capabilities,
            secondary_hash,
        }
    }

    /// The step's registration identity.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The step's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source attribute pattern a feeding variant must satisfy.
    #[must_use]
    pub fn from_attributes(&self) -> &AttributeContainer {
        &self.from
    }

    /// Target attribute delta applied on top of the source attributes.
    #[must_use]
    pub fn to_attributes(&self) -> &AttributeContainer {
        &self.to
    }

    /// The step's executable action.
    #[must_use]
    pub fn action(&self) -> &Arc<dyn TransformAction> {
        &self.action
    }

    /// The step's capability flags.
    #[must_use]
    pub fn capabilities(&self) -> StepCapabilities {
        self.capabilities
    }

    /// Combined implementation/parameter hash (the "secondary inputs").
    #[must_use]
    pub fn secondary_hash(&self) -> &HashDigest {
        &self.secondary_hash
    }
}

impl PartialEq for TransformStep {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TransformStep {}

/// The immutable set of registered transform steps.
#[derive(Debug, Clone)]
pub struct TransformRegistry {
    steps: Arc<[Arc<TransformStep>]>,
}

impl TransformRegistry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// All registered steps, in registration order.
    #[must_use]
    pub fn steps(&self) -> &[Arc<TransformStep>] {
        &self.steps
    }

    /// Number of registered steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Builder collecting registrations before freezing them.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    steps: Vec<Arc<TransformStep>>,
}

impl RegistryBuilder {
    /// Registers a step with default capabilities.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty attribute pattern or a step that does
    /// not change attributes at all.
    pub fn register(
        self,
        name: impl Into<String>,
        from: AttributeContainer,
        to: AttributeContainer,
        action: Arc<dyn TransformAction>,
    ) -> Result<Self, RegistrationError> {
        self.register_with(name, from, to, action, StepCapabilities::default())
    }

    /// Registers a step with explicit capabilities.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty attribute pattern or a step that does
    /// not change attributes at all.
    pub fn register_with(
        mut self,
        name: impl Into<String>,
        from: AttributeContainer,
        to: AttributeContainer,
        action: Arc<dyn TransformAction>,
        capabilities: StepCapabilities,
    ) -> Result<Self, RegistrationError> {
        let name = name.into();
        if from.is_empty() {
            return Err(RegistrationError::new(name, "source attributes must not be empty"));
        }
        if to.is_empty() {
            return Err(RegistrationError::new(name, "target attributes must not be empty"));
        }
        if from == to {
            return Err(RegistrationError::new(
                name,
                "source and target attributes must differ",
            ));
        }
        self.steps
            .push(Arc::new(TransformStep::new(name, from, to, action, capabilities)));
        Ok(self)
    }

    /// Freezes the registrations.
    #[must_use]
    pub fn build(self) -> TransformRegistry {
        TransformRegistry {
            steps: self.steps.into(),
        }
    }
}
