//! At-most-once transform execution per workspace identity.

use super::identity::WorkspaceIdentity;
use super::outputs::TransformOutput;
use super::store::{CacheStore, StoredOutcome};
use crate::artifact::InputArtifact;
use crate::errors::{ExecutionFailure, InvalidOutputError, VariantFlowError};
use crate::fingerprint::Snapshotter;
use crate::registry::{InputChanges, TransformContext, TransformStep};
use dashmap::DashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// The resolved result of one invocation: concrete output paths, or the
/// cached failure every waiter observes.
pub type InvocationResult = Result<Vec<PathBuf>, ExecutionFailure>;

/// A successful execution as cached in memory: tagged outputs plus the
/// workspace they were produced into. Resolution against a concrete input
/// instance happens at read time, so one cached value serves every
/// logically equal input.
#[derive(Debug, Clone)]
pub struct CachedOutputs {
    outputs: Vec<TransformOutput>,
    output_dir: PathBuf,
}

impl CachedOutputs {
    /// Resolves the tagged outputs against a concrete input location.
    #[must_use]
    pub fn resolve(&self, input: &std::path::Path) -> Vec<PathBuf> {
        self.outputs
            .iter()
            .map(|tag| tag.resolve(input, &self.output_dir))
            .collect()
    }
}

type SlotOutcome = Result<CachedOutputs, ExecutionFailure>;

/// A transform invocation that may already be resolved.
///
/// `cached_result` peeks without side effects; `resolve` either returns the
/// cached value or performs (or joins) the real execution. The split lets
/// callers skip listeners and scheduling work on cache hits.
pub enum Invocation {
    /// The outcome was already in the in-memory cache.
    Resolved(InvocationResult),
    /// The outcome requires (or is waiting on) a real execution.
    Pending(Pin<Box<dyn Future<Output = InvocationResult> + Send>>),
}

impl Invocation {
    /// The already-cached result, if any.
    #[must_use]
    pub fn cached_result(&self) -> Option<&InvocationResult> {
        match self {
            Self::Resolved(result) => Some(result),
            Self::Pending(_) => None,
        }
    }

    /// Resolves the invocation, executing if needed.
    pub async fn resolve(self) -> InvocationResult {
        match self {
            Self::Resolved(result) => result,
            Self::Pending(future) => future.await,
        }
    }
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolved(result) => f.debug_tuple("Resolved").field(result).finish(),
            Self::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// Executes transform steps with identity-level memoization.
///
/// Each workspace identity owns a single-flight slot: concurrent requests
/// for the same identity observe exactly one real execution, and the first
/// outcome — success or failure — is replayed to every later request.
#[derive(Debug, Clone)]
pub struct TransformInvoker {
    slots: Arc<DashMap<WorkspaceIdentity, Arc<OnceCell<SlotOutcome>>>>,
    store: Arc<CacheStore>,
    snapshotter: Arc<dyn Snapshotter>,
}

impl TransformInvoker {
    /// Creates an invoker over the given store and snapshotting service.
    #[must_use]
    pub fn new(store: Arc<CacheStore>, snapshotter: Arc<dyn Snapshotter>) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            store,
            snapshotter,
        }
    }

    /// Prepares an invocation of `step` against `artifact`.
    ///
    /// Returns [`Invocation::Resolved`] when the identity's outcome is
    /// already in memory, otherwise a pending invocation that joins the
    /// identity's single-flight slot when resolved.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the input cannot be snapshotted to compute
    /// the workspace identity.
    pub fn invoke_transform(
        &self,
        step: &Arc<TransformStep>,
        artifact: &InputArtifact,
    ) -> Result<Invocation, VariantFlowError> {
        let identity = WorkspaceIdentity::for_execution(step, artifact, self.snapshotter.as_ref())?;
        let slot = Arc::clone(
            self.slots
                .entry(identity.clone())
                .or_default()
                .value(),
        );

        if let Some(outcome) = slot.get() {
            return Ok(Invocation::Resolved(resolve_against(outcome, artifact)));
        }

        let step = Arc::clone(step);
        let artifact = artifact.clone();
        let store = Arc::clone(&self.store);
        let identity_string = identity.uniq_string();
        Ok(Invocation::Pending(Box::pin(async move {
            let outcome = slot
                .get_or_init(|| execute_once(step, artifact.clone(), identity_string, store))
                .await;
            resolve_against(outcome, &artifact)
        })))
    }

    /// Number of identities with an in-memory slot, for diagnostics.
    #[must_use]
    pub fn known_identities(&self) -> usize {
        self.slots.len()
    }
}

fn resolve_against(outcome: &SlotOutcome, artifact: &InputArtifact) -> InvocationResult {
    match outcome {
        Ok(cached) => Ok(cached.resolve(artifact.path())),
        Err(failure) => Err(failure.clone()),
    }
}

/// The single real execution for one identity.
///
/// Consults the persistent store first (cacheable steps only), then runs
/// the action inside its workspace, validates and tags the registered
/// outputs, and persists the outcome — failures included, so repeated
/// requests fail fast without re-executing.
async fn execute_once(
    step: Arc<TransformStep>,
    artifact: InputArtifact,
    identity_string: String,
    store: Arc<CacheStore>,
) -> SlotOutcome {
    let workspace = store.workspace(&identity_string);
    let cacheable = step.capabilities().cacheable;

    if cacheable {
        match store.load(&identity_string) {
            Ok(Some(stored)) => match decode_stored(&stored, workspace.output_dir()) {
                Ok(outcome) => return outcome,
                Err(err) => {
                    warn!(identity = identity_string, %err, "discarding unreadable cache entry");
                }
            },
            Ok(None) => {}
            Err(err) => {
                warn!(identity = identity_string, %err, "persistent cache lookup failed");
            }
        }
    }

    debug!(step = step.name(), input = artifact.name(), "executing transform");
    let outcome = run_action(&step, &artifact, &workspace).await;

    if cacheable {
        let stored = match &outcome {
            Ok(cached) => StoredOutcome::success(&cached.outputs),
            Err(failure) => StoredOutcome::Failure {
                step: failure.step.clone(),
                input: failure.input.clone(),
                message: failure.message.clone(),
            },
        };
        if let Err(err) = store.record(&identity_string, &stored) {
            warn!(identity = identity_string, %err, "failed to persist transform outcome");
        }
    }
    outcome
}

fn decode_stored(
    stored: &StoredOutcome,
    output_dir: PathBuf,
) -> Result<SlotOutcome, VariantFlowError> {
    match stored.decode_outputs()? {
        Some(outputs) => Ok(Ok(CachedOutputs {
            outputs,
            output_dir,
        })),
        None => match stored {
            StoredOutcome::Failure {
                step,
                input,
                message,
            } => Ok(Err(ExecutionFailure::new(step, input, message))),
            StoredOutcome::Success { .. } => Err(VariantFlowError::Internal(
                "success entry without outputs".into(),
            )),
        },
    }
}

async fn run_action(
    step: &Arc<TransformStep>,
    artifact: &InputArtifact,
    workspace: &super::workspace::TransformWorkspace,
) -> SlotOutcome {
    let failure = |message: String| ExecutionFailure::new(step.name(), artifact.name(), message);

    if let Err(err) = workspace.ensure() {
        return Err(failure(format!("could not create workspace: {err}")));
    }
    let output_dir = workspace.output_dir();
    let capabilities = step.capabilities();

    let dependencies = if capabilities.requires_dependencies {
        artifact.dependencies().to_vec()
    } else {
        Vec::new()
    };
    let input_changes = capabilities
        .requires_input_changes
        .then(|| InputChanges::full_rebuild(artifact.path()));

    let mut ctx = TransformContext::new(
        artifact.path().to_path_buf(),
        output_dir.clone(),
        dependencies,
        input_changes,
    );
    if let Err(err) = step.action().transform(&mut ctx).await {
        return Err(failure(err.to_string()));
    }

    let mut outputs = Vec::with_capacity(ctx.registered_outputs().len());
    for path in ctx.into_outputs() {
        let Some(tag) = TransformOutput::categorize(&path, artifact.path(), &output_dir) else {
            return Err(failure(
                InvalidOutputError::new(step.name(), artifact.name(), path.display().to_string())
                    .to_string(),
            ));
        };
        let resolved = tag.resolve(artifact.path(), &output_dir);
        if !resolved.exists() {
            return Err(failure(
                InvalidOutputError::new(
                    step.name(),
                    artifact.name(),
                    format!("{} (missing)", resolved.display()),
                )
                .to_string(),
            ));
        }
        outputs.push(tag);
    }

    Ok(CachedOutputs {
        outputs,
        output_dir,
    })
}
