//! The engine facade: one context object owning every cache layer.

use crate::artifact::InputArtifact;
use crate::attributes::{AttributeContainer, AttributeMatcher, MatchingCache, StrictMatcher};
use crate::chain::{ChainFinder, ChainMatch, TransformChain};
use crate::errors::VariantFlowError;
use crate::execution::{CacheStore, Invocation, TransformInvoker};
use crate::fingerprint::{FileSnapshotter, Snapshotter};
use crate::nodes::{NodeFactory, TransformNode};
use crate::registry::{TransformRegistry, TransformStep};
use crate::selector::{ProducerVariant, ResolvedVariants, VariantSelector};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Default bound on persisted cache entries before LRU eviction.
const DEFAULT_MAX_CACHE_ENTRIES: usize = 2048;

/// Configuration of a [`TransformEngine`].
#[derive(Clone)]
pub struct EngineConfig {
    /// Root directory of the persistent execution cache.
    pub cache_dir: PathBuf,
    /// Entry bound for LRU eviction of the persistent cache.
    pub max_cache_entries: usize,
    /// The attribute compatibility oracle.
    pub matcher: Arc<dyn AttributeMatcher>,
    /// The content snapshotting service feeding workspace identities.
    pub snapshotter: Arc<dyn Snapshotter>,
}

impl EngineConfig {
    /// Configuration with the strict oracle and file snapshotting.
    #[must_use]
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            max_cache_entries: DEFAULT_MAX_CACHE_ENTRIES,
            matcher: Arc::new(StrictMatcher),
            snapshotter: Arc::new(FileSnapshotter::new()),
        }
    }

    /// Overrides the eviction bound.
    #[must_use]
    pub fn with_max_cache_entries(mut self, max_cache_entries: usize) -> Self {
        self.max_cache_entries = max_cache_entries;
        self
    }

    /// Overrides the compatibility oracle.
    #[must_use]
    pub fn with_matcher(mut self, matcher: Arc<dyn AttributeMatcher>) -> Self {
        self.matcher = matcher;
        self
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("cache_dir", &self.cache_dir)
            .field("max_cache_entries", &self.max_cache_entries)
            .finish_non_exhaustive()
    }
}

/// The resolution and execution context of one build session.
///
/// Owns every cache layer: the oracle memo, the chain-discovery memo, the
/// node graph and the execution caches. All layers are safe to share
/// across tasks; the engine itself is cheap to clone via `Arc` internals.
#[derive(Debug, Clone)]
pub struct TransformEngine {
    registry: TransformRegistry,
    finder: ChainFinder,
    selector: VariantSelector,
    invoker: TransformInvoker,
    nodes: Arc<NodeFactory>,
}

impl TransformEngine {
    /// Creates an engine over the registered steps.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the persistent cache directory cannot be
    /// created.
    pub fn new(registry: TransformRegistry, config: &EngineConfig) -> io::Result<Self> {
        let store = Arc::new(CacheStore::open(
            &config.cache_dir,
            config.max_cache_entries,
        )?);
        let matching = MatchingCache::new(Arc::clone(&config.matcher));
        let finder = ChainFinder::new(registry.clone(), matching.clone());
        info!(
            steps = registry.len(),
            cache_dir = %config.cache_dir.display(),
            "transform engine ready"
        );
        Ok(Self {
            registry,
            selector: VariantSelector::new(finder.clone(), matching),
            finder,
            invoker: TransformInvoker::new(store, Arc::clone(&config.snapshotter)),
            nodes: Arc::new(NodeFactory::new()),
        })
    }

    /// The registered transform steps.
    #[must_use]
    pub fn registry(&self) -> &TransformRegistry {
        &self.registry
    }

    /// Minimal-depth chains converting one of `sources` into `requested`.
    #[must_use]
    pub fn find_transform_chains(
        &self,
        sources: &[AttributeContainer],
        requested: &AttributeContainer,
    ) -> Arc<Vec<ChainMatch>> {
        self.finder.find_transform_chains(sources, requested)
    }

    /// Selects one variant (direct or transformed) for `requested`.
    ///
    /// # Errors
    ///
    /// Propagates selection errors; see [`VariantSelector::select_artifacts`].
    pub fn select_artifacts(
        &self,
        variants: &[ProducerVariant],
        requested: &AttributeContainer,
        allow_empty: bool,
    ) -> Result<ResolvedVariants, VariantFlowError> {
        self.selector.select_artifacts(variants, requested, allow_empty)
    }

    /// Prepares a single-step invocation against the execution caches.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the input cannot be snapshotted.
    pub fn invoke_transform(
        &self,
        step: &Arc<TransformStep>,
        artifact: &InputArtifact,
    ) -> Result<Invocation, VariantFlowError> {
        self.invoker.invoke_transform(step, artifact)
    }

    /// Builds (or reuses) the node graph applying `chain` to `artifact`.
    #[must_use]
    pub fn build_transform_nodes(
        &self,
        artifact: &InputArtifact,
        chain: &TransformChain,
    ) -> Arc<TransformNode> {
        self.nodes.node_for(artifact, chain)
    }

    /// Executes a previously built node graph.
    ///
    /// # Errors
    ///
    /// Returns the failure of the first failing step.
    pub async fn execute(&self, node: &TransformNode) -> Result<Vec<PathBuf>, VariantFlowError> {
        node.execute(&self.invoker).await.map_err(Into::into)
    }

    /// Selects and, when a chain is involved, executes: the end-to-end
    /// path from a request to concrete files.
    ///
    /// # Errors
    ///
    /// Propagates selection errors and execution failures.
    pub async fn resolve_artifacts(
        &self,
        variants: &[ProducerVariant],
        requested: &AttributeContainer,
        allow_empty: bool,
    ) -> Result<Vec<PathBuf>, VariantFlowError> {
        match self.select_artifacts(variants, requested, allow_empty)? {
            ResolvedVariants::Direct(variant) => Ok(vec![variant.artifact().path().to_path_buf()]),
            ResolvedVariants::Transformed(transformed) => {
                let node =
                    self.build_transform_nodes(transformed.source().artifact(), transformed.chain());
                self.execute(&node).await
            }
            ResolvedVariants::Empty => Ok(Vec::new()),
        }
    }
}
