//! The deduplicated transform node graph.
//!
//! One node represents "apply this step to the outputs of that upstream
//! work" for a concrete root artifact. Nodes are interned per
//! `(artifact, step prefix)`, so two chains sharing a prefix share the
//! prefix's nodes, their single-assignment results included. This layer is
//! independent of the invoker's identity cache: node dedup avoids even
//! asking the invoker twice, while the identity cache catches logically
//! equal work arriving through different node graphs.

use crate::artifact::InputArtifact;
use crate::chain::TransformChain;
use crate::errors::ExecutionFailure;
use crate::execution::{InvocationResult, TransformInvoker};
use crate::registry::TransformStep;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

/// Where a node's inputs come from.
#[derive(Debug)]
enum NodeSource {
    /// First step of a chain, fed by the root artifact itself.
    Initial(InputArtifact),
    /// Later step, fed by every output file of the upstream node.
    Chained(Arc<TransformNode>),
}

/// One unit of transform work in the graph.
///
/// Holds a single-assignment result slot: the node computes its outputs at
/// most once, and every chain sharing this node observes the same outcome.
#[derive(Debug)]
pub struct TransformNode {
    step: Arc<TransformStep>,
    source: NodeSource,
    result: OnceCell<InvocationResult>,
}

impl TransformNode {
    fn initial(step: Arc<TransformStep>, artifact: InputArtifact) -> Self {
        Self {
            step,
            source: NodeSource::Initial(artifact),
            result: OnceCell::new(),
        }
    }

    fn chained(step: Arc<TransformStep>, upstream: Arc<TransformNode>) -> Self {
        Self {
            step,
            source: NodeSource::Chained(upstream),
            result: OnceCell::new(),
        }
    }

    /// The step this node applies.
    #[must_use]
    pub fn step(&self) -> &Arc<TransformStep> {
        &self.step
    }

    /// The upstream node this one consumes, if any.
    #[must_use]
    pub fn upstream(&self) -> Option<&Arc<TransformNode>> {
        match &self.source {
            NodeSource::Initial(_) => None,
            NodeSource::Chained(upstream) => Some(upstream),
        }
    }

    /// The root artifact feeding this node's chain.
    #[must_use]
    pub fn root_artifact(&self) -> &InputArtifact {
        let mut node = self;
        loop {
            match &node.source {
                NodeSource::Initial(artifact) => return artifact,
                NodeSource::Chained(upstream) => node = upstream,
            }
        }
    }

    /// The node's already-computed result, if it ran.
    #[must_use]
    pub fn result(&self) -> Option<&InvocationResult> {
        self.result.get()
    }

    /// Executes this node, running upstream nodes first as needed.
    ///
    /// The upstream walk is iterative: nodes are collected back to the root
    /// and executed in application order, each through its own result slot.
    /// A failing node short-circuits everything downstream of it.
    ///
    /// # Errors
    ///
    /// Returns the (possibly replayed) failure of the first failing step.
    pub async fn execute(&self, invoker: &TransformInvoker) -> InvocationResult {
        let mut stack = Vec::new();
        let mut node = self;
        loop {
            stack.push(node);
            match &node.source {
                NodeSource::Initial(_) => break,
                NodeSource::Chained(upstream) => node = upstream,
            }
        }

        let mut upstream_files: Option<Vec<std::path::PathBuf>> = None;
        for node in stack.into_iter().rev() {
            let produced = node
                .result
                .get_or_init(|| node.run(invoker, upstream_files.take()))
                .await
                .clone()?;
            upstream_files = Some(produced);
        }
        Ok(upstream_files.unwrap_or_default())
    }

    /// One real computation of this node: invoke the step per input file
    /// (concurrently for fan-out siblings) and concatenate the outputs in
    /// input order.
    async fn run(
        &self,
        invoker: &TransformInvoker,
        upstream_files: Option<Vec<std::path::PathBuf>>,
    ) -> InvocationResult {
        let inputs = match &self.source {
            NodeSource::Initial(artifact) => vec![artifact.clone()],
            NodeSource::Chained(_) => {
                let root = self.root_artifact();
                upstream_files
                    .unwrap_or_default()
                    .into_iter()
                    .map(|file| root.derived(file))
                    .collect()
            }
        };

        let mut invocations = Vec::with_capacity(inputs.len());
        for input in &inputs {
            invocations.push(invoker.invoke_transform(&self.step, input).map_err(|err| {
                ExecutionFailure::new(self.step.name(), input.name(), err.to_string())
            })?);
        }

        let mut outputs = Vec::new();
        for produced in futures::future::join_all(
            invocations.into_iter().map(crate::execution::Invocation::resolve),
        )
        .await
        {
            outputs.extend(produced?);
        }
        Ok(outputs)
    }
}

/// Interning key: root artifact session id plus the step-id prefix.
type NodeKey = (Uuid, Vec<Uuid>);

/// Interns transform nodes per `(artifact, step prefix)`.
#[derive(Debug, Default)]
pub struct NodeFactory {
    nodes: DashMap<NodeKey, Arc<TransformNode>>,
}

impl NodeFactory {
    /// Creates an empty factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds (or reuses) the node graph applying `chain` to `artifact`,
    /// returning the terminal node.
    ///
    /// Every prefix of the chain is interned independently, so a later
    /// chain extending an already-built one reuses all existing nodes.
    #[must_use]
    pub fn node_for(&self, artifact: &InputArtifact, chain: &TransformChain) -> Arc<TransformNode> {
        let steps = chain.steps();
        let mut prefix = Vec::with_capacity(steps.len());
        let mut current: Option<Arc<TransformNode>> = None;

        for step in steps {
            prefix.push(step.id());
            let key = (artifact.id(), prefix.clone());
            let upstream = current.take();
            let node = self
                .nodes
                .entry(key)
                .or_insert_with(|| {
                    Arc::new(match upstream {
                        None => TransformNode::initial(Arc::clone(&step), artifact.clone()),
                        Some(upstream) => TransformNode::chained(Arc::clone(&step), upstream),
                    })
                })
                .value()
                .clone();
            current = Some(node);
        }

        current.unwrap_or_else(|| unreachable!("chains are never empty"))
    }

    /// Number of interned nodes, for diagnostics.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Provenance;
    use crate::attributes::AttributeContainer;
    use crate::execution::CacheStore;
    use crate::fingerprint::{hash_parts, FileSnapshotter, HashDigest};
    use crate::registry::{TransformAction, TransformContext, TransformRegistry};
    use crate::testing::{attrs, registry_with_action, CountingAction};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chain_of(registry: &TransformRegistry, targets: &[AttributeContainer]) -> TransformChain {
        let steps = registry.steps();
        let mut chain = TransformChain::initial(Arc::clone(&steps[0]), targets[0].clone());
        for (step, target) in steps[1..].iter().zip(&targets[1..]) {
            chain = chain.extended(Arc::clone(step), target.clone());
        }
        chain
    }

    fn invoker_in(dir: &std::path::Path) -> TransformInvoker {
        TransformInvoker::new(
            Arc::new(CacheStore::open(dir.join("cache"), 100).unwrap()),
            Arc::new(FileSnapshotter::new()),
        )
    }

    fn input_file(dir: &std::path::Path, name: &str) -> InputArtifact {
        let path = dir.join(name);
        fs::write(&path, b"contents").unwrap();
        InputArtifact::new(path, Provenance::External)
    }

    #[test]
    fn test_shared_prefix_reuses_nodes() {
        let registry = crate::testing::noop_registry(&[
            ("a", &[("type", "jar")], &[("type", "classes")]),
            ("b", &[("type", "classes")], &[("type", "analyzed")]),
        ]);
        let steps = registry.steps();
        let short = TransformChain::initial(Arc::clone(&steps[0]), attrs(&[("type", "classes")]));
        let long = short.extended(Arc::clone(&steps[1]), attrs(&[("type", "analyzed")]));

        let artifact = InputArtifact::new("/repo/lib.jar", Provenance::External);
        let factory = NodeFactory::new();
        let short_node = factory.node_for(&artifact, &short);
        let long_node = factory.node_for(&artifact, &long);

        assert!(Arc::ptr_eq(
            &short_node,
            long_node.upstream().expect("chained node has upstream")
        ));
        assert_eq!(factory.node_count(), 2);
    }

    #[test]
    fn test_distinct_artifacts_get_distinct_nodes() {
        let registry =
            crate::testing::noop_registry(&[("a", &[("type", "jar")], &[("type", "classes")])]);
        let chain = chain_of(&registry, &[attrs(&[("type", "classes")])]);
        let factory = NodeFactory::new();

        let first = factory.node_for(
            &InputArtifact::new("/repo/one.jar", Provenance::External),
            &chain,
        );
        let second = factory.node_for(
            &InputArtifact::new("/repo/two.jar", Provenance::External),
            &chain,
        );

        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_chained_execution_feeds_outputs_forward() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = invoker_in(dir.path());
        let action = CountingAction::shared("step");
        let registry = registry_with_action(
            &[
                ("a", &[("type", "jar")], &[("type", "classes")]),
                ("b", &[("type", "classes")], &[("type", "analyzed")]),
            ],
            action.clone(),
        );
        let chain = chain_of(
            &registry,
            &[attrs(&[("type", "classes")]), attrs(&[("type", "analyzed")])],
        );
        let artifact = input_file(dir.path(), "lib.jar");

        let node = NodeFactory::new().node_for(&artifact, &chain);
        let outputs = node.execute(&invoker).await.unwrap();

        assert_eq!(action.executions(), 2);
        assert_eq!(outputs.len(), 1);
        assert!(outputs[0].ends_with("b.out"));
        assert!(outputs[0].exists());
    }

    #[tokio::test]
    async fn test_shared_prefix_executes_once() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = invoker_in(dir.path());
        let action = CountingAction::shared("step");
        let registry = registry_with_action(
            &[
                ("a", &[("type", "jar")], &[("type", "classes")]),
                ("b", &[("type", "classes")], &[("type", "analyzed")]),
            ],
            action.clone(),
        );
        let steps = registry.steps();
        let short = TransformChain::initial(Arc::clone(&steps[0]), attrs(&[("type", "classes")]));
        let long = short.extended(Arc::clone(&steps[1]), attrs(&[("type", "analyzed")]));
        let artifact = input_file(dir.path(), "lib.jar");

        let factory = NodeFactory::new();
        factory
            .node_for(&artifact, &short)
            .execute(&invoker)
            .await
            .unwrap();
        factory
            .node_for(&artifact, &long)
            .execute(&invoker)
            .await
            .unwrap();

        // Step "a" ran once for both chains; step "b" once on top.
        assert_eq!(action.executions(), 2);
    }

    #[tokio::test]
    async fn test_upstream_failure_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = invoker_in(dir.path());
        let failing = CountingAction::shared("step").failing("upstream broke");
        let registry = registry_with_action(
            &[
                ("a", &[("type", "jar")], &[("type", "classes")]),
                ("b", &[("type", "classes")], &[("type", "analyzed")]),
            ],
            failing.clone(),
        );
        let chain = chain_of(
            &registry,
            &[attrs(&[("type", "classes")]), attrs(&[("type", "analyzed")])],
        );
        let artifact = input_file(dir.path(), "lib.jar");

        let node = NodeFactory::new().node_for(&artifact, &chain);
        let err = node.execute(&invoker).await.unwrap_err();

        // Only the first step ran; the second never got inputs.
        assert_eq!(failing.executions(), 1);
        assert_eq!(err.step, "a");
        assert!(err.message.contains("upstream broke"));
    }

    /// Produces several files so chained nodes fan out per upstream output.
    #[derive(Debug)]
    struct FanOutAction {
        fan: usize,
        downstream_runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TransformAction for FanOutAction {
        fn display_name(&self) -> &str {
            "fan-out"
        }

        fn fingerprint(&self) -> HashDigest {
            hash_parts(["fan-out", &self.fan.to_string()])
        }

        async fn transform(&self, ctx: &mut TransformContext) -> anyhow::Result<()> {
            if self.fan == 0 {
                // Downstream role: count and pass one file through.
                self.downstream_runs.fetch_add(1, Ordering::SeqCst);
                let out = ctx.output_dir().join("downstream.out");
                fs::copy(ctx.input(), &out)?;
                ctx.register_output(out);
                return Ok(());
            }
            for n in 0..self.fan {
                let out = ctx.output_dir().join(format!("part-{n}.txt"));
                fs::write(&out, format!("part {n}"))?;
                ctx.register_output(out);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_chained_node_fans_out_per_upstream_file() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = invoker_in(dir.path());
        let downstream_runs = Arc::new(AtomicUsize::new(0));
        let registry = TransformRegistry::builder()
            .register(
                "split",
                attrs(&[("type", "jar")]),
                attrs(&[("type", "classes")]),
                Arc::new(FanOutAction {
                    fan: 3,
                    downstream_runs: Arc::clone(&downstream_runs),
                }),
            )
            .unwrap()
            .register(
                "analyze",
                attrs(&[("type", "classes")]),
                attrs(&[("type", "analyzed")]),
                Arc::new(FanOutAction {
                    fan: 0,
                    downstream_runs: Arc::clone(&downstream_runs),
                }),
            )
            .unwrap()
            .build();
        let chain = chain_of(
            &registry,
            &[attrs(&[("type", "classes")]), attrs(&[("type", "analyzed")])],
        );
        let artifact = input_file(dir.path(), "lib.jar");

        let node = NodeFactory::new().node_for(&artifact, &chain);
        let outputs = node.execute(&invoker).await.unwrap();

        assert_eq!(downstream_runs.load(Ordering::SeqCst), 3);
        assert_eq!(outputs.len(), 3);
    }
}
