//! Breadth-first discovery of minimal-depth transform chains.

use super::TransformChain;
use crate::attributes::{AttributeContainer, AttributeSignature, MatchingCache};
use crate::registry::{TransformRegistry, TransformStep};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

/// One discovered chain, tagged with the source variant it roots from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainMatch {
    /// Index into the candidate source attribute sets.
    pub source_index: usize,
    /// The discovered chain; its target attributes are the attributes
    /// achieved when the chain is applied to that source.
    pub chain: TransformChain,
}

/// Memo key: the candidate attribute signatures plus the request signature.
///
/// Keyed on signatures rather than concrete variants, so unrelated
/// components sharing attribute shapes reuse each other's discovery work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ChainQuery {
    sources: Vec<AttributeSignature>,
    requested: AttributeSignature,
}

/// A partially built chain suffix during the search.
///
/// The search runs backwards from the request: `suffix` holds the steps
/// already chosen (in application order), `required` is the attribute set a
/// feeding variant must satisfy to make the suffix valid, and `remaining`
/// holds the registered steps this branch may still use. Removing a step
/// from `remaining` when it is taken bounds the depth by the registry size.
struct SearchState {
    suffix: Vec<Arc<TransformStep>>,
    required: AttributeContainer,
    remaining: Vec<Arc<TransformStep>>,
}

/// Finds minimal-depth transform chains satisfying an attribute request.
#[derive(Debug, Clone)]
pub struct ChainFinder {
    registry: TransformRegistry,
    matching: MatchingCache,
    cache: Arc<DashMap<ChainQuery, Arc<Vec<ChainMatch>>>>,
}

impl ChainFinder {
    /// Creates a finder over the given registry and oracle cache.
    #[must_use]
    pub fn new(registry: TransformRegistry, matching: MatchingCache) -> Self {
        Self {
            registry,
            matching,
            cache: Arc::new(DashMap::new()),
        }
    }

    /// Returns every chain of globally minimal depth that converts one of
    /// the `sources` into attributes compatible with `requested`.
    ///
    /// An empty result means no chain of any depth exists. A non-empty
    /// result only ever contains chains of one shared depth: the first
    /// depth at which any solution appears ends the search.
    pub fn find_transform_chains(
        &self,
        sources: &[AttributeContainer],
        requested: &AttributeContainer,
    ) -> Arc<Vec<ChainMatch>> {
        let query = ChainQuery {
            sources: sources.iter().map(AttributeContainer::signature).collect(),
            requested: requested.signature(),
        };
        if let Some(hit) = self.cache.get(&query) {
            trace!(request = %requested, "chain discovery cache hit");
            return Arc::clone(&hit);
        }

        // The entry holds its shard lock while computing, so a racing
        // equal query joins this computation instead of repeating it.
        let entry = self.cache.entry(query).or_insert_with(|| {
            let result = Arc::new(self.search(sources, requested));
            debug!(
                request = %requested,
                candidates = sources.len(),
                chains = result.len(),
                "chain discovery completed"
            );
            result
        });
        Arc::clone(entry.value())
    }

    fn search(&self, sources: &[AttributeContainer], requested: &AttributeContainer) -> Vec<ChainMatch> {
        let all_steps: Vec<Arc<TransformStep>> = self.registry.steps().to_vec();
        let mut level = vec![SearchState {
            suffix: Vec::new(),
            required: requested.clone(),
            remaining: all_steps,
        }];

        while !level.is_empty() {
            let mut solutions = Vec::new();
            let mut seen: HashSet<(usize, Vec<Uuid>)> = HashSet::new();
            let mut next_level = Vec::new();

            for state in &level {
                for step in self.viable_steps(state) {
                    self.collect_solutions(sources, requested, state, &step, &mut seen, &mut solutions);
                    next_level.push(SearchState {
                        suffix: prepend(&step, &state.suffix),
                        required: step.from_attributes().clone(),
                        remaining: without(&state.remaining, &step),
                    });
                }
            }

            // All solutions at one depth are equally minimal; never search
            // deeper once any exist.
            if !solutions.is_empty() {
                return solutions;
            }
            level = next_level;
        }
        Vec::new()
    }

    /// Steps from this branch's remaining set whose target attributes could
    /// satisfy the state's required attributes.
    fn viable_steps(&self, state: &SearchState) -> Vec<Arc<TransformStep>> {
        state
            .remaining
            .iter()
            .filter(|step| self.matching.is_matching(step.to_attributes(), &state.required))
            .map(Arc::clone)
            .collect()
    }

    /// Tests every source against `step` prepended to the state's suffix
    /// and records each complete solution.
    fn collect_solutions(
        &self,
        sources: &[AttributeContainer],
        requested: &AttributeContainer,
        state: &SearchState,
        step: &Arc<TransformStep>,
        seen: &mut HashSet<(usize, Vec<Uuid>)>,
        solutions: &mut Vec<ChainMatch>,
    ) {
        for (source_index, source) in sources.iter().enumerate() {
            if !self.matching.is_matching(source, step.from_attributes()) {
                continue;
            }
            let forward = prepend(step, &state.suffix);
            let chain = build_chain(source, &forward);
            if !self.matching.is_matching(chain.target_attributes(), requested) {
                continue;
            }
            if seen.insert((source_index, chain.step_ids())) {
                trace!(
                    source = %source,
                    chain = %chain.describe(),
                    "found transform chain"
                );
                solutions.push(ChainMatch {
                    source_index,
                    chain,
                });
            }
        }
    }

    /// Number of memoized queries, for tests and diagnostics.
    #[must_use]
    pub fn memoized_queries(&self) -> usize {
        self.cache.len()
    }
}

fn prepend(step: &Arc<TransformStep>, suffix: &[Arc<TransformStep>]) -> Vec<Arc<TransformStep>> {
    let mut forward = Vec::with_capacity(suffix.len() + 1);
    forward.push(Arc::clone(step));
    forward.extend(suffix.iter().map(Arc::clone));
    forward
}

fn without(steps: &[Arc<TransformStep>], step: &Arc<TransformStep>) -> Vec<Arc<TransformStep>> {
    steps
        .iter()
        .filter(|s| s.id() != step.id())
        .map(Arc::clone)
        .collect()
}

/// Folds a source attribute set through the steps, building the persistent
/// chain and the achieved attributes link by link.
fn build_chain(source: &AttributeContainer, steps: &[Arc<TransformStep>]) -> TransformChain {
    let mut attrs = source.concat(steps[0].to_attributes());
    let mut chain = TransformChain::initial(Arc::clone(&steps[0]), attrs.clone());
    for step in &steps[1..] {
        attrs = attrs.concat(step.to_attributes());
        chain = chain.extended(Arc::clone(step), attrs.clone());
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::StrictMatcher;
    use crate::testing::{attrs, noop_registry};
    use pretty_assertions::assert_eq;

    fn finder(registry: TransformRegistry) -> ChainFinder {
        ChainFinder::new(registry, MatchingCache::new(Arc::new(StrictMatcher::new())))
    }

    #[test]
    fn test_single_step_chain() {
        let finder = finder(noop_registry(&[(
            "unzip",
            &[("type", "jar")],
            &[("type", "classes")],
        )]));

        let result = finder.find_transform_chains(
            &[attrs(&[("type", "jar")])],
            &attrs(&[("type", "classes")]),
        );

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].source_index, 0);
        assert_eq!(result[0].chain.describe(), "unzip");
    }

    #[test]
    fn test_two_step_chain_is_found_in_order() {
        let finder = finder(noop_registry(&[
            ("a", &[("type", "jar")], &[("type", "classes")]),
            ("b", &[("type", "classes")], &[("type", "analyzed")]),
        ]));

        let result = finder.find_transform_chains(
            &[attrs(&[("type", "jar")])],
            &attrs(&[("type", "analyzed")]),
        );

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].chain.describe(), "a -> b");
        assert_eq!(
            result[0].chain.target_attributes(),
            &attrs(&[("type", "analyzed")])
        );
    }

    #[test]
    fn test_shorter_chain_wins_over_longer() {
        // Both a direct step and a two-step route reach "classes"; only the
        // depth-1 solution may be returned.
        let finder = finder(noop_registry(&[
            ("direct", &[("type", "jar")], &[("type", "classes")]),
            ("detour1", &[("type", "jar")], &[("type", "half")]),
            ("detour2", &[("type", "half")], &[("type", "classes")]),
        ]));

        let result = finder.find_transform_chains(
            &[attrs(&[("type", "jar")])],
            &attrs(&[("type", "classes")]),
        );

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].chain.describe(), "direct");
    }

    #[test]
    fn test_all_results_share_minimal_depth() {
        let finder = finder(noop_registry(&[
            ("x", &[("type", "jar")], &[("type", "classes")]),
            ("y", &[("type", "aar")], &[("type", "classes")]),
        ]));

        let result = finder.find_transform_chains(
            &[attrs(&[("type", "jar")]), attrs(&[("type", "aar")])],
            &attrs(&[("type", "classes")]),
        );

        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|m| m.chain.len() == 1));
    }

    #[test]
    fn test_no_chain_returns_empty() {
        let finder = finder(noop_registry(&[(
            "a",
            &[("type", "jar")],
            &[("type", "classes")],
        )]));

        let result = finder.find_transform_chains(
            &[attrs(&[("type", "source")])],
            &attrs(&[("type", "analyzed")]),
        );

        assert!(result.is_empty());
    }

    #[test]
    fn test_steps_are_not_reused_within_a_branch() {
        // A step back and forth between two shapes must not loop forever.
        let finder = finder(noop_registry(&[
            ("there", &[("type", "a")], &[("type", "b")]),
            ("back", &[("type", "b")], &[("type", "a")]),
        ]));

        // No source feeds either step, so the search must exhaust the
        // registry and terminate instead of alternating forever.
        let result = finder.find_transform_chains(
            &[attrs(&[("type", "x")])],
            &attrs(&[("type", "a")]),
        );

        assert!(result.is_empty());
    }

    #[test]
    fn test_results_are_memoized_by_signature() {
        let finder = finder(noop_registry(&[(
            "a",
            &[("type", "jar")],
            &[("type", "classes")],
        )]));
        let requested = attrs(&[("type", "classes")]);

        // Distinct container instances with equal attributes share a slot.
        let first = finder.find_transform_chains(&[attrs(&[("type", "jar")])], &requested);
        let second = finder.find_transform_chains(&[attrs(&[("type", "jar")])], &requested);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(finder.memoized_queries(), 1);
    }

    #[test]
    fn test_source_supplies_attributes_the_delta_lacks() {
        // The step only rewrites "type"; the request also wants an
        // attribute the source itself carries.
        let finder = finder(noop_registry(&[(
            "minify",
            &[("type", "jar")],
            &[("type", "minified-jar")],
        )]));

        let result = finder.find_transform_chains(
            &[attrs(&[("type", "jar"), ("usage", "runtime")])],
            &attrs(&[("type", "minified-jar"), ("usage", "runtime")]),
        );

        assert_eq!(result.len(), 1);
        assert_eq!(
            result[0].chain.target_attributes(),
            &attrs(&[("type", "minified-jar"), ("usage", "runtime")])
        );
    }
}
