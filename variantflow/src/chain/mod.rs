//! Transform chains: ordered step sequences with structural sharing.

mod finder;

pub use finder::{ChainFinder, ChainMatch};

use crate::attributes::AttributeContainer;
use crate::registry::TransformStep;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use uuid::Uuid;

/// An ordered, immutable sequence of transform steps.
///
/// Represented as a persistent linked structure: a chain of length `n`
/// holds an `Arc` to its length-`n-1` prefix, so chains sharing a prefix
/// share storage, and the node graph can memoize per prefix. Each link
/// records the attribute set achieved after applying its step.
#[derive(Clone)]
pub struct TransformChain {
    link: Arc<ChainLink>,
}

struct ChainLink {
    step: Arc<TransformStep>,
    target: AttributeContainer,
    prev: Option<TransformChain>,
    len: usize,
}

impl TransformChain {
    /// A single-step chain.
    #[must_use]
    pub fn initial(step: Arc<TransformStep>, target: AttributeContainer) -> Self {
        Self {
            link: Arc::new(ChainLink {
                step,
                target,
                prev: None,
                len: 1,
            }),
        }
    }

    /// Extends the chain with one more step, sharing this chain as prefix.
    #[must_use]
    pub fn extended(&self, step: Arc<TransformStep>, target: AttributeContainer) -> Self {
        Self {
            link: Arc::new(ChainLink {
                step,
                target,
                prev: Some(self.clone()),
                len: self.link.len + 1,
            }),
        }
    }

    /// Number of steps in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.link.len
    }

    /// Chains are never empty; provided for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The final step of the chain.
    #[must_use]
    pub fn last_step(&self) -> &Arc<TransformStep> {
        &self.link.step
    }

    /// The chain without its final step, if any.
    #[must_use]
    pub fn prefix(&self) -> Option<&Self> {
        self.link.prev.as_ref()
    }

    /// The attribute set achieved after applying the whole chain.
    #[must_use]
    pub fn target_attributes(&self) -> &AttributeContainer {
        &self.link.target
    }

    /// The steps in application order, traversed iteratively.
    #[must_use]
    pub fn steps(&self) -> Vec<Arc<TransformStep>> {
        let mut steps = Vec::with_capacity(self.link.len);
        let mut cursor = Some(self);
        while let Some(chain) = cursor {
            steps.push(Arc::clone(&chain.link.step));
            cursor = chain.link.prev.as_ref();
        }
        steps.reverse();
        steps
    }

    /// Step ids in application order.
    #[must_use]
    pub fn step_ids(&self) -> Vec<Uuid> {
        self.steps().iter().map(|s| s.id()).collect()
    }

    /// Display names in application order, for diagnostics.
    #[must_use]
    pub fn describe(&self) -> String {
        self.steps()
            .iter()
            .map(|s| s.name().to_string())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

impl PartialEq for TransformChain {
    fn eq(&self, other: &Self) -> bool {
        self.step_ids() == other.step_ids()
    }
}

impl Eq for TransformChain {}

impl Hash for TransformChain {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for id in self.step_ids() {
            id.hash(state);
        }
    }
}

impl fmt::Debug for TransformChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformChain")
            .field("steps", &self.describe())
            .field("target", &self.target_attributes().to_string())
            .finish()
    }
}
