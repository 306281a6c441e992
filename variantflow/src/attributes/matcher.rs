//! The attribute compatibility oracle.

use super::{AttributeContainer, AttributeValue};
use std::fmt::Debug;

/// Oracle answering attribute compatibility questions.
///
/// The engine treats compatibility rules as external policy: it only ever
/// asks whether one attribute set can serve a request, and for a ranked
/// subset of candidates. Implementations may be asymmetric —
/// `is_matching(a, b)` saying yes does not imply `is_matching(b, a)` does.
pub trait AttributeMatcher: Send + Sync + Debug {
    /// True when `candidate` can satisfy `requested`.
    fn is_matching(&self, candidate: &AttributeContainer, requested: &AttributeContainer) -> bool;

    /// Returns the indices of the candidates that match `requested`, best
    /// matches only.
    fn matches(&self, candidates: &[AttributeContainer], requested: &AttributeContainer) -> Vec<usize> {
        let matching: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| self.is_matching(c, requested))
            .map(|(i, _)| i)
            .collect();
        rank_by_requested_overlap(candidates, requested, matching)
    }
}

/// Keeps only the matching candidates sharing the highest number of
/// requested entries. Ties survive; disambiguation is the caller's problem.
fn rank_by_requested_overlap(
    candidates: &[AttributeContainer],
    requested: &AttributeContainer,
    matching: Vec<usize>,
) -> Vec<usize> {
    let best = matching
        .iter()
        .map(|&i| candidates[i].shared_entry_count(requested))
        .max()
        .unwrap_or(0);
    matching
        .into_iter()
        .filter(|&i| candidates[i].shared_entry_count(requested) == best)
        .collect()
}

/// The bundled equality-based oracle.
///
/// A candidate matches when every requested attribute it carries has an
/// equal value; attributes the candidate lacks are treated as compatible.
/// This mirrors the common "absent means indifferent" convention and keeps
/// chain discovery usable without an external rule engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictMatcher;

impl StrictMatcher {
    /// Creates the oracle.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl AttributeMatcher for StrictMatcher {
    fn is_matching(&self, candidate: &AttributeContainer, requested: &AttributeContainer) -> bool {
        requested.iter().all(|(name, value)| {
            candidate
                .get(name)
                .map_or(true, |candidate_value: &AttributeValue| candidate_value == value)
        })
    }
}
