//! Memoization layer over the compatibility oracle.

use super::{AttributeContainer, AttributeMatcher, AttributeSignature};
use dashmap::DashMap;
use std::sync::Arc;

/// Caches pairwise oracle answers by attribute signature.
///
/// Chain discovery asks the same `(candidate, requested)` questions over and
/// over while expanding its frontier; the answers only depend on attribute
/// contents, so they are memoized process-wide and shared across threads.
#[derive(Debug, Clone)]
pub struct MatchingCache {
    matcher: Arc<dyn AttributeMatcher>,
    pairwise: Arc<DashMap<(AttributeSignature, AttributeSignature), bool>>,
}

impl MatchingCache {
    /// Wraps an oracle with a pairwise memo table.
    #[must_use]
    pub fn new(matcher: Arc<dyn AttributeMatcher>) -> Self {
        Self {
            matcher,
            pairwise: Arc::new(DashMap::new()),
        }
    }

    /// Memoized [`AttributeMatcher::is_matching`].
    pub fn is_matching(&self, candidate: &AttributeContainer, requested: &AttributeContainer) -> bool {
        let key = (candidate.signature(), requested.signature());
        if let Some(hit) = self.pairwise.get(&key) {
            return *hit;
        }
        let answer = self.matcher.is_matching(candidate, requested);
        self.pairwise.insert(key, answer);
        answer
    }

    /// Ranked candidate selection, delegated to the oracle.
    pub fn matches(&self, candidates: &[AttributeContainer], requested: &AttributeContainer) -> Vec<usize> {
        self.matcher.matches(candidates, requested)
    }

    /// Number of memoized pairwise answers, used by tests and diagnostics.
    #[must_use]
    pub fn memoized_pairs(&self) -> usize {
        self.pairwise.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Default)]
    struct CountingMatcher {
        calls: Mutex<usize>,
    }

    impl AttributeMatcher for CountingMatcher {
        fn is_matching(&self, candidate: &AttributeContainer, requested: &AttributeContainer) -> bool {
            *self.calls.lock() += 1;
            candidate.contains_all(requested)
        }
    }

    #[test]
    fn test_pairwise_answers_are_memoized() {
        let matcher = Arc::new(CountingMatcher::default());
        let cache = MatchingCache::new(matcher.clone());

        let a = AttributeContainer::new().with("type", "jar");
        let b = AttributeContainer::new().with("type", "jar");

        assert!(cache.is_matching(&a, &b));
        assert!(cache.is_matching(&a, &b));
        // Second call answered from the memo table.
        assert_eq!(*matcher.calls.lock(), 1);
        assert_eq!(cache.memoized_pairs(), 1);
    }

    #[test]
    fn test_distinct_pairs_get_distinct_slots() {
        let cache = MatchingCache::new(Arc::new(CountingMatcher::default()));

        let jar = AttributeContainer::new().with("type", "jar");
        let classes = AttributeContainer::new().with("type", "classes");

        assert!(cache.is_matching(&jar, &jar));
        assert!(!cache.is_matching(&jar, &classes));
        assert_eq!(cache.memoized_pairs(), 2);
    }
}
