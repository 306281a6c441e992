//! Variant selection: direct matches first, transform chains second.

use crate::artifact::InputArtifact;
use crate::attributes::{AttributeContainer, MatchingCache};
use crate::chain::{ChainFinder, ChainMatch, TransformChain};
use crate::errors::{
    AmbiguousTransformError, AmbiguousVariantsError, NoMatchingVariantError, VariantFlowError,
};
use tracing::debug;

/// One artifact-producing facet of a component.
#[derive(Debug, Clone)]
pub struct ProducerVariant {
    name: String,
    attributes: AttributeContainer,
    artifact: InputArtifact,
}

impl ProducerVariant {
    /// Creates a variant.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        attributes: AttributeContainer,
        artifact: InputArtifact,
    ) -> Self {
        Self {
            name: name.into(),
            attributes,
            artifact,
        }
    }

    /// The variant's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The variant's attributes.
    #[must_use]
    pub fn attributes(&self) -> &AttributeContainer {
        &self.attributes
    }

    /// The variant's concrete artifact.
    #[must_use]
    pub fn artifact(&self) -> &InputArtifact {
        &self.artifact
    }
}

/// A producer variant wrapped with the chain that adapts it to a request.
#[derive(Debug, Clone)]
pub struct TransformedVariant {
    source: ProducerVariant,
    chain: TransformChain,
}

impl TransformedVariant {
    /// The variant feeding the chain.
    #[must_use]
    pub fn source(&self) -> &ProducerVariant {
        &self.source
    }

    /// The chain to apply.
    #[must_use]
    pub fn chain(&self) -> &TransformChain {
        &self.chain
    }

    /// Attributes achieved after applying the chain.
    #[must_use]
    pub fn attributes(&self) -> &AttributeContainer {
        self.chain.target_attributes()
    }

    fn describe(&self) -> String {
        format!("{} via {}", self.source.name(), self.chain.describe())
    }
}

/// Outcome of variant selection.
#[derive(Debug, Clone)]
pub enum ResolvedVariants {
    /// A producer variant satisfies the request as-is.
    Direct(ProducerVariant),
    /// A transform chain adapts a producer variant to the request.
    Transformed(TransformedVariant),
    /// Nothing matches and the caller allowed empty results.
    Empty,
}

/// Chooses one producer variant (plus chain, when needed) for a request.
#[derive(Debug, Clone)]
pub struct VariantSelector {
    finder: ChainFinder,
    matching: MatchingCache,
}

impl VariantSelector {
    /// Creates a selector sharing the engine's finder and oracle cache.
    #[must_use]
    pub fn new(finder: ChainFinder, matching: MatchingCache) -> Self {
        Self { finder, matching }
    }

    /// Selects artifacts for `requested` among `variants`.
    ///
    /// Direct matches short-circuit chain discovery entirely. Ambiguity at
    /// any stage is a configuration defect reported with full candidate
    /// diagnostics, never auto-resolved by preference.
    ///
    /// # Errors
    ///
    /// `AmbiguousVariants` for several direct matches, `NoMatchingVariant`
    /// when nothing matches and `allow_empty` is false, and
    /// `AmbiguousTransform` when chain disambiguation fails.
    pub fn select_artifacts(
        &self,
        variants: &[ProducerVariant],
        requested: &AttributeContainer,
        allow_empty: bool,
    ) -> Result<ResolvedVariants, VariantFlowError> {
        let attributes: Vec<AttributeContainer> =
            variants.iter().map(|v| v.attributes().clone()).collect();

        let direct = self.matching.matches(&attributes, requested);
        match direct.len() {
            1 => {
                debug!(variant = variants[direct[0]].name(), "direct variant match");
                return Ok(ResolvedVariants::Direct(variants[direct[0]].clone()));
            }
            0 => {}
            _ => {
                return Err(AmbiguousVariantsError::new(
                    requested.clone(),
                    direct
                        .iter()
                        .map(|&i| (variants[i].name().to_string(), variants[i].attributes().clone()))
                        .collect(),
                )
                .into());
            }
        }

        let matches = self.finder.find_transform_chains(&attributes, requested);
        if matches.is_empty() {
            if allow_empty {
                return Ok(ResolvedVariants::Empty);
            }
            return Err(NoMatchingVariantError::new(
                requested.clone(),
                variants
                    .iter()
                    .map(|v| (v.name().to_string(), v.attributes().clone()))
                    .collect(),
            )
            .into());
        }

        let candidates: Vec<TransformedVariant> = matches
            .iter()
            .map(|m| materialize(variants, m))
            .collect();
        if candidates.len() == 1 {
            return Ok(ResolvedVariants::Transformed(candidates.into_iter().next().ok_or_else(
                || VariantFlowError::Internal("candidate list emptied unexpectedly".into()),
            )?));
        }
        self.disambiguate(candidates, requested)
            .map(ResolvedVariants::Transformed)
    }

    /// Reduces several chain candidates to one, or fails listing survivors.
    fn disambiguate(
        &self,
        candidates: Vec<TransformedVariant>,
        requested: &AttributeContainer,
    ) -> Result<TransformedVariant, VariantFlowError> {
        let attributes: Vec<AttributeContainer> = candidates
            .iter()
            .map(|c| c.attributes().clone())
            .collect();

        let ranked = self.matching.matches(&attributes, requested);
        if ranked.len() == 1 {
            debug!(chain = candidates[ranked[0]].describe(), "disambiguated by ranking");
            let mut candidates = candidates;
            return Ok(candidates.swap_remove(ranked[0]));
        }

        // Arbitrary anchor: the last candidate. Candidates compatible with
        // it in either direction count as equivalent and are dropped;
        // oracle compatibility may be asymmetric, hence both probes.
        // TODO: revisit this tie-break once attribute precedence rules can
        // express a real preference order.
        let anchor = candidates.len() - 1;
        let anchor_attrs = candidates[anchor].attributes().clone();
        let mut survivors: Vec<TransformedVariant> = Vec::new();
        for (i, candidate) in candidates.into_iter().enumerate() {
            if i == anchor {
                survivors.push(candidate);
                continue;
            }
            let equivalent = self.matching.is_matching(candidate.attributes(), &anchor_attrs)
                || self.matching.is_matching(&anchor_attrs, candidate.attributes());
            if !equivalent {
                survivors.push(candidate);
            }
        }

        if survivors.len() == 1 {
            let survivor = survivors.into_iter().next().ok_or_else(|| {
                VariantFlowError::Internal("survivor list emptied unexpectedly".into())
            })?;
            debug!(chain = survivor.describe(), "disambiguated by anchor equivalence");
            return Ok(survivor);
        }

        Err(AmbiguousTransformError::new(
            requested.clone(),
            survivors
                .iter()
                .map(|c| (c.describe(), c.attributes().clone()))
                .collect(),
        )
        .into())
    }
}

fn materialize(variants: &[ProducerVariant], m: &ChainMatch) -> TransformedVariant {
    TransformedVariant {
        source: variants[m.source_index].clone(),
        chain: m.chain.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Provenance;
    use crate::attributes::StrictMatcher;
    use crate::registry::TransformRegistry;
    use crate::testing::{attrs, noop_registry};
    use std::sync::Arc;

    fn variant(name: &str, pairs: &[(&str, &str)]) -> ProducerVariant {
        ProducerVariant::new(
            name,
            attrs(pairs),
            InputArtifact::new(format!("/repo/{name}.jar"), Provenance::External),
        )
    }

    fn selector(registry: TransformRegistry) -> VariantSelector {
        let matching = MatchingCache::new(Arc::new(StrictMatcher::new()));
        VariantSelector::new(ChainFinder::new(registry, matching.clone()), matching)
    }

    #[test]
    fn test_direct_match_short_circuits_discovery() {
        // A chain to "classes" exists, but the direct match must win and
        // leave the discovery cache untouched.
        let selector = selector(noop_registry(&[(
            "convert",
            &[("type", "jar")],
            &[("type", "classes")],
        )]));

        let result = selector
            .select_artifacts(
                &[variant("classes", &[("type", "classes")])],
                &attrs(&[("type", "classes")]),
                false,
            )
            .unwrap();

        assert!(matches!(result, ResolvedVariants::Direct(v) if v.name() == "classes"));
        assert_eq!(selector.finder.memoized_queries(), 0);
    }

    #[test]
    fn test_multiple_direct_matches_fail() {
        let selector = selector(noop_registry(&[]));

        let err = selector
            .select_artifacts(
                &[
                    variant("left", &[("type", "jar")]),
                    variant("right", &[("type", "jar")]),
                ],
                &attrs(&[("type", "jar")]),
                false,
            )
            .unwrap_err();

        match err {
            VariantFlowError::AmbiguousVariants(e) => {
                let names: Vec<&str> = e.candidates.iter().map(|(n, _)| n.as_str()).collect();
                assert_eq!(names, vec!["left", "right"]);
            }
            other => panic!("expected ambiguous variants, got {other}"),
        }
    }

    #[test]
    fn test_transformed_variant_is_materialized() {
        let selector = selector(noop_registry(&[(
            "convert",
            &[("type", "jar")],
            &[("type", "classes")],
        )]));

        let result = selector
            .select_artifacts(
                &[variant("jar", &[("type", "jar")])],
                &attrs(&[("type", "classes")]),
                false,
            )
            .unwrap();

        match result {
            ResolvedVariants::Transformed(t) => {
                assert_eq!(t.source().name(), "jar");
                assert_eq!(t.chain().describe(), "convert");
                assert_eq!(t.attributes(), &attrs(&[("type", "classes")]));
            }
            other => panic!("expected transformed variant, got {other:?}"),
        }
    }

    #[test]
    fn test_no_match_with_empty_allowed() {
        let selector = selector(noop_registry(&[]));

        let result = selector
            .select_artifacts(
                &[variant("jar", &[("type", "jar")])],
                &attrs(&[("type", "classes")]),
                true,
            )
            .unwrap();

        assert!(matches!(result, ResolvedVariants::Empty));
    }

    #[test]
    fn test_no_match_without_empty_allowed_lists_variants() {
        let selector = selector(noop_registry(&[]));

        let err = selector
            .select_artifacts(
                &[variant("jar", &[("type", "jar")])],
                &attrs(&[("type", "classes")]),
                false,
            )
            .unwrap_err();

        match err {
            VariantFlowError::NoMatchingVariant(e) => {
                assert_eq!(e.available.len(), 1);
                assert_eq!(e.available[0].0, "jar");
            }
            other => panic!("expected no matching variant, got {other}"),
        }
    }

    #[test]
    fn test_equivalent_chains_collapse_to_anchor() {
        // Two sources reach the same attributes; the chains are equivalent,
        // so the anchor (last candidate) is chosen rather than failing.
        let selector = selector(noop_registry(&[
            ("from-jar", &[("type", "jar")], &[("type", "classes")]),
            ("from-aar", &[("type", "aar")], &[("type", "classes")]),
        ]));

        let result = selector
            .select_artifacts(
                &[
                    variant("jar", &[("type", "jar")]),
                    variant("aar", &[("type", "aar")]),
                ],
                &attrs(&[("type", "classes")]),
                false,
            )
            .unwrap();

        match result {
            ResolvedVariants::Transformed(t) => {
                assert_eq!(t.source().name(), "aar");
            }
            other => panic!("expected transformed variant, got {other:?}"),
        }
    }

    #[test]
    fn test_incompatible_chains_fail_listing_survivors() {
        // Chains land on conflicting "flavor" values; no candidate can be
        // considered equivalent to the anchor, so selection must fail.
        let selector = selector(noop_registry(&[
            ("sweet", &[("type", "jar")], &[("type", "classes"), ("flavor", "sweet")]),
            ("sour", &[("type", "jar")], &[("type", "classes"), ("flavor", "sour")]),
        ]));

        let err = selector
            .select_artifacts(
                &[variant("jar", &[("type", "jar")])],
                &attrs(&[("type", "classes")]),
                false,
            )
            .unwrap_err();

        match err {
            VariantFlowError::AmbiguousTransform(e) => {
                assert_eq!(e.survivors.len(), 2);
            }
            other => panic!("expected ambiguous transform, got {other}"),
        }
    }
}
