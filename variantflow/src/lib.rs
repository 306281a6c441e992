//! # Variantflow
//!
//! The artifact-transform subsystem of a dependency resolution engine.
//!
//! Components publish *variants* — artifacts tagged with typed attribute
//! sets — and consumers request attribute sets. When no published variant
//! matches a request directly, variantflow finds the shortest chain of
//! registered transform steps bridging the gap, deduplicates the resulting
//! work into a node graph, and executes it against a content-addressed,
//! crash-safe cache:
//!
//! - **Attribute matching**: a pluggable compatibility oracle with
//!   process-wide memoization
//! - **Chain discovery**: breadth-first search for minimal-depth chains,
//!   memoized per request shape
//! - **Variant selection**: direct matches first, chains second, ambiguity
//!   always reported rather than guessed away
//! - **Deduplicated execution**: interned nodes, single-flight identity
//!   slots and a persistent LRU-bounded workspace store
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use variantflow::prelude::*;
//!
//! let registry = TransformRegistry::builder()
//!     .register("unzip", jar_attrs, classes_attrs, Arc::new(UnzipAction))?
//!     .build();
//! let engine = TransformEngine::new(registry, &EngineConfig::new(cache_dir))?;
//!
//! let files = engine
//!     .resolve_artifacts(&variants, &requested, false)
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod artifact;
pub mod attributes;
pub mod chain;
pub mod engine;
pub mod errors;
pub mod execution;
pub mod fingerprint;
pub mod nodes;
pub mod registry;
pub mod selector;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::artifact::{InputArtifact, Provenance};
    pub use crate::attributes::{
        AttributeContainer, AttributeMatcher, AttributeValue, StrictMatcher,
    };
    pub use crate::chain::{ChainMatch, TransformChain};
    pub use crate::engine::{EngineConfig, TransformEngine};
    pub use crate::errors::VariantFlowError;
    pub use crate::execution::{Invocation, TransformInvoker, TransformOutput};
    pub use crate::nodes::{NodeFactory, TransformNode};
    pub use crate::registry::{
        StepCapabilities, TransformAction, TransformContext, TransformRegistry, TransformStep,
    };
    pub use crate::selector::{ProducerVariant, ResolvedVariants, VariantSelector};
}
