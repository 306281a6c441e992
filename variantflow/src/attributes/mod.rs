//! Attribute containers, signatures, and the compatibility oracle.
//!
//! An attribute container is an immutable map of named typed values that
//! describes one variant of an artifact. Containers are used as hash keys
//! throughout the engine, so construction returns a frozen value and every
//! combinator produces a new container.

mod cache;
mod container;
mod matcher;

pub use cache::MatchingCache;
pub use container::{AttributeContainer, AttributeSignature, AttributeValue};
pub use matcher::{AttributeMatcher, StrictMatcher};
