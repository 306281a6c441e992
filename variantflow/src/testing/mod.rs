//! Test fixtures shared by unit tests and benchmarks.
//!
//! Kept as a regular module so integration tests and benches can build
//! registries without repeating action boilerplate.

use crate::attributes::AttributeContainer;
use crate::fingerprint::{hash_parts, HashDigest};
use crate::registry::{StepCapabilities, TransformAction, TransformContext, TransformRegistry};
use async_trait::async_trait;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Installs a test subscriber honoring `RUST_LOG`; safe to call from every
/// test, only the first call wins.
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Builds an attribute container from literal pairs.
#[must_use]
pub fn attrs(pairs: &[(&str, &str)]) -> AttributeContainer {
    pairs
        .iter()
        .fold(AttributeContainer::new(), |c, (k, v)| c.with(*k, *v))
}

/// An action that never produces anything; for tests exercising
/// registration, chain discovery and selection, where only attribute
/// patterns matter.
#[derive(Debug)]
struct InertAction {
    name: String,
}

#[async_trait]
impl TransformAction for InertAction {
    fn display_name(&self) -> &str {
        &self.name
    }

    fn fingerprint(&self) -> HashDigest {
        hash_parts(["inert", &self.name])
    }

    async fn transform(&self, ctx: &mut TransformContext) -> anyhow::Result<()> {
        let input = ctx.input().to_path_buf();
        ctx.register_output(input);
        Ok(())
    }
}

/// Builds a registry of inert steps from `(name, from, to)` triples.
#[must_use]
pub fn noop_registry(specs: &[(&str, &[(&str, &str)], &[(&str, &str)])]) -> TransformRegistry {
    let mut builder = TransformRegistry::builder();
    for (name, from, to) in specs {
        builder = builder
            .register(
                *name,
                attrs(from),
                attrs(to),
                Arc::new(InertAction {
                    name: (*name).to_string(),
                }),
            )
            .unwrap_or_else(|err| panic!("fixture registration failed: {err}"));
    }
    builder.build()
}

/// A real action for execution tests: copies the input into the workspace
/// and counts how many times it actually ran.
///
/// Clones share the counter, so a test can hand the action to a registry
/// and still observe the execution count afterwards.
#[derive(Debug, Clone)]
pub struct CountingAction {
    name: String,
    executions: Arc<AtomicUsize>,
    delay: Option<Duration>,
    fail_with: Option<String>,
    register_literal: Option<String>,
}

impl CountingAction {
    /// Creates a counting action with shared state.
    #[must_use]
    pub fn shared(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            executions: Arc::new(AtomicUsize::new(0)),
            delay: None,
            fail_with: None,
            register_literal: None,
        }
    }

    /// Sleeps for `delay` inside each execution, widening race windows.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fails every execution with the given message.
    #[must_use]
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    /// Registers the given literal path instead of producing an output.
    #[must_use]
    pub fn registering(mut self, path: impl Into<String>) -> Self {
        self.register_literal = Some(path.into());
        self
    }

    /// How many times the action body actually ran.
    #[must_use]
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransformAction for CountingAction {
    fn display_name(&self) -> &str {
        &self.name
    }

    fn fingerprint(&self) -> HashDigest {
        hash_parts([
            "counting",
            &self.name,
            self.fail_with.as_deref().unwrap_or(""),
            self.register_literal.as_deref().unwrap_or(""),
        ])
    }

    async fn transform(&self, ctx: &mut TransformContext) -> anyhow::Result<()> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.fail_with {
            anyhow::bail!("{message}");
        }
        if let Some(literal) = &self.register_literal {
            ctx.register_output(literal.clone());
            return Ok(());
        }
        let produced = ctx.output_dir().join(format!("{}.out", self.name));
        fs::copy(ctx.input(), &produced)?;
        ctx.register_output(produced);
        Ok(())
    }
}

/// Builds a registry where every step runs a clone of `action`, from
/// `(name, from, to)` triples.
#[must_use]
pub fn registry_with_action(
    specs: &[(&str, &[(&str, &str)], &[(&str, &str)])],
    action: CountingAction,
) -> TransformRegistry {
    registry_with_action_and_caps(specs, action, StepCapabilities::default())
}

/// Like [`registry_with_action`] with explicit step capabilities.
#[must_use]
pub fn registry_with_action_and_caps(
    specs: &[(&str, &[(&str, &str)], &[(&str, &str)])],
    action: CountingAction,
    capabilities: StepCapabilities,
) -> TransformRegistry {
    let mut builder = TransformRegistry::builder();
    for (name, from, to) in specs {
        let mut named = action.clone();
        named.name = (*name).to_string();
        builder = builder
            .register_with(*name, attrs(from), attrs(to), Arc::new(named), capabilities)
            .unwrap_or_else(|err| panic!("fixture registration failed: {err}"));
    }
    builder.build()
}
