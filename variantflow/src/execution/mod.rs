//! Transform execution: workspace identities, output encoding, the
//! persistent store and the single-flight invoker.

mod identity;
mod invoker;
mod outputs;
mod store;
mod workspace;

pub use identity::WorkspaceIdentity;
pub use invoker::{CachedOutputs, Invocation, InvocationResult, TransformInvoker};
pub use outputs::TransformOutput;
pub use store::{CacheStore, StoredOutcome};
pub use workspace::TransformWorkspace;
