//! The capability contract every worker implements (Design Notes: dynamic
//! duck-typed worker loading is replaced by a small typed interface).

use async_trait::async_trait;

use crate::context::StagePayload;
use crate::error::CoreResult;
use crate::intent::PaymentIntent;

/// A stage-local transaction record: the intent plus whatever prior stage
/// payloads the stage needs, built by the Stage Executor before invoking a
/// worker.
#[derive(Debug, Clone)]
pub struct StageTransaction<'a> {
    pub stage_id: &'a str,
    pub intent: &'a PaymentIntent,
    pub prior: Vec<&'a StagePayload>,
}

impl<'a> StageTransaction<'a> {
    /// First prior payload for which `f` returns `Some`, searched in the
    /// order the stage executor attached them.
    pub fn find_prior<T>(&self, f: impl Fn(&'a StagePayload) -> Option<T>) -> Option<T> {
        self.prior.iter().find_map(|p| f(*p))
    }
}

/// Static registry entry describing a worker kind.
#[derive(Debug, Clone)]
pub struct WorkerDescriptor {
    pub capability: String,
    pub version: String,
    pub required_capabilities: Vec<String>,
    pub max_concurrent: usize,
}

/// The contract a worker must satisfy to be invoked by a Stage Executor via
/// the Supervisor. Workers hold no reference to the Registry; the Registry
/// holds workers.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Stable id of this worker instance (distinct from its capability).
    fn id(&self) -> &str;

    /// The capability this worker satisfies, e.g. `"compliance"`.
    fn capability(&self) -> &str;

    /// Process one stage transaction, returning a typed payload on success.
    /// Implementations must convert any lower-level fault into one of the
    /// [`crate::error::CoreError`] kinds — panics are bugs, not control flow.
    async fn process(&self, tx: &StageTransaction<'_>) -> CoreResult<StagePayload>;
}
