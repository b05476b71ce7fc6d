//! Error types for the payment orchestration core.

use thiserror::Error;

/// Result type used across the core.
pub type CoreResult<T> = Result<T, CoreError>;

/// Typed error kinds, per the error handling design: every public surface
/// converts lower-level faults into one of these before it crosses a stage
/// or worker boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Intent malformed or a stage's declared prerequisite was violated.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// A required prior stage did not complete successfully.
    #[error("prerequisite stage failed: {0}")]
    PrerequisiteFailed(String),

    /// The route optimizer produced no viable candidate after filtering.
    #[error("no viable route: {0}")]
    NoViableRoute(String),

    /// The liquidity worker declined the payment.
    #[error("insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    /// The compliance worker's verdict was not ok.
    #[error("compliance rejected: {0}")]
    ComplianceRejected(String),

    /// Rate limit, 5xx, or timeout from an external adapter. Retryable.
    #[error("adapter transient error: {0}")]
    AdapterTransient(String),

    /// 4xx, invalid params, or closed account from an external adapter. Not retryable.
    #[error("adapter permanent error: {0}")]
    AdapterPermanent(String),

    /// A stage exceeded its own timeout budget.
    #[error("stage {0} timed out")]
    StageTimeout(String),

    /// The workflow exceeded its global timeout budget.
    #[error("workflow timed out")]
    WorkflowTimeout,

    /// A circuit breaker (worker-level or orchestrator-level) is open.
    #[error("circuit open: {0}")]
    CircuitOpen(String),

    /// No concurrency slot became available within the operation timeout.
    #[error("worker busy: {0}")]
    Busy(String),

    /// The caller cancelled the run.
    #[error("cancelled")]
    Cancelled,

    /// Consensus could not produce a result because every participating
    /// worker invocation failed.
    #[error("all workers failed for capability {0}")]
    AllWorkersFailed(String),

    /// A registered capability could not be constructed because a required
    /// capability is not registered.
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    /// Unexpected fault in the core itself. Never leaked from workers;
    /// workers' own faults map to one of the kinds above.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable, machine-readable tag for the error kind, independent of the
    /// human-readable message. Used in `StageResult::error_kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::ValidationFailed(_) => "validation_failed",
            CoreError::PrerequisiteFailed(_) => "prerequisite_failed",
            CoreError::NoViableRoute(_) => "no_viable_route",
            CoreError::InsufficientLiquidity(_) => "insufficient_liquidity",
            CoreError::ComplianceRejected(_) => "compliance_rejected",
            CoreError::AdapterTransient(_) => "adapter_transient",
            CoreError::AdapterPermanent(_) => "adapter_permanent",
            CoreError::StageTimeout(_) => "stage_timeout",
            CoreError::WorkflowTimeout => "workflow_timeout",
            CoreError::CircuitOpen(_) => "circuit_open",
            CoreError::Busy(_) => "busy",
            CoreError::Cancelled => "cancelled",
            CoreError::AllWorkersFailed(_) => "all_workers_failed",
            CoreError::MissingDependency(_) => "missing_dependency",
            CoreError::Internal(_) => "internal",
        }
    }

    /// Whether the supervisor's retry envelope should attempt this error
    /// again. Validation and cancellation stop retries immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::AdapterTransient(_) | CoreError::Busy(_) | CoreError::StageTimeout(_)
        )
    }

    /// Whether this error is a worker's own negative verdict (the worker ran
    /// and answered "no") rather than a failure to obtain any verdict at all.
    /// Consensus arbitration counts the former as a valid not-ok vote and
    /// excludes the latter entirely, per the distinction between "a worker
    /// voted no" and "a worker's vote never arrived".
    pub fn is_domain_verdict(&self) -> bool {
        matches!(
            self,
            CoreError::ValidationFailed(_)
                | CoreError::PrerequisiteFailed(_)
                | CoreError::NoViableRoute(_)
                | CoreError::InsufficientLiquidity(_)
                | CoreError::ComplianceRejected(_)
                | CoreError::AdapterPermanent(_)
        )
    }
}
