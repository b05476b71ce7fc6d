//! Stage Executors (C5): one per stage id in the canonical pipeline. Rather
//! than nine near-identical structs, a single [`StageExecutor`] is
//! parameterized by a [`StageSpec`] — the prereq/capability wiring is the
//! only thing that differs between stages, and it's data, not behavior.

use std::time::Duration;

use crate::cancellation::CancellationToken;
use crate::config::ConsensusConfig;
use crate::consensus;
use crate::context::{StagePayload, StageResult, WorkflowContext};
use crate::error::CoreError;
use crate::supervisor::Supervisor;
use crate::worker::StageTransaction;

/// Static description of a stage: its id, the capability it consumes, and
/// the stage ids whose results it requires. Grounded on spec.md §4.5's
/// canonical stage table.
#[derive(Debug, Clone, Copy)]
pub struct StageSpec {
    pub id: &'static str,
    pub capability: &'static str,
    pub prereqs: &'static [&'static str],
}

/// The nine canonical stages, in the order spec.md §4.5 lists them. The
/// orchestrator derives batches from `prereqs`, not from this order.
pub const CANONICAL_PIPELINE: &[StageSpec] = &[
    StageSpec { id: "create_payment", capability: "payment_service", prereqs: &[] },
    StageSpec { id: "validate_payment", capability: "payment_service", prereqs: &["create_payment"] },
    StageSpec { id: "optimize_route", capability: "route_optimization", prereqs: &["validate_payment"] },
    StageSpec { id: "validate_compliance", capability: "compliance", prereqs: &["optimize_route"] },
    StageSpec { id: "check_liquidity", capability: "liquidity", prereqs: &["validate_compliance"] },
    StageSpec { id: "lock_exchange_rate", capability: "exchange_rate", prereqs: &["check_liquidity"] },
    StageSpec { id: "execute_mmo", capability: "mmo_service", prereqs: &["lock_exchange_rate"] },
    StageSpec { id: "settle_payment", capability: "settlement", prereqs: &["execute_mmo"] },
    StageSpec { id: "confirm_payment", capability: "payment_service", prereqs: &["settle_payment"] },
];

pub fn spec_for(stage_id: &str) -> Option<StageSpec> {
    CANONICAL_PIPELINE.iter().copied().find(|s| s.id == stage_id)
}

/// A runnable stage: spec plus the knobs the orchestrator resolves per run
/// (timeout budget, whether this stage's failure is terminal, whether it
/// should run under consensus).
pub struct StageExecutor {
    pub spec: StageSpec,
    pub timeout: Duration,
    pub required: bool,
}

impl StageExecutor {
    pub fn new(spec: StageSpec, timeout: Duration, required: bool) -> Self {
        Self { spec, timeout, required }
    }

    /// Execute this stage against `ctx`. Does not mutate `ctx`; the caller
    /// records the returned `StageResult`.
    pub async fn execute(
        &self,
        ctx: &WorkflowContext,
        supervisor: &Supervisor,
        cancel: &CancellationToken,
        consensus_config: Option<&ConsensusConfig>,
        run_stage_ids: &std::collections::HashSet<&str>,
    ) -> StageResult {
        let start = std::time::Instant::now();

        if !ctx.prerequisites_ok(self.spec.prereqs, run_stage_ids) {
            let missing = self
                .spec
                .prereqs
                .iter()
                .find(|id| run_stage_ids.contains(*id) && !ctx.results.get(**id).is_some_and(|r| r.ok))
                .copied()
                .unwrap_or("unknown");
            return StageResult::failure(
                self.spec.id,
                format!("prerequisite {missing} did not complete"),
                "prerequisite_failed",
                start.elapsed(),
                0,
                self.required,
            );
        }

        if cancel.is_cancelled() {
            return StageResult::failure(self.spec.id, "cancelled", "cancelled", start.elapsed(), 0, self.required);
        }

        let prior: Vec<&StagePayload> = self
            .spec
            .prereqs
            .iter()
            .filter_map(|id| ctx.results.get(*id))
            .map(|r| &r.payload)
            .collect();

        let tx = StageTransaction {
            stage_id: self.spec.id,
            intent: &ctx.intent,
            prior,
        };

        let worker_count = supervisor.capability_worker_count(self.spec.capability);
        let consensus_cfg = consensus_config.filter(|_| worker_count > 1);

        if let Some(cfg) = consensus_cfg {
            let n = worker_count.min(cfg.max_agents);
            let outcomes = supervisor.dispatch_consensus(self.spec.capability, &tx, self.timeout, n).await;
            self.arbitrate(outcomes, cfg, start.elapsed())
        } else {
            let (result, attempts) = supervisor.dispatch(self.spec.capability, &tx, self.timeout, cancel).await;
            self.to_stage_result(result, attempts, start.elapsed())
        }
    }

    fn to_stage_result(
        &self,
        result: crate::error::CoreResult<StagePayload>,
        attempt: u32,
        elapsed: Duration,
    ) -> StageResult {
        match result {
            Ok(payload) => {
                let mut r = StageResult::success(self.spec.id, payload, elapsed, attempt);
                r.required = self.required;
                r
            }
            Err(e) => StageResult::failure(self.spec.id, e.to_string(), e.kind(), elapsed, attempt, self.required),
        }
    }

    fn arbitrate(
        &self,
        outcomes: Vec<crate::error::CoreResult<StagePayload>>,
        cfg: &ConsensusConfig,
        elapsed: Duration,
    ) -> StageResult {
        // A worker invocation that errors without producing a verdict (busy,
        // timed out, circuit open, ...) is excluded from the vote entirely;
        // only a success or a worker's own negative verdict counts as a vote.
        let verdicts: Vec<crate::error::CoreResult<StagePayload>> = outcomes
            .into_iter()
            .filter(|o| matches!(o, Ok(_)) || matches!(o, Err(e) if e.is_domain_verdict()))
            .collect();

        if verdicts.is_empty() {
            return StageResult::failure(
                self.spec.id,
                "all participating workers failed",
                CoreError::AllWorkersFailed(self.spec.capability.to_string()).kind(),
                elapsed,
                1,
                self.required,
            );
        }

        let votes: Vec<StageResult> = verdicts.into_iter().map(|o| self.to_stage_result(o, 1, elapsed)).collect();
        let outcome = consensus::arbitrate(cfg, votes);
        let mut selected = outcome.selected;
        selected.required = self.required;
        selected
    }
}
