//! Workflow Orchestrator (C6): runs a set of Stage Executors as a DAG,
//! batched by dependency order, under a global timeout, an
//! orchestrator-level circuit breaker, and optional consensus mode.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::config::{ConsensusConfig, OrchestratorConfig};
use crate::context::{StageResult, WorkflowContext};
use crate::intent::PaymentIntent;
use crate::observability::ObservabilitySink;
use crate::stages::StageExecutor;
use crate::supervisor::breaker::CircuitBreaker;
use crate::supervisor::Supervisor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Egress shape of `Orchestrator::run`, per spec.md §6.
#[derive(Debug, Clone)]
pub struct WorkflowResult {
    pub ok: bool,
    pub workflow_id: Uuid,
    pub payment_id: String,
    pub status: WorkflowStatus,
    pub message: String,
    pub elapsed: Duration,
    pub step_results: std::collections::HashMap<String, StageResult>,
    pub transaction_hash: Option<String>,
    pub estimated_delivery: Option<Duration>,
    pub fees_charged: Option<Decimal>,
    pub exchange_rate: Option<Decimal>,
}

impl WorkflowResult {
    fn circuit_open(payment_id: String) -> Self {
        Self {
            ok: false,
            workflow_id: Uuid::nil(),
            payment_id,
            status: WorkflowStatus::Failed,
            message: "orchestrator circuit open".to_string(),
            elapsed: Duration::ZERO,
            step_results: std::collections::HashMap::new(),
            transaction_hash: None,
            estimated_delivery: None,
            fees_charged: None,
            exchange_rate: None,
        }
    }
}

/// Runs a fixed set of stages (the subset a preset selects) against any
/// intent presented to `run`.
pub struct Orchestrator {
    supervisor: Arc<Supervisor>,
    config: OrchestratorConfig,
    consensus_config: ConsensusConfig,
    sink: Arc<dyn ObservabilitySink>,
    breaker: CircuitBreaker,
    stages: Vec<StageExecutor>,
    stage_ids: std::collections::HashSet<&'static str>,
}

impl Orchestrator {
    pub fn new(
        supervisor: Arc<Supervisor>,
        stages: Vec<StageExecutor>,
        config: OrchestratorConfig,
        consensus_config: ConsensusConfig,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Self {
        let breaker = CircuitBreaker::new(config.breaker_threshold, config.breaker_timeout);
        let stage_ids = stages.iter().map(|s| s.spec.id).collect();
        Self { supervisor, config, consensus_config, sink, breaker, stages, stage_ids }
    }

    pub async fn run(&self, intent: PaymentIntent, cancel: CancellationToken) -> WorkflowResult {
        let payment_id = intent.reference_id.clone();
        if !self.breaker.admit() {
            return WorkflowResult::circuit_open(payment_id);
        }

        let mut ctx = WorkflowContext::new(intent);
        let batches = topological_batches(&self.stages);

        let timed_out = tokio::time::timeout(self.config.global_timeout, self.run_batches(&batches, &mut ctx, &cancel))
            .await
            .is_err();
        if timed_out {
            cancel.cancel();
        }

        let required_ok = self
            .stages
            .iter()
            .all(|s| !s.required || ctx.results.get(s.spec.id).is_some_and(|r| r.ok));
        let ok = required_ok && !timed_out && !cancel.is_cancelled();

        if ok {
            self.breaker.record_success();
        } else {
            self.breaker.record_failure();
        }

        let status = if cancel.is_cancelled() && !ok {
            WorkflowStatus::Cancelled
        } else if ok {
            WorkflowStatus::Completed
        } else {
            WorkflowStatus::Failed
        };

        let message = match status {
            WorkflowStatus::Completed => "workflow completed".to_string(),
            WorkflowStatus::Cancelled => "workflow cancelled".to_string(),
            WorkflowStatus::Failed if timed_out => "workflow timed out".to_string(),
            WorkflowStatus::Failed => first_failure_message(&ctx),
        };

        let transaction_hash = ctx.results.get("settle_payment").and_then(|r| r.payload.as_settlement().map(|s| s.to_string()));
        let route = ctx.results.get("optimize_route").and_then(|r| r.payload.as_route_selection());
        let estimated_delivery = route.map(|r| r.route.estimated_delivery);
        let fees_charged = route.map(|r| r.route.estimated_fee);
        let exchange_rate = ctx.results.get("lock_exchange_rate").and_then(|r| r.payload.as_exchange_rate_lock()).map(|(rate, _)| rate);

        WorkflowResult {
            ok,
            workflow_id: ctx.workflow_id,
            payment_id,
            status,
            message,
            elapsed: ctx.elapsed(),
            step_results: ctx.results,
            transaction_hash,
            estimated_delivery,
            fees_charged,
            exchange_rate,
        }
    }

    async fn run_batches(&self, batches: &[Vec<usize>], ctx: &mut WorkflowContext, cancel: &CancellationToken) {
        for batch in batches {
            if cancel.is_cancelled() {
                break;
            }
            let width = self.config.max_parallel_steps.max(1);
            for chunk in batch.chunks(width) {
                let futs: Vec<_> = chunk
                    .iter()
                    .map(|&i| {
                        let executor = &self.stages[i];
                        executor.execute(ctx, &self.supervisor, cancel, self.consensus_for(executor), &self.stage_ids)
                    })
                    .collect();
                let results = futures::future::join_all(futs).await;
                for result in results {
                    self.sink.record_stage_transition(ctx.workflow_id, &result.stage_id, result.ok);
                    ctx.current_stage = Some(result.stage_id.clone());
                    ctx.record(result);
                }
            }
            if self.batch_has_terminal_failure(ctx, batch) {
                ctx.terminal = true;
                break;
            }
        }
    }

    fn consensus_for(&self, executor: &StageExecutor) -> Option<&ConsensusConfig> {
        if self.config.enable_consensus && self.config.consensus_capable_stages.contains(executor.spec.id) {
            Some(&self.consensus_config)
        } else {
            None
        }
    }

    fn batch_has_terminal_failure(&self, ctx: &WorkflowContext, batch: &[usize]) -> bool {
        batch.iter().any(|&i| {
            let id = self.stages[i].spec.id;
            ctx.results.get(id).is_some_and(|r| r.required && !r.ok)
        })
    }
}

fn first_failure_message(ctx: &WorkflowContext) -> String {
    ctx.results
        .values()
        .filter(|r| r.required && !r.ok)
        .min_by_key(|r| r.stage_id.clone())
        .map(|r| format!("{}: {}", r.stage_id, r.message))
        .unwrap_or_else(|| "workflow failed".to_string())
}

/// Kahn's-algorithm batching restricted to the stages present in `stages`;
/// a prereq not present in the slice (skipped by the preset) is treated as
/// already satisfied.
fn topological_batches(stages: &[StageExecutor]) -> Vec<Vec<usize>> {
    let ids: std::collections::HashSet<&str> = stages.iter().map(|s| s.spec.id).collect();
    let mut done: std::collections::HashSet<&str> = std::collections::HashSet::new();
    let mut placed = vec![false; stages.len()];
    let mut batches = Vec::new();

    loop {
        let batch: Vec<usize> = stages
            .iter()
            .enumerate()
            .filter(|(i, s)| {
                !placed[*i]
                    && s.spec
                        .prereqs
                        .iter()
                        .all(|p| done.contains(p) || !ids.contains(p))
            })
            .map(|(i, _)| i)
            .collect();

        if batch.is_empty() {
            break;
        }
        for &i in &batch {
            placed[i] = true;
            done.insert(stages[i].spec.id);
        }
        batches.push(batch);
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StagePayload;
    use crate::error::CoreResult;
    use crate::intent::{PartyDescriptor, PaymentIntent, PaymentMethod, PaymentType};
    use crate::observability::InMemorySink;
    use crate::registry::WorkerRegistry;
    use crate::stages::spec_for;
    use crate::worker::{StageTransaction, Worker};
    use async_trait::async_trait;

    struct AlwaysOk(String);

    #[async_trait]
    impl Worker for AlwaysOk {
        fn id(&self) -> &str {
            &self.0
        }
        fn capability(&self) -> &str {
            &self.0
        }
        async fn process(&self, _tx: &StageTransaction<'_>) -> CoreResult<StagePayload> {
            Ok(StagePayload::Empty)
        }
    }

    fn intent() -> PaymentIntent {
        PaymentIntent {
            reference_id: "r1".into(),
            amount: rust_decimal::Decimal::new(100_00, 2),
            source_currency: "USD".into(),
            destination_currency: "KES".into(),
            payment_type: PaymentType::PersonalRemittance,
            payment_method: PaymentMethod::MobileMoney,
            sender: PartyDescriptor { name: "A".into(), phone: "1".into(), country: "US".into() },
            recipient: PartyDescriptor { name: "B".into(), phone: "2".into(), country: "KE".into() },
            preferences: None,
        }
    }

    fn wire_registry() -> Arc<WorkerRegistry> {
        let registry = Arc::new(WorkerRegistry::new());
        for cap in [
            "payment_service",
            "route_optimization",
            "compliance",
            "liquidity",
            "exchange_rate",
            "mmo_service",
            "settlement",
        ] {
            registry.register(cap, "1.0", vec![], 4, move || Arc::new(AlwaysOk(cap.to_string())));
            registry.create(cap).unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn full_pipeline_completes_when_every_capability_succeeds() {
        let registry = wire_registry();
        let supervisor = Arc::new(Supervisor::new(registry, Default::default(), Arc::new(InMemorySink::default())));
        let stages: Vec<StageExecutor> = crate::stages::CANONICAL_PIPELINE
            .iter()
            .map(|s| StageExecutor::new(*s, Duration::from_secs(1), true))
            .collect();
        let orchestrator = Orchestrator::new(supervisor, stages, OrchestratorConfig::default(), ConsensusConfig::default(), Arc::new(InMemorySink::default()));

        let result = orchestrator.run(intent(), CancellationToken::new()).await;
        assert!(result.ok);
        assert_eq!(result.status, WorkflowStatus::Completed);
        assert_eq!(result.step_results.len(), crate::stages::CANONICAL_PIPELINE.len());
    }

    #[tokio::test]
    async fn missing_capability_fails_required_stage_and_halts_downstream() {
        let registry = Arc::new(WorkerRegistry::new());
        registry.register("payment_service", "1.0", vec![], 4, || Arc::new(AlwaysOk("payment_service".to_string())));
        registry.create("payment_service").unwrap();
        let supervisor = Arc::new(Supervisor::new(registry, crate::config::SupervisorConfig { retry_attempts: 0, ..Default::default() }, Arc::new(InMemorySink::default())));
        let stages: Vec<StageExecutor> = crate::stages::CANONICAL_PIPELINE
            .iter()
            .take(3)
            .map(|s| StageExecutor::new(*s, Duration::from_secs(1), true))
            .collect();
        let orchestrator = Orchestrator::new(supervisor, stages, OrchestratorConfig::default(), ConsensusConfig::default(), Arc::new(InMemorySink::default()));

        let result = orchestrator.run(intent(), CancellationToken::new()).await;
        assert!(!result.ok);
        assert_eq!(result.status, WorkflowStatus::Failed);
        assert!(!result.step_results.get("optimize_route").unwrap().ok);
    }

    #[test]
    fn topological_batches_respects_linear_dependency_chain() {
        let stages: Vec<StageExecutor> = crate::stages::CANONICAL_PIPELINE
            .iter()
            .map(|s| StageExecutor::new(*s, Duration::from_secs(1), true))
            .collect();
        let batches = topological_batches(&stages);
        assert_eq!(batches.len(), crate::stages::CANONICAL_PIPELINE.len());
        for batch in &batches {
            assert_eq!(batch.len(), 1);
        }
    }

    #[test]
    fn topological_batches_treats_skipped_prereq_as_satisfied() {
        let stages: Vec<StageExecutor> = crate::stages::CANONICAL_PIPELINE
            .iter()
            .filter(|s| s.id != "check_liquidity")
            .map(|s| StageExecutor::new(*s, Duration::from_secs(1), true))
            .collect();
        let batches = topological_batches(&stages);
        let lock_rate_batch = batches
            .iter()
            .position(|b| b.iter().any(|&i| stages[i].spec.id == "lock_exchange_rate"))
            .unwrap();
        assert!(lock_rate_batch > 0);
    }
}
