//! Workflow context and stage results. The context is owned exclusively by
//! the orchestrator for the lifetime of a single run.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::intent::PaymentIntent;
use crate::route::RouteScore;

/// Stage-specific payload, one variant per stage id in the canonical
/// pipeline (spec.md §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StagePayload {
    PaymentRecord {
        normalized_amount: Decimal,
        normalized_currency_pair: (String, String),
    },
    ValidationOutcome {
        reason: String,
    },
    RouteSelection(RouteScore),
    Compliance(crate::compliance::ComplianceResult),
    Liquidity {
        available: bool,
        detail: String,
    },
    ExchangeRateLock {
        rate: Decimal,
        expiry: DateTime<Utc>,
    },
    MmoExecution {
        provider_tx_id: String,
    },
    Settlement {
        chain_tx_hash: String,
    },
    Confirmation {
        completed_record_id: String,
    },
    Empty,
}

impl StagePayload {
    pub fn as_route_selection(&self) -> Option<&RouteScore> {
        match self {
            StagePayload::RouteSelection(score) => Some(score),
            _ => None,
        }
    }

    pub fn as_compliance(&self) -> Option<&crate::compliance::ComplianceResult> {
        match self {
            StagePayload::Compliance(result) => Some(result),
            _ => None,
        }
    }

    pub fn as_exchange_rate_lock(&self) -> Option<(Decimal, DateTime<Utc>)> {
        match self {
            StagePayload::ExchangeRateLock { rate, expiry } => Some((*rate, *expiry)),
            _ => None,
        }
    }

    pub fn as_mmo_execution(&self) -> Option<&str> {
        match self {
            StagePayload::MmoExecution { provider_tx_id } => Some(provider_tx_id),
            _ => None,
        }
    }

    pub fn as_settlement(&self) -> Option<&str> {
        match self {
            StagePayload::Settlement { chain_tx_hash } => Some(chain_tx_hash),
            _ => None,
        }
    }
}

/// Result of attempting a single stage. A stage not present in the
/// context's `results` map has not been attempted; a stage present with
/// `ok = false` has exhausted its retries for this run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub ok: bool,
    pub stage_id: String,
    pub message: String,
    pub payload: StagePayload,
    pub error_kind: Option<String>,
    pub elapsed: Duration,
    pub attempt: u32,
    pub required: bool,
}

impl StageResult {
    pub fn success(stage_id: impl Into<String>, payload: StagePayload, elapsed: Duration, attempt: u32) -> Self {
        Self {
            ok: true,
            stage_id: stage_id.into(),
            message: "ok".to_string(),
            payload,
            error_kind: None,
            elapsed,
            attempt,
            required: true,
        }
    }

    pub fn failure(
        stage_id: impl Into<String>,
        message: impl Into<String>,
        error_kind: impl Into<String>,
        elapsed: Duration,
        attempt: u32,
        required: bool,
    ) -> Self {
        Self {
            ok: false,
            stage_id: stage_id.into(),
            message: message.into(),
            payload: StagePayload::Empty,
            error_kind: Some(error_kind.into()),
            elapsed,
            attempt,
            required,
        }
    }
}

/// Per-run mutable state, owned exclusively by the orchestrator for the
/// duration of one `run` call. Destroyed after the run emits its final
/// result (an embedder may archive a clone under its own retention policy).
pub struct WorkflowContext {
    pub workflow_id: Uuid,
    pub intent: PaymentIntent,
    pub results: HashMap<String, StageResult>,
    pub start: Instant,
    pub current_stage: Option<String>,
    pub terminal: bool,
}

impl WorkflowContext {
    pub fn new(intent: PaymentIntent) -> Self {
        Self {
            workflow_id: Uuid::new_v4(),
            intent,
            results: HashMap::new(),
            start: Instant::now(),
            current_stage: None,
            terminal: false,
        }
    }

    /// True iff every id in `prereqs` is either absent from this run's
    /// `run_stage_ids` (skipped by the preset, so trivially satisfied) or
    /// present in `results` with `ok = true`. Mirrors
    /// `orchestrator::topological_batches`'s "prereq not in this run's stage
    /// set counts as satisfied" treatment of skipped stages.
    pub fn prerequisites_ok(&self, prereqs: &[&str], run_stage_ids: &std::collections::HashSet<&str>) -> bool {
        prereqs
            .iter()
            .all(|id| !run_stage_ids.contains(id) || self.results.get(*id).is_some_and(|r| r.ok))
    }

    pub fn record(&mut self, result: StageResult) {
        self.results.insert(result.stage_id.clone(), result);
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
