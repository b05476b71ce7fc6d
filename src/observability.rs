//! Observability Sink: an external collaborator (per spec.md §2, out of
//! scope to implement a real backend). The core only defines the shape of
//! what it records and ships an in-memory reference sink for tests.

use std::time::Duration;

use parking_lot::Mutex;

/// Outcome of a single worker invocation, as observed by the Supervisor.
#[derive(Debug, Clone)]
pub struct WorkerCallEvent {
    pub worker_id: String,
    pub capability: String,
    pub outcome: CallOutcome,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure(String),
}

/// A compliance alert, emitted on high-risk, sanctions-match, or regulatory
/// violation per spec.md §4.4 (supplemented by `compliance_checker.py`'s
/// `alert_on_*` flags).
#[derive(Debug, Clone)]
pub struct ComplianceAlert {
    pub category: &'static str,
    pub reference_id: String,
    pub detail: String,
}

/// Records per-stage and per-worker counters. The core never assumes a
/// concrete backend — only that recording is cheap and infallible from the
/// caller's point of view.
pub trait ObservabilitySink: Send + Sync {
    fn record_worker_call(&self, event: WorkerCallEvent);
    fn record_compliance_alert(&self, alert: ComplianceAlert);
    fn record_stage_transition(&self, workflow_id: uuid::Uuid, stage_id: &str, ok: bool);
}

/// In-memory sink used by tests and as a safe default: never fails, bounds
/// its own memory by capping retained events.
pub struct InMemorySink {
    max_events: usize,
    calls: Mutex<Vec<WorkerCallEvent>>,
    alerts: Mutex<Vec<ComplianceAlert>>,
}

impl Default for InMemorySink {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl InMemorySink {
    pub fn new(max_events: usize) -> Self {
        Self {
            max_events,
            calls: Mutex::new(Vec::new()),
            alerts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<WorkerCallEvent> {
        self.calls.lock().clone()
    }

    pub fn alerts(&self) -> Vec<ComplianceAlert> {
        self.alerts.lock().clone()
    }
}

impl ObservabilitySink for InMemorySink {
    fn record_worker_call(&self, event: WorkerCallEvent) {
        tracing::debug!(
            worker_id = %event.worker_id,
            capability = %event.capability,
            outcome = ?event.outcome,
            elapsed_ms = event.elapsed.as_millis() as u64,
            "worker call"
        );
        let mut calls = self.calls.lock();
        calls.push(event);
        if calls.len() > self.max_events {
            let overflow = calls.len() - self.max_events;
            calls.drain(0..overflow);
        }
    }

    fn record_compliance_alert(&self, alert: ComplianceAlert) {
        tracing::warn!(category = alert.category, reference_id = %alert.reference_id, "compliance alert");
        let mut alerts = self.alerts.lock();
        alerts.push(alert);
        if alerts.len() > self.max_events {
            let overflow = alerts.len() - self.max_events;
            alerts.drain(0..overflow);
        }
    }

    fn record_stage_transition(&self, workflow_id: uuid::Uuid, stage_id: &str, ok: bool) {
        tracing::debug!(%workflow_id, stage_id, ok, "stage transition");
    }
}
