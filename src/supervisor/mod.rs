//! Worker Pool / Supervisor (C2): bounded-concurrency invocation of
//! workers, load balancing, health, and circuit breaking.

pub mod breaker;
pub mod retry;
pub mod selection;
pub mod state;

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Semaphore;

use crate::cancellation::CancellationToken;
use crate::config::SupervisorConfig;
use crate::context::StagePayload;
use crate::error::{CoreError, CoreResult};
use crate::observability::{CallOutcome, ObservabilitySink, WorkerCallEvent};
use crate::registry::WorkerRegistry;
use crate::worker::{StageTransaction, Worker};

use self::state::{RoundRobinCursor, WorkerState};

struct WorkerHandle {
    worker: Arc<dyn Worker>,
    state: WorkerState,
    semaphore: Semaphore,
}

/// Bounded-concurrency, load-balanced, circuit-broken worker invoker.
pub struct Supervisor {
    registry: Arc<WorkerRegistry>,
    config: SupervisorConfig,
    sink: Arc<dyn ObservabilitySink>,
    handles: DashMap<String, Arc<WorkerHandle>>,
    round_robin: DashMap<String, Arc<RoundRobinCursor>>,
}

impl Supervisor {
    pub fn new(registry: Arc<WorkerRegistry>, config: SupervisorConfig, sink: Arc<dyn ObservabilitySink>) -> Self {
        Self {
            registry,
            config,
            sink,
            handles: DashMap::new(),
            round_robin: DashMap::new(),
        }
    }

    fn handle_for(&self, worker: &Arc<dyn Worker>, max_concurrent: usize) -> Arc<WorkerHandle> {
        self.handles
            .entry(worker.id().to_string())
            .or_insert_with(|| {
                Arc::new(WorkerHandle {
                    worker: worker.clone(),
                    state: WorkerState::new(worker.id(), self.config.breaker_threshold, self.config.breaker_timeout),
                    semaphore: Semaphore::new(max_concurrent.max(1)),
                })
            })
            .clone()
    }

    /// All currently-admitted handles for a capability (breaker not open).
    fn admitted_handles(&self, capability: &str, max_concurrent: usize) -> Vec<Arc<WorkerHandle>> {
        self.registry
            .by_capability(capability)
            .into_iter()
            .map(|w| self.handle_for(&w, max_concurrent))
            .filter(|h| h.state.breaker.admit())
            .collect()
    }

    /// Number of admitted (breaker-closed) worker instances for `capability`,
    /// used by the orchestrator to decide whether a stage is eligible for
    /// consensus mode.
    pub fn capability_worker_count(&self, capability: &str) -> usize {
        let max_concurrent = self
            .registry
            .descriptor(capability)
            .map(|d| d.max_concurrent)
            .unwrap_or(self.config.default_max_concurrent);
        self.admitted_handles(capability, max_concurrent).len()
    }

    /// Dispatch one call of `capability` through the full envelope: worker
    /// selection, bounded concurrency, circuit breaking, and retry with
    /// exponential backoff. Returns the payload (or typed error) and the
    /// number of attempts made.
    pub async fn dispatch(
        &self,
        capability: &str,
        tx: &StageTransaction<'_>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> (CoreResult<StagePayload>, u32) {
        let max_concurrent = self
            .registry
            .descriptor(capability)
            .map(|d| d.max_concurrent)
            .unwrap_or(self.config.default_max_concurrent);

        retry::retry_with_backoff(&self.config, cancel, || {
            self.try_once(capability, tx, timeout, max_concurrent)
        })
        .await
    }

    /// Invoke up to `n` distinct admitted workers of `capability` in
    /// parallel, for consensus mode. Each invocation still goes through the
    /// circuit breaker and concurrency bound, but NOT the retry envelope —
    /// a single failed attempt is just one vote.
    pub async fn dispatch_consensus(
        &self,
        capability: &str,
        tx: &StageTransaction<'_>,
        timeout: Duration,
        n: usize,
    ) -> Vec<CoreResult<StagePayload>> {
        let max_concurrent = self
            .registry
            .descriptor(capability)
            .map(|d| d.max_concurrent)
            .unwrap_or(self.config.default_max_concurrent);
        let handles = self.admitted_handles(capability, max_concurrent);
        let selected: Vec<_> = handles.into_iter().take(n.max(1)).collect();

        let futures = selected
            .into_iter()
            .map(|handle| self.invoke(handle, tx, timeout, capability));
        futures::future::join_all(futures).await
    }

    async fn try_once(
        &self,
        capability: &str,
        tx: &StageTransaction<'_>,
        timeout: Duration,
        max_concurrent: usize,
    ) -> CoreResult<StagePayload> {
        let admitted = self.admitted_handles(capability, max_concurrent);
        if admitted.is_empty() {
            if self.registry.by_capability(capability).is_empty() {
                return Err(CoreError::Internal(format!("no worker registered for {capability}")));
            }
            return Err(CoreError::CircuitOpen(capability.to_string()));
        }

        let states: Vec<&WorkerState> = admitted.iter().map(|h| &h.state).collect();
        let cursor = self
            .round_robin
            .entry(capability.to_string())
            .or_default()
            .clone();
        let idx = selection::select(self.config.selection_policy, &states, &cursor, self.config.performance_top_k);
        let handle = admitted[idx].clone();

        self.invoke(handle, tx, timeout, capability).await
    }

    async fn invoke(
        &self,
        handle: Arc<WorkerHandle>,
        tx: &StageTransaction<'_>,
        timeout: Duration,
        capability: &str,
    ) -> CoreResult<StagePayload> {
        let permit = match tokio::time::timeout(timeout, handle.semaphore.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(CoreError::Internal("worker semaphore closed".into())),
            Err(_) => return Err(CoreError::Busy(handle.worker.id().to_string())),
        };

        handle.state.begin_call();
        let start = Instant::now();
        let result = tokio::time::timeout(timeout, handle.worker.process(tx)).await;
        let elapsed = start.elapsed();
        drop(permit);

        let outcome = match &result {
            Ok(Ok(_)) => CallOutcome::Success,
            Ok(Err(e)) => CallOutcome::Failure(e.kind().to_string()),
            Err(_) => CallOutcome::Failure("stage_timeout".to_string()),
        };
        handle.state.end_call(matches!(outcome, CallOutcome::Success), elapsed);
        self.sink.record_worker_call(WorkerCallEvent {
            worker_id: handle.worker.id().to_string(),
            capability: capability.to_string(),
            outcome,
            elapsed,
        });

        match result {
            Ok(inner) => inner,
            Err(_) => Err(CoreError::StageTimeout(capability.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StagePayload;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct FlakyWorker {
        id: String,
        fail_times: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Worker for FlakyWorker {
        fn id(&self) -> &str {
            &self.id
        }
        fn capability(&self) -> &str {
            "test_cap"
        }
        async fn process(&self, _tx: &StageTransaction<'_>) -> CoreResult<StagePayload> {
            if self.fail_times.load(Ordering::SeqCst) > 0 {
                self.fail_times.fetch_sub(1, Ordering::SeqCst);
                Err(CoreError::AdapterTransient("flaky".into()))
            } else {
                Ok(StagePayload::Empty)
            }
        }
    }

    fn make_intent() -> crate::intent::PaymentIntent {
        crate::intent::PaymentIntent {
            reference_id: "r1".into(),
            amount: rust_decimal::Decimal::new(10000, 2),
            source_currency: "USD".into(),
            destination_currency: "KES".into(),
            payment_type: crate::intent::PaymentType::PersonalRemittance,
            payment_method: crate::intent::PaymentMethod::MobileMoney,
            sender: crate::intent::PartyDescriptor {
                name: "A".into(),
                phone: "1".into(),
                country: "NG".into(),
            },
            recipient: crate::intent::PartyDescriptor {
                name: "B".into(),
                phone: "2".into(),
                country: "KE".into(),
            },
            preferences: None,
        }
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let registry = Arc::new(WorkerRegistry::new());
        let fail_times = Arc::new(AtomicU32::new(2));
        let ft = fail_times.clone();
        registry.register("test_cap", "1.0", vec![], 4, move || {
            Arc::new(FlakyWorker {
                id: "w1".into(),
                fail_times: ft.clone(),
            })
        });
        registry.create("test_cap").unwrap();

        let sink = Arc::new(crate::observability::InMemorySink::default());
        let supervisor = Supervisor::new(
            registry,
            SupervisorConfig {
                retry_attempts: 3,
                retry_delay: Duration::from_millis(1),
                ..Default::default()
            },
            sink,
        );

        let intent = make_intent();
        let tx = StageTransaction {
            stage_id: "s",
            intent: &intent,
            prior: vec![],
        };
        let cancel = CancellationToken::new();
        let (result, attempts) = supervisor
            .dispatch("test_cap", &tx, Duration::from_secs(1), &cancel)
            .await;
        assert!(result.is_ok());
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn circuit_opens_after_threshold_and_fails_fast() {
        let registry = Arc::new(WorkerRegistry::new());
        registry.register("test_cap", "1.0", vec![], 4, move || {
            Arc::new(FlakyWorker {
                id: "w1".into(),
                fail_times: Arc::new(AtomicU32::new(u32::MAX)),
            })
        });
        registry.create("test_cap").unwrap();

        let sink = Arc::new(crate::observability::InMemorySink::default());
        let supervisor = Supervisor::new(
            registry,
            SupervisorConfig {
                retry_attempts: 0,
                retry_delay: Duration::from_millis(1),
                breaker_threshold: 2,
                breaker_timeout: Duration::from_secs(60),
                ..Default::default()
            },
            sink,
        );

        let intent = make_intent();
        let tx = StageTransaction {
            stage_id: "s",
            intent: &intent,
            prior: vec![],
        };
        let cancel = CancellationToken::new();

        for _ in 0..2 {
            let (result, _) = supervisor
                .dispatch("test_cap", &tx, Duration::from_secs(1), &cancel)
                .await;
            assert!(result.is_err());
        }

        let (result, _) = supervisor
            .dispatch("test_cap", &tx, Duration::from_secs(1), &cancel)
            .await;
        assert_eq!(result.unwrap_err().kind(), "circuit_open");
    }
}
