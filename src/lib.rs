//! Cross-border payment orchestration core.
//!
//! A payment intent is driven through a configurable multi-stage pipeline —
//! route optimization, compliance screening, liquidity check, exchange-rate
//! locking, mobile-money execution, blockchain settlement, confirmation —
//! to a terminal `WorkflowResult`. The pipeline is a DAG of [`stages`]
//! consuming capabilities registered in a [`registry::WorkerRegistry`] and
//! dispatched through a [`supervisor::Supervisor`]; an
//! [`orchestrator::Orchestrator`], assembled by [`factory::WorkflowFactory`],
//! drives the DAG to completion.

pub mod adapters;
pub mod cancellation;
pub mod compliance;
pub mod config;
pub mod consensus;
pub mod context;
pub mod error;
pub mod factory;
pub mod intent;
pub mod observability;
pub mod orchestrator;
pub mod registry;
pub mod route;
pub mod stages;
pub mod supervisor;
pub mod worker;
pub mod workers;

pub use config::CoreConfig;
pub use context::{StagePayload, StageResult, WorkflowContext};
pub use error::{CoreError, CoreResult};
pub use factory::{PresetName, WorkflowFactory};
pub use intent::PaymentIntent;
pub use orchestrator::{Orchestrator, WorkflowResult, WorkflowStatus};
pub use registry::WorkerRegistry;
pub use supervisor::Supervisor;
pub use worker::{StageTransaction, Worker};

use std::sync::Arc;

use observability::ObservabilitySink;

/// Process-wide handle: the Registry, Supervisor, and Factory wired
/// together against one config and one Observability Sink. Replaces the
/// original implementation's module-level singletons — callers construct
/// one `Core` at startup and thread it through, rather than reaching for
/// global state.
pub struct Core {
    pub registry: Arc<WorkerRegistry>,
    pub supervisor: Arc<Supervisor>,
    pub factory: WorkflowFactory,
    pub config: CoreConfig,
}

impl Core {
    /// Construct a `Core` from a config and sink. Callers register workers
    /// against `registry` afterward, then call `factory.build(preset)` or
    /// `factory.route(..)` to obtain an `Orchestrator`.
    pub fn new(config: CoreConfig, sink: Arc<dyn ObservabilitySink>) -> Self {
        let registry = Arc::new(WorkerRegistry::new());
        let supervisor = Arc::new(Supervisor::new(registry.clone(), config.supervisor.clone(), sink.clone()));
        let factory = WorkflowFactory::new(registry.clone(), supervisor.clone(), sink, config.factory.clone());
        Self { registry, supervisor, factory, config }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::InMemorySink;

    #[test]
    fn core_new_wires_registry_supervisor_and_factory() {
        let core = Core::new(CoreConfig::default(), Arc::new(InMemorySink::default()));
        assert!(!core.registry.is_registered("payment_service"));
        // factory.build fails until capabilities are registered; the point
        // of this test is only that construction doesn't panic.
        assert!(core.factory.build(PresetName::Standard).is_err());
    }
}
