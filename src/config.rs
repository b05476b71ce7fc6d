//! Flat, explicit configuration structs — one per component, composed into
//! a single `CoreConfig`. Validation happens once, at `Core::new` /
//! `WorkflowFactory::build` time.

use std::collections::HashSet;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::route::RouteKind;

/// Worker selection policy used by the Supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPolicy {
    RoundRobin,
    LeastInFlight,
    Weighted,
    Random,
    PerformanceBased,
}

/// Config for the Worker Pool / Supervisor (C2).
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub selection_policy: SelectionPolicy,
    pub breaker_threshold: u32,
    pub breaker_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub default_max_concurrent: usize,
    pub performance_top_k: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            selection_policy: SelectionPolicy::LeastInFlight,
            breaker_threshold: 5,
            breaker_timeout: Duration::from_secs(60),
            retry_attempts: 3,
            retry_delay: Duration::from_millis(100),
            default_max_concurrent: 16,
            performance_top_k: 3,
        }
    }
}

/// Route-optimization strategy (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationStrategy {
    CostFirst,
    SpeedFirst,
    ReliabilityFirst,
    Balanced,
    Custom,
}

/// Weights for the four scoring axes, order: cost, speed, reliability, compliance.
pub type AxisWeights = [f64; 4];

impl OptimizationStrategy {
    pub fn weights(self, custom: AxisWeights) -> AxisWeights {
        match self {
            OptimizationStrategy::CostFirst => [0.6, 0.2, 0.1, 0.1],
            OptimizationStrategy::SpeedFirst => [0.2, 0.6, 0.1, 0.1],
            OptimizationStrategy::ReliabilityFirst => [0.1, 0.1, 0.6, 0.2],
            OptimizationStrategy::Balanced => [0.4, 0.3, 0.2, 0.1],
            OptimizationStrategy::Custom => custom,
        }
    }
}

/// Config for the Route Optimizer Worker (C3).
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    pub strategy: OptimizationStrategy,
    pub custom_weights: AxisWeights,
    pub min_success_rate: f64,
    pub max_delivery: Duration,
    pub max_cost_pct: f64,
    pub enabled_route_kinds: HashSet<RouteKind>,
    pub max_hops: u32,
    pub enable_learning: bool,
    pub learning_rate: f64,
    pub high_value_threshold: Decimal,
    pub preferred_providers: Vec<String>,
    pub excluded_providers: Vec<String>,
    pub hub_currencies: Vec<String>,
    pub candidate_cache_ttl: Duration,
    pub performance_history_size: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        let mut kinds = HashSet::new();
        kinds.insert(RouteKind::Direct);
        kinds.insert(RouteKind::Hub);
        Self {
            strategy: OptimizationStrategy::Balanced,
            custom_weights: [0.4, 0.3, 0.2, 0.1],
            min_success_rate: 0.95,
            max_delivery: Duration::from_secs(1440 * 60),
            max_cost_pct: 0.05,
            enabled_route_kinds: kinds,
            max_hops: 2,
            enable_learning: true,
            learning_rate: 0.1,
            high_value_threshold: Decimal::new(10_000, 0),
            preferred_providers: Vec::new(),
            excluded_providers: Vec::new(),
            hub_currencies: vec!["USD".into(), "EUR".into(), "GBP".into()],
            candidate_cache_ttl: Duration::from_secs(300),
            performance_history_size: 1000,
        }
    }
}

/// Config for the Compliance Worker (C4).
#[derive(Debug, Clone)]
pub struct ComplianceConfig {
    pub kyc_threshold: Decimal,
    pub aml_threshold: Decimal,
    pub high_risk_threshold: f64,
    pub medium_risk_threshold: f64,
    pub sanctions_enabled: bool,
    pub pep_enabled: bool,
    pub adverse_media_enabled: bool,
    pub regulatory_enabled: bool,
    pub alert_on_high_risk: bool,
    pub alert_on_sanctions_match: bool,
    pub alert_on_regulatory_violation: bool,
    pub risk_pattern_history: usize,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            kyc_threshold: Decimal::new(1_000, 0),
            aml_threshold: Decimal::new(3_000, 0),
            high_risk_threshold: 0.7,
            medium_risk_threshold: 0.4,
            sanctions_enabled: true,
            pep_enabled: true,
            adverse_media_enabled: true,
            regulatory_enabled: true,
            alert_on_high_risk: true,
            alert_on_sanctions_match: true,
            alert_on_regulatory_violation: true,
            risk_pattern_history: 1000,
        }
    }
}

/// Consensus combination rule (C8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusRule {
    Majority,
    Weighted,
    Unanimous,
    Threshold,
    Median,
    Average,
}

/// Config for the Consensus Arbiter (C8).
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    pub rule: ConsensusRule,
    pub threshold: f64,
    pub min_agents: usize,
    pub max_agents: usize,
    pub agent_weights: std::collections::HashMap<String, f64>,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            rule: ConsensusRule::Majority,
            threshold: 0.7,
            min_agents: 2,
            max_agents: 5,
            agent_weights: std::collections::HashMap::new(),
        }
    }
}

/// Config for the Workflow Orchestrator (C6).
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_parallel_steps: usize,
    pub global_timeout: Duration,
    pub default_stage_timeout: Duration,
    /// Per-stage overrides, keyed by stage id. Mirrors the original
    /// implementation's `*_timeout` fields on its workflow config.
    pub stage_timeouts: std::collections::HashMap<String, Duration>,
    pub enable_consensus: bool,
    pub consensus_capable_stages: HashSet<String>,
    pub breaker_threshold: u32,
    pub breaker_timeout: Duration,
}

impl OrchestratorConfig {
    pub fn timeout_for(&self, stage_id: &str) -> Duration {
        self.stage_timeouts
            .get(stage_id)
            .copied()
            .unwrap_or(self.default_stage_timeout)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        let mut stage_timeouts = std::collections::HashMap::new();
        stage_timeouts.insert("create_payment".to_string(), Duration::from_secs(10));
        stage_timeouts.insert("validate_payment".to_string(), Duration::from_secs(5));
        stage_timeouts.insert("optimize_route".to_string(), Duration::from_secs(15));
        stage_timeouts.insert("validate_compliance".to_string(), Duration::from_secs(20));
        stage_timeouts.insert("check_liquidity".to_string(), Duration::from_secs(10));
        stage_timeouts.insert("lock_exchange_rate".to_string(), Duration::from_secs(10));
        stage_timeouts.insert("execute_mmo".to_string(), Duration::from_secs(30));
        stage_timeouts.insert("settle_payment".to_string(), Duration::from_secs(60));
        stage_timeouts.insert("confirm_payment".to_string(), Duration::from_secs(10));
        Self {
            max_parallel_steps: 3,
            global_timeout: Duration::from_secs(300),
            default_stage_timeout: Duration::from_secs(15),
            stage_timeouts,
            enable_consensus: false,
            consensus_capable_stages: HashSet::new(),
            breaker_threshold: 10,
            breaker_timeout: Duration::from_secs(60),
        }
    }
}

/// Config for the Workflow Factory's routing policy (C7).
#[derive(Debug, Clone)]
pub struct FactoryConfig {
    pub high_value_threshold: Decimal,
    pub low_threshold: Decimal,
    pub trusted_corridors: HashSet<(String, String)>,
    pub regulated_corridors: HashSet<(String, String)>,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            high_value_threshold: Decimal::new(10_000, 0),
            low_threshold: Decimal::new(100, 0),
            trusted_corridors: HashSet::new(),
            regulated_corridors: HashSet::new(),
        }
    }
}

/// Top-level configuration composed of the per-component structs above.
#[derive(Debug, Clone, Default)]
pub struct CoreConfig {
    pub supervisor: SupervisorConfig,
    pub optimizer: OptimizerConfig,
    pub compliance: ComplianceConfig,
    pub consensus: ConsensusConfig,
    pub orchestrator: OrchestratorConfig,
    pub factory: FactoryConfig,
}
