//! Candidate routes and their scores, produced by the Route Optimizer (C3)
//! and owned thereafter by the workflow context.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// The shape of a candidate payment route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteKind {
    Direct,
    Hub,
    MultiHop,
}

/// A candidate route discovered for a payment intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRoute {
    pub id: String,
    pub kind: RouteKind,
    pub providers: Vec<String>,
    pub estimated_fee: Decimal,
    pub estimated_delivery: Duration,
    pub success_rate: f64,
    pub compliance_score: f64,
    pub metadata: HashMap<String, String>,
}

/// A scored candidate route. All sub-scores are in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteScore {
    pub route: CandidateRoute,
    pub cost_score: f64,
    pub speed_score: f64,
    pub reliability_score: f64,
    pub compliance_score: f64,
    pub total_score: f64,
    pub rank: usize,
    pub confidence: f64,
}

/// Result of a single `optimize` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub selected: Option<RouteScore>,
    pub alternatives: Vec<RouteScore>,
    pub routes_evaluated: usize,
    pub elapsed: Duration,
    pub confidence: f64,
    pub cost_savings_pct: Option<f64>,
    pub reason: String,
}

/// Outcome of a settled route, fed back into the optimizer's learning loop.
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub route_id: String,
    pub success: bool,
    pub realized_cost: Decimal,
    pub realized_delivery: Duration,
}
