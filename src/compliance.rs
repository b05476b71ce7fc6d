//! Compliance Worker (C4): KYC/AML thresholding, sanctions/PEP/adverse-media
//! screening, and regulatory checks, aggregated into a single risk verdict.
//!
//! Grounded on `agents/templates/compliance_checker.py`: the threshold
//! structure, the weighted risk aggregation, and the alerting side channel
//! are carried across; screening providers themselves are out of scope and
//! are represented here by a pluggable trait so an embedder can wire in a
//! real sanctions/PEP/adverse-media list.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::config::ComplianceConfig;
use crate::context::StagePayload;
use crate::error::{CoreError, CoreResult};
use crate::intent::PaymentIntent;
use crate::observability::{ComplianceAlert, ObservabilitySink};
use crate::worker::{StageTransaction, Worker};
use std::sync::Arc;

/// One screening dimension evaluated during a compliance check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckType {
    Kyc,
    Aml,
    Sanctions,
    Pep,
    AdverseMedia,
    Regulatory,
}

impl CheckType {
    /// Weight of this dimension in the aggregate risk score.
    fn weight(self) -> f64 {
        match self {
            CheckType::Sanctions => 0.4,
            CheckType::Aml => 0.3,
            CheckType::Pep => 0.2,
            CheckType::Kyc => 0.1,
            CheckType::AdverseMedia => 0.1,
            CheckType::Regulatory => 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckStatus {
    Passed,
    Failed,
    Error,
}

/// Risk band derived from the aggregated risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Outcome of a single screening dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub kind: CheckType,
    pub status: CheckStatus,
    pub axis_risk: f64,
    pub confidence: f64,
    pub duration: Duration,
}

/// Aggregate result of a compliance check over a payment intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceResult {
    pub ok: bool,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub checks: Vec<CheckOutcome>,
    pub violations: Vec<String>,
    pub required_actions: Vec<String>,
}

/// External screening provider contract. The core ships a permissive
/// in-memory default (`NullScreeningProvider`) for tests and embedders that
/// have not yet wired a real screening backend; production embedders supply
/// their own.
#[async_trait]
pub trait ScreeningProvider: Send + Sync {
    async fn sanctions_match(&self, party_name: &str, country: &str) -> CoreResult<bool>;
    async fn pep_match(&self, party_name: &str) -> CoreResult<bool>;
    async fn adverse_media_match(&self, party_name: &str) -> CoreResult<bool>;
}

/// Always-clear screening provider: useful for local development and tests.
pub struct NullScreeningProvider;

#[async_trait]
impl ScreeningProvider for NullScreeningProvider {
    async fn sanctions_match(&self, _party_name: &str, _country: &str) -> CoreResult<bool> {
        Ok(false)
    }
    async fn pep_match(&self, _party_name: &str) -> CoreResult<bool> {
        Ok(false)
    }
    async fn adverse_media_match(&self, _party_name: &str) -> CoreResult<bool> {
        Ok(false)
    }
}

/// Regulatory restriction on a corridor (sender country -> recipient country).
#[derive(Debug, Clone)]
pub struct RegulatoryRestriction {
    pub sender_country: String,
    pub recipient_country: String,
    pub reason: String,
}

pub struct ComplianceWorker {
    id: String,
    config: ComplianceConfig,
    screening: Arc<dyn ScreeningProvider>,
    restricted_corridors: Vec<RegulatoryRestriction>,
    sink: Arc<dyn ObservabilitySink>,
}

impl ComplianceWorker {
    pub fn new(
        id: impl Into<String>,
        config: ComplianceConfig,
        screening: Arc<dyn ScreeningProvider>,
        restricted_corridors: Vec<RegulatoryRestriction>,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Self {
        Self {
            id: id.into(),
            config,
            screening,
            restricted_corridors,
            sink,
        }
    }

    /// Run every conditionally-enabled screening dimension and aggregate
    /// into a single verdict, per the weighted-mean formula.
    pub async fn check(&self, intent: &PaymentIntent) -> CoreResult<ComplianceResult> {
        let mut checks = Vec::new();
        let mut violations = Vec::new();

        if intent.amount >= self.config.kyc_threshold {
            checks.push(self.kyc_check(intent));
        }
        if intent.amount >= self.config.aml_threshold {
            checks.push(self.aml_check(intent));
        }

        if self.config.sanctions_enabled {
            let start = Instant::now();
            let hit = self.screen_either(intent, ScreenKind::Sanctions).await?;
            checks.push(CheckOutcome {
                kind: CheckType::Sanctions,
                status: if hit { CheckStatus::Failed } else { CheckStatus::Passed },
                axis_risk: if hit { 1.0 } else { 0.0 },
                confidence: 1.0,
                duration: start.elapsed(),
            });
            if hit {
                violations.push("sanctions_match".to_string());
            }
        }

        if self.config.pep_enabled {
            let start = Instant::now();
            let hit = self.screen_either(intent, ScreenKind::Pep).await?;
            checks.push(CheckOutcome {
                kind: CheckType::Pep,
                status: CheckStatus::Passed,
                axis_risk: if hit { 0.6 } else { 0.0 },
                confidence: 0.9,
                duration: start.elapsed(),
            });
        }

        if self.config.adverse_media_enabled {
            let start = Instant::now();
            let hit = self.screen_either(intent, ScreenKind::AdverseMedia).await?;
            checks.push(CheckOutcome {
                kind: CheckType::AdverseMedia,
                status: CheckStatus::Passed,
                axis_risk: if hit { 0.4 } else { 0.0 },
                confidence: 0.8,
                duration: start.elapsed(),
            });
        }

        if self.config.regulatory_enabled {
            let start = Instant::now();
            let restricted = self.restricted_corridors.iter().find(|r| {
                r.sender_country == intent.sender.country && r.recipient_country == intent.recipient.country
            });
            let hit = restricted.is_some();
            checks.push(CheckOutcome {
                kind: CheckType::Regulatory,
                status: if hit { CheckStatus::Failed } else { CheckStatus::Passed },
                axis_risk: if hit { 1.0 } else { 0.0 },
                confidence: 1.0,
                duration: start.elapsed(),
            });
            if let Some(r) = restricted {
                violations.push(format!("regulatory_violation: {}", r.reason));
            }
        }

        let risk_score = Self::aggregate_risk(&checks);
        let risk_level = self.risk_level(risk_score);
        let any_failed = checks.iter().any(|c| c.status == CheckStatus::Failed);
        let ok = !any_failed && risk_score <= self.config.high_risk_threshold;

        let mut required_actions = Vec::new();
        if matches!(risk_level, RiskLevel::High | RiskLevel::Critical) {
            required_actions.push("manual_review_required".to_string());
        }
        if checks
            .iter()
            .any(|c| c.kind == CheckType::Kyc && c.status == CheckStatus::Failed)
        {
            required_actions.push("enhanced_due_diligence".to_string());
        }

        let result = ComplianceResult {
            ok,
            risk_score,
            risk_level,
            checks,
            violations,
            required_actions,
        };

        self.raise_alerts(intent, &result);

        Ok(result)
    }

    async fn screen_either(&self, intent: &PaymentIntent, kind: ScreenKind) -> CoreResult<bool> {
        match kind {
            ScreenKind::Sanctions => {
                let sender = self.screening.sanctions_match(&intent.sender.name, &intent.sender.country).await?;
                let recipient = self
                    .screening
                    .sanctions_match(&intent.recipient.name, &intent.recipient.country)
                    .await?;
                Ok(sender || recipient)
            }
            ScreenKind::Pep => {
                let sender = self.screening.pep_match(&intent.sender.name).await?;
                let recipient = self.screening.pep_match(&intent.recipient.name).await?;
                Ok(sender || recipient)
            }
            ScreenKind::AdverseMedia => {
                let sender = self.screening.adverse_media_match(&intent.sender.name).await?;
                let recipient = self.screening.adverse_media_match(&intent.recipient.name).await?;
                Ok(sender || recipient)
            }
        }
    }

    fn kyc_check(&self, intent: &PaymentIntent) -> CheckOutcome {
        // Above the KYC threshold, the intent must carry preferences as a
        // stand-in for verified identity metadata supplied by the embedder.
        let documented = intent.preferences.is_some();
        CheckOutcome {
            kind: CheckType::Kyc,
            status: if documented { CheckStatus::Passed } else { CheckStatus::Failed },
            axis_risk: if documented { 0.1 } else { 0.8 },
            confidence: 0.9,
            duration: Duration::ZERO,
        }
    }

    fn aml_check(&self, intent: &PaymentIntent) -> CheckOutcome {
        let ratio = (intent.amount / self.config.aml_threshold).to_f64().unwrap_or(1.0);
        let axis_risk = ((ratio - 1.0).max(0.0) * 0.5).min(1.0);
        CheckOutcome {
            kind: CheckType::Aml,
            status: if axis_risk > 0.8 { CheckStatus::Failed } else { CheckStatus::Passed },
            axis_risk,
            confidence: 0.85,
            duration: Duration::ZERO,
        }
    }

    /// Weighted mean of `axis_risk` over participating checks, normalized by
    /// the sum of the weights of the checks that actually ran.
    fn aggregate_risk(checks: &[CheckOutcome]) -> f64 {
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for check in checks {
            let w = check.kind.weight();
            weighted_sum += w * check.axis_risk;
            weight_total += w;
        }
        if weight_total <= 0.0 {
            0.0
        } else {
            (weighted_sum / weight_total).clamp(0.0, 1.0)
        }
    }

    fn risk_level(&self, risk_score: f64) -> RiskLevel {
        let critical_at = self.config.high_risk_threshold;
        let high_at = self.config.medium_risk_threshold * 1.75;
        if risk_score >= critical_at {
            RiskLevel::Critical
        } else if risk_score >= high_at {
            RiskLevel::High
        } else if risk_score >= 0.2 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    fn raise_alerts(&self, intent: &PaymentIntent, result: &ComplianceResult) {
        if self.config.alert_on_sanctions_match && result.violations.iter().any(|v| v == "sanctions_match") {
            self.sink.record_compliance_alert(ComplianceAlert {
                category: "sanctions_match",
                reference_id: intent.reference_id.clone(),
                detail: "sanctions screening hit".to_string(),
            });
        }
        if self.config.alert_on_high_risk && matches!(result.risk_level, RiskLevel::High | RiskLevel::Critical) {
            self.sink.record_compliance_alert(ComplianceAlert {
                category: "high_risk",
                reference_id: intent.reference_id.clone(),
                detail: format!("risk_score={:.2}", result.risk_score),
            });
        }
        if self.config.alert_on_regulatory_violation {
            if let Some(v) = result.violations.iter().find(|v| v.starts_with("regulatory_violation")) {
                self.sink.record_compliance_alert(ComplianceAlert {
                    category: "regulatory_violation",
                    reference_id: intent.reference_id.clone(),
                    detail: v.clone(),
                });
            }
        }
    }
}

enum ScreenKind {
    Sanctions,
    Pep,
    AdverseMedia,
}

/// Convenience guard used by the stage executor to convert an unapproved
/// result into the typed error the orchestrator propagates.
pub fn require_ok(result: &ComplianceResult) -> CoreResult<()> {
    if result.ok {
        Ok(())
    } else if result.violations.iter().any(|v| v == "sanctions_match") {
        Err(CoreError::ComplianceRejected("sanctions match".to_string()))
    } else {
        Err(CoreError::ComplianceRejected(format!(
            "risk_level={:?} risk_score={:.2}",
            result.risk_level, result.risk_score
        )))
    }
}

#[async_trait]
impl Worker for ComplianceWorker {
    fn id(&self) -> &str {
        &self.id
    }

    fn capability(&self) -> &str {
        "compliance"
    }

    async fn process(&self, tx: &StageTransaction<'_>) -> CoreResult<StagePayload> {
        let result = self.check(tx.intent).await?;
        require_ok(&result)?;
        Ok(StagePayload::Compliance(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{PartyDescriptor, PaymentMethod, PaymentType, Preferences};
    use crate::observability::InMemorySink;

    fn intent(amount: &str, documented: bool) -> PaymentIntent {
        PaymentIntent {
            reference_id: "r1".into(),
            amount: amount.parse().unwrap(),
            source_currency: "USD".into(),
            destination_currency: "KES".into(),
            payment_type: PaymentType::PersonalRemittance,
            payment_method: PaymentMethod::MobileMoney,
            sender: PartyDescriptor {
                name: "Alice".into(),
                phone: "1".into(),
                country: "US".into(),
            },
            recipient: PartyDescriptor {
                name: "Bob".into(),
                phone: "2".into(),
                country: "KE".into(),
            },
            preferences: if documented { Some(Preferences::default()) } else { None },
        }
    }

    #[tokio::test]
    async fn small_payment_below_thresholds_clears_with_no_checks() {
        let worker = ComplianceWorker::new(
            "compliance-1",
            ComplianceConfig::default(),
            Arc::new(NullScreeningProvider),
            vec![],
            Arc::new(InMemorySink::default()),
        );
        let result = worker.check(&intent("50.00", false)).await.unwrap();
        assert!(result.ok);
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert!(result.checks.is_empty());
    }

    #[tokio::test]
    async fn regulatory_restriction_hard_fails() {
        let restriction = RegulatoryRestriction {
            sender_country: "US".into(),
            recipient_country: "KE".into(),
            reason: "embargo".into(),
        };
        let worker = ComplianceWorker::new(
            "compliance-1",
            ComplianceConfig::default(),
            Arc::new(NullScreeningProvider),
            vec![restriction],
            Arc::new(InMemorySink::default()),
        );
        let result = worker.check(&intent("50.00", true)).await.unwrap();
        assert!(!result.ok);
        assert!(require_ok(&result).is_err());
    }

    #[tokio::test]
    async fn large_undocumented_payment_fails_kyc() {
        let worker = ComplianceWorker::new(
            "compliance-1",
            ComplianceConfig::default(),
            Arc::new(NullScreeningProvider),
            vec![],
            Arc::new(InMemorySink::default()),
        );
        let result = worker.check(&intent("5000.00", false)).await.unwrap();
        assert!(!result.ok);
        assert!(result
            .checks
            .iter()
            .any(|c| c.kind == CheckType::Kyc && c.status == CheckStatus::Failed));
    }

    #[tokio::test]
    async fn process_fails_the_stage_when_compliance_rejects() {
        let restriction = RegulatoryRestriction {
            sender_country: "US".into(),
            recipient_country: "KE".into(),
            reason: "embargo".into(),
        };
        let worker = ComplianceWorker::new(
            "compliance-1",
            ComplianceConfig::default(),
            Arc::new(NullScreeningProvider),
            vec![restriction],
            Arc::new(InMemorySink::default()),
        );
        let intent = intent("50.00", true);
        let tx = crate::worker::StageTransaction {
            stage_id: "validate_compliance",
            intent: &intent,
            prior: vec![],
        };
        let err = worker.process(&tx).await.unwrap_err();
        assert_eq!(err.kind(), "compliance_rejected");
    }

    #[tokio::test]
    async fn documented_large_payment_passes_kyc() {
        let worker = ComplianceWorker::new(
            "compliance-1",
            ComplianceConfig::default(),
            Arc::new(NullScreeningProvider),
            vec![],
            Arc::new(InMemorySink::default()),
        );
        let result = worker.check(&intent("5000.00", true)).await.unwrap();
        assert!(result.ok);
    }
}
