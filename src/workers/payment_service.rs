//! Payment Service Worker (capability `payment_service`): backs the three
//! payment-record stages — `create_payment`, `validate_payment`, and
//! `confirm_payment` — that don't warrant a capability of their own.

use async_trait::async_trait;

use crate::context::StagePayload;
use crate::error::{CoreError, CoreResult};
use crate::worker::{StageTransaction, Worker};

pub struct PaymentServiceWorker {
    id: String,
    supported_recipient_countries: Vec<String>,
}

impl PaymentServiceWorker {
    pub fn new(id: impl Into<String>, supported_recipient_countries: Vec<String>) -> Self {
        Self {
            id: id.into(),
            supported_recipient_countries,
        }
    }

    fn create_payment(&self, tx: &StageTransaction<'_>) -> CoreResult<StagePayload> {
        tx.intent.validate().map_err(CoreError::ValidationFailed)?;
        Ok(StagePayload::PaymentRecord {
            normalized_amount: tx.intent.amount,
            normalized_currency_pair: (
                tx.intent.source_currency.to_uppercase(),
                tx.intent.destination_currency.to_uppercase(),
            ),
        })
    }

    fn validate_payment(&self, tx: &StageTransaction<'_>) -> CoreResult<StagePayload> {
        if !self.supported_recipient_countries.is_empty()
            && !self
                .supported_recipient_countries
                .iter()
                .any(|c| c == &tx.intent.recipient.country)
        {
            return Err(CoreError::ValidationFailed(format!(
                "recipient country {} not supported",
                tx.intent.recipient.country
            )));
        }
        Ok(StagePayload::ValidationOutcome {
            reason: "validated".to_string(),
        })
    }

    fn confirm_payment(&self, tx: &StageTransaction<'_>) -> CoreResult<StagePayload> {
        let chain_tx_hash = tx
            .find_prior(|p| p.as_settlement().map(|h| h.to_string()))
            .ok_or_else(|| CoreError::PrerequisiteFailed("settle_payment".to_string()))?;
        Ok(StagePayload::Confirmation {
            completed_record_id: format!("{}-{}", tx.intent.reference_id, chain_tx_hash),
        })
    }
}

#[async_trait]
impl Worker for PaymentServiceWorker {
    fn id(&self) -> &str {
        &self.id
    }

    fn capability(&self) -> &str {
        "payment_service"
    }

    async fn process(&self, tx: &StageTransaction<'_>) -> CoreResult<StagePayload> {
        match tx.stage_id {
            "create_payment" => self.create_payment(tx),
            "validate_payment" => self.validate_payment(tx),
            "confirm_payment" => self.confirm_payment(tx),
            other => Err(CoreError::Internal(format!("payment_service cannot handle stage {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{PartyDescriptor, PaymentIntent, PaymentMethod, PaymentType};
    use rust_decimal::Decimal;

    fn intent() -> PaymentIntent {
        PaymentIntent {
            reference_id: "r1".into(),
            amount: Decimal::new(100_00, 2),
            source_currency: "usd".into(),
            destination_currency: "kes".into(),
            payment_type: PaymentType::PersonalRemittance,
            payment_method: PaymentMethod::MobileMoney,
            sender: PartyDescriptor {
                name: "A".into(),
                phone: "1".into(),
                country: "US".into(),
            },
            recipient: PartyDescriptor {
                name: "B".into(),
                phone: "2".into(),
                country: "KE".into(),
            },
            preferences: None,
        }
    }

    #[tokio::test]
    async fn create_payment_normalizes_currency_case() {
        let worker = PaymentServiceWorker::new("ps-1", vec![]);
        let intent = intent();
        let tx = StageTransaction {
            stage_id: "create_payment",
            intent: &intent,
            prior: vec![],
        };
        match worker.process(&tx).await.unwrap() {
            StagePayload::PaymentRecord { normalized_currency_pair, .. } => {
                assert_eq!(normalized_currency_pair, ("USD".to_string(), "KES".to_string()));
            }
            _ => panic!("wrong payload variant"),
        }
    }

    #[tokio::test]
    async fn validate_payment_rejects_unsupported_recipient_country() {
        let worker = PaymentServiceWorker::new("ps-1", vec!["NG".to_string()]);
        let intent = intent();
        let tx = StageTransaction {
            stage_id: "validate_payment",
            intent: &intent,
            prior: vec![],
        };
        let err = worker.process(&tx).await.unwrap_err();
        assert_eq!(err.kind(), "validation_failed");
    }

    #[tokio::test]
    async fn confirm_payment_requires_settlement_payload() {
        let worker = PaymentServiceWorker::new("ps-1", vec![]);
        let intent = intent();
        let tx = StageTransaction {
            stage_id: "confirm_payment",
            intent: &intent,
            prior: vec![],
        };
        let err = worker.process(&tx).await.unwrap_err();
        assert_eq!(err.kind(), "prerequisite_failed");
    }
}
