//! Adapts a `SettlementAdapter` (C9) into a `Worker` satisfying capability
//! `settlement`, consumed by the `settle_payment` stage.

use std::sync::Arc;

use async_trait::async_trait;

use crate::adapters::settlement::{SettlementAdapter, SettlementRequest};
use crate::context::StagePayload;
use crate::error::{CoreError, CoreResult};
use crate::worker::{StageTransaction, Worker};

pub struct SettlementWorker {
    id: String,
    adapter: Arc<dyn SettlementAdapter>,
}

impl SettlementWorker {
    pub fn new(id: impl Into<String>, adapter: Arc<dyn SettlementAdapter>) -> Self {
        Self { id: id.into(), adapter }
    }
}

#[async_trait]
impl Worker for SettlementWorker {
    fn id(&self) -> &str {
        &self.id
    }

    fn capability(&self) -> &str {
        "settlement"
    }

    async fn process(&self, tx: &StageTransaction<'_>) -> CoreResult<StagePayload> {
        let provider_tx_id = tx
            .find_prior(|p| p.as_mmo_execution().map(|s| s.to_string()))
            .ok_or_else(|| CoreError::PrerequisiteFailed("execute_mmo".to_string()))?;

        let req = SettlementRequest {
            settlement_id: format!("{}-{}", tx.intent.reference_id, provider_tx_id),
            amount: tx.intent.amount,
            currency: tx.intent.destination_currency.clone(),
            destination_address: tx.intent.recipient.phone.clone(),
        };
        let receipt = self.adapter.settle(&req).await?;
        Ok(StagePayload::Settlement {
            chain_tx_hash: receipt.chain_tx_hash,
        })
    }
}
