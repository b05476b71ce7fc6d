//! Adapts an `MmoAdapter` (C9) into a `Worker` satisfying capability
//! `mmo_service`, consumed by the `execute_mmo` stage.

use std::sync::Arc;

use async_trait::async_trait;

use crate::adapters::mmo::{MmoAdapter, MmoTransaction};
use crate::context::StagePayload;
use crate::error::{CoreError, CoreResult};
use crate::worker::{StageTransaction, Worker};

pub struct MmoWorker {
    id: String,
    adapter: Arc<dyn MmoAdapter>,
}

impl MmoWorker {
    pub fn new(id: impl Into<String>, adapter: Arc<dyn MmoAdapter>) -> Self {
        Self { id: id.into(), adapter }
    }
}

#[async_trait]
impl Worker for MmoWorker {
    fn id(&self) -> &str {
        &self.id
    }

    fn capability(&self) -> &str {
        "mmo_service"
    }

    async fn process(&self, tx: &StageTransaction<'_>) -> CoreResult<StagePayload> {
        let (rate, _expiry) = tx
            .find_prior(|p| p.as_exchange_rate_lock())
            .ok_or_else(|| CoreError::PrerequisiteFailed("lock_exchange_rate".to_string()))?;

        let mmo_tx = MmoTransaction {
            reference: tx.intent.reference_id.clone(),
            subject_phone: tx.intent.recipient.phone.clone(),
            country: tx.intent.recipient.country.clone(),
            amount: tx.intent.amount * rate,
            currency: tx.intent.destination_currency.clone(),
        };
        let record = self.adapter.initiate(&mmo_tx).await?;
        Ok(StagePayload::MmoExecution {
            provider_tx_id: record.provider_tx_id,
        })
    }
}
