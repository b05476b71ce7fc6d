//! Liquidity Worker (capability `liquidity`): checks whether enough
//! settlement-currency liquidity is available to cover a payment before it
//! is handed to the exchange-rate and MMO stages.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::context::StagePayload;
use crate::error::{CoreError, CoreResult};
use crate::intent::PaymentIntent;
use crate::worker::{StageTransaction, Worker};

/// Liquidity book the worker consults. The core ships an in-memory pool
/// keyed by currency for tests; a real embedder backs this with a treasury
/// system.
#[async_trait]
pub trait LiquidityProvider: Send + Sync {
    async fn available(&self, currency: &str, amount: Decimal) -> CoreResult<bool>;
}

pub struct InMemoryLiquidityPool {
    pools: DashMap<String, Decimal>,
}

impl Default for InMemoryLiquidityPool {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLiquidityPool {
    pub fn new() -> Self {
        Self { pools: DashMap::new() }
    }

    pub fn fund(&self, currency: &str, amount: Decimal) {
        *self.pools.entry(currency.to_string()).or_insert(Decimal::ZERO) += amount;
    }
}

#[async_trait]
impl LiquidityProvider for InMemoryLiquidityPool {
    async fn available(&self, currency: &str, amount: Decimal) -> CoreResult<bool> {
        Ok(self.pools.get(currency).map(|v| *v >= amount).unwrap_or(false))
    }
}

pub struct LiquidityWorker {
    id: String,
    pool: Arc<dyn LiquidityProvider>,
}

impl LiquidityWorker {
    pub fn new(id: impl Into<String>, pool: Arc<dyn LiquidityProvider>) -> Self {
        Self { id: id.into(), pool }
    }
}

#[async_trait]
impl Worker for LiquidityWorker {
    fn id(&self) -> &str {
        &self.id
    }

    fn capability(&self) -> &str {
        "liquidity"
    }

    async fn process(&self, tx: &StageTransaction<'_>) -> CoreResult<StagePayload> {
        let available = self
            .pool
            .available(&tx.intent.destination_currency, tx.intent.amount)
            .await?;
        if !available {
            return Err(CoreError::InsufficientLiquidity(format!(
                "insufficient {} liquidity",
                tx.intent.destination_currency
            )));
        }
        Ok(StagePayload::Liquidity {
            available: true,
            detail: "sufficient liquidity".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{PartyDescriptor, PaymentMethod, PaymentType};

    fn intent(amount: Decimal) -> PaymentIntent {
        PaymentIntent {
            reference_id: "r1".into(),
            amount,
            source_currency: "USD".into(),
            destination_currency: "KES".into(),
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
    async fn rejects_with_insufficient_liquidity_when_pool_empty() {
        let worker = LiquidityWorker::new("liq-1", Arc::new(InMemoryLiquidityPool::new()));
        let intent = intent(Decimal::new(100_00, 2));
        let tx = StageTransaction {
            stage_id: "check_liquidity",
            intent: &intent,
            prior: vec![],
        };
        let err = worker.process(&tx).await.unwrap_err();
        assert_eq!(err.kind(), "insufficient_liquidity");
    }

    #[tokio::test]
    async fn reports_available_when_funded() {
        let pool = Arc::new(InMemoryLiquidityPool::new());
        pool.fund("KES", Decimal::new(1_000_00, 2));
        let worker = LiquidityWorker::new("liq-1", pool);
        let intent = intent(Decimal::new(100_00, 2));
        let tx = StageTransaction {
            stage_id: "check_liquidity",
            intent: &intent,
            prior: vec![],
        };
        match worker.process(&tx).await.unwrap() {
            StagePayload::Liquidity { available, .. } => assert!(available),
            _ => panic!("wrong payload variant"),
        }
    }
}
