//! Exchange Rate Worker (capability `exchange_rate`): locks a rate for a
//! currency pair with a short expiry window.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::context::StagePayload;
use crate::error::{CoreError, CoreResult};
use crate::worker::{StageTransaction, Worker};

/// Rate source the worker consults. A real embedder backs this with a
/// treasury/market-data feed; the core ships a static table for tests.
#[async_trait]
pub trait ExchangeRateProvider: Send + Sync {
    async fn rate(&self, from: &str, to: &str) -> CoreResult<Decimal>;
}

pub struct StaticRateTable {
    rates: DashMap<(String, String), Decimal>,
}

impl Default for StaticRateTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticRateTable {
    pub fn new() -> Self {
        Self { rates: DashMap::new() }
    }

    pub fn set(&self, from: &str, to: &str, rate: Decimal) {
        self.rates.insert((from.to_string(), to.to_string()), rate);
    }
}

#[async_trait]
impl ExchangeRateProvider for StaticRateTable {
    async fn rate(&self, from: &str, to: &str) -> CoreResult<Decimal> {
        self.rates
            .get(&(from.to_string(), to.to_string()))
            .map(|r| *r)
            .ok_or_else(|| CoreError::AdapterTransient(format!("no rate available for {from}->{to}")))
    }
}

pub struct ExchangeRateWorker {
    id: String,
    provider: Arc<dyn ExchangeRateProvider>,
    lock_ttl: Duration,
}

impl ExchangeRateWorker {
    pub fn new(id: impl Into<String>, provider: Arc<dyn ExchangeRateProvider>, lock_ttl: Duration) -> Self {
        Self {
            id: id.into(),
            provider,
            lock_ttl,
        }
    }
}

#[async_trait]
impl Worker for ExchangeRateWorker {
    fn id(&self) -> &str {
        &self.id
    }

    fn capability(&self) -> &str {
        "exchange_rate"
    }

    async fn process(&self, tx: &StageTransaction<'_>) -> CoreResult<StagePayload> {
        let rate = self
            .provider
            .rate(&tx.intent.source_currency, &tx.intent.destination_currency)
            .await?;
        let expiry = Utc::now() + chrono::Duration::from_std(self.lock_ttl).unwrap_or(chrono::Duration::seconds(60));
        Ok(StagePayload::ExchangeRateLock { rate, expiry })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{PartyDescriptor, PaymentIntent, PaymentMethod, PaymentType};

    fn intent() -> PaymentIntent {
        PaymentIntent {
            reference_id: "r1".into(),
            amount: Decimal::new(100_00, 2),
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
    async fn locks_rate_from_table() {
        let table = Arc::new(StaticRateTable::new());
        table.set("USD", "KES", Decimal::new(13_000, 2));
        let worker = ExchangeRateWorker::new("fx-1", table, Duration::from_secs(60));
        let intent = intent();
        let tx = StageTransaction {
            stage_id: "lock_exchange_rate",
            intent: &intent,
            prior: vec![],
        };
        match worker.process(&tx).await.unwrap() {
            StagePayload::ExchangeRateLock { rate, .. } => assert_eq!(rate, Decimal::new(13_000, 2)),
            _ => panic!("wrong payload variant"),
        }
    }

    #[tokio::test]
    async fn missing_rate_is_transient() {
        let worker = ExchangeRateWorker::new("fx-1", Arc::new(StaticRateTable::new()), Duration::from_secs(60));
        let intent = intent();
        let tx = StageTransaction {
            stage_id: "lock_exchange_rate",
            intent: &intent,
            prior: vec![],
        };
        let err = worker.process(&tx).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
