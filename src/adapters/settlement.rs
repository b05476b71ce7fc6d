//! Settlement-chain adapter contract (capability `settlement`).
//!
//! `settle` and `batch_settle` must be exactly-once per `settlement_id`: a
//! retried call with the same id returns the previously recorded receipt
//! rather than settling twice.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::error::CoreResult;

#[derive(Debug, Clone)]
pub struct SettlementRequest {
    pub settlement_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub destination_address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementStatus {
    Pending,
    Submitted,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct SettlementReceipt {
    pub settlement_id: String,
    pub chain_tx_hash: String,
    pub status: SettlementStatus,
}

#[async_trait]
pub trait SettlementAdapter: Send + Sync {
    async fn settle(&self, req: &SettlementRequest) -> CoreResult<SettlementReceipt>;
    async fn batch_settle(&self, reqs: &[SettlementRequest]) -> CoreResult<Vec<SettlementReceipt>>;
    async fn status(&self, settlement_id: &str) -> CoreResult<Option<SettlementStatus>>;
    async fn balance(&self, address: &str) -> CoreResult<Option<Decimal>>;
}

/// In-memory reference settlement adapter for tests and local development.
pub struct InMemorySettlementAdapter {
    receipts: DashMap<String, SettlementReceipt>,
    balances: DashMap<String, Decimal>,
}

impl Default for InMemorySettlementAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySettlementAdapter {
    pub fn new() -> Self {
        Self {
            receipts: DashMap::new(),
            balances: DashMap::new(),
        }
    }

    pub fn seed_balance(&self, address: &str, amount: Decimal) {
        self.balances.insert(address.to_string(), amount);
    }

    fn hash_settlement_id(settlement_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(settlement_id.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl SettlementAdapter for InMemorySettlementAdapter {
    async fn settle(&self, req: &SettlementRequest) -> CoreResult<SettlementReceipt> {
        if let Some(existing) = self.receipts.get(&req.settlement_id) {
            return Ok(existing.clone());
        }
        let receipt = SettlementReceipt {
            settlement_id: req.settlement_id.clone(),
            chain_tx_hash: format!("0x{}", Self::hash_settlement_id(&req.settlement_id)),
            status: SettlementStatus::Confirmed,
        };
        self.receipts.insert(req.settlement_id.clone(), receipt.clone());
        Ok(receipt)
    }

    async fn batch_settle(&self, reqs: &[SettlementRequest]) -> CoreResult<Vec<SettlementReceipt>> {
        let mut receipts = Vec::with_capacity(reqs.len());
        for req in reqs {
            receipts.push(self.settle(req).await?);
        }
        Ok(receipts)
    }

    async fn status(&self, settlement_id: &str) -> CoreResult<Option<SettlementStatus>> {
        Ok(self.receipts.get(settlement_id).map(|r| r.status))
    }

    async fn balance(&self, address: &str) -> CoreResult<Option<Decimal>> {
        Ok(self.balances.get(address).map(|b| *b))
    }
}

pub fn default_settlement_adapter() -> Arc<dyn SettlementAdapter> {
    Arc::new(InMemorySettlementAdapter::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(id: &str) -> SettlementRequest {
        SettlementRequest {
            settlement_id: id.to_string(),
            amount: Decimal::new(100_00, 2),
            currency: "USD".to_string(),
            destination_address: "addr-1".to_string(),
        }
    }

    #[tokio::test]
    async fn settle_is_exactly_once_per_settlement_id() {
        let adapter = InMemorySettlementAdapter::new();
        let first = adapter.settle(&req("s1")).await.unwrap();
        let second = adapter.settle(&req("s1")).await.unwrap();
        assert_eq!(first.chain_tx_hash, second.chain_tx_hash);
    }

    #[tokio::test]
    async fn batch_settle_applies_same_idempotency() {
        let adapter = InMemorySettlementAdapter::new();
        let reqs = vec![req("s1"), req("s1"), req("s2")];
        let receipts = adapter.batch_settle(&reqs).await.unwrap();
        assert_eq!(receipts[0].chain_tx_hash, receipts[1].chain_tx_hash);
        assert_ne!(receipts[0].chain_tx_hash, receipts[2].chain_tx_hash);
    }
}
