//! Mobile-money operator adapter contract (capability `mmo_service`).
//!
//! The in-memory reference adapter is bounded by a provider rate limit via
//! `governor`, consistent with §5's "every external call is a suspension
//! point" model, and is idempotent keyed by transaction reference.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use governor::{Quota, RateLimiter};
use rust_decimal::Decimal;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct MmoTransaction {
    pub reference: String,
    pub subject_phone: String,
    pub country: String,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmoTransactionStatus {
    Pending,
    Submitted,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct MmoTransactionRecord {
    pub reference: String,
    pub provider_tx_id: String,
    pub status: MmoTransactionStatus,
}

#[derive(Debug, Clone, Copy)]
pub struct MmoLimits {
    pub max_per_transaction: Decimal,
    pub max_daily: Decimal,
}

/// Contract an MMO plug-in must satisfy. `initiate` must be idempotent
/// keyed by `tx.reference`: a second call with the same reference returns
/// the same record rather than submitting a second transaction.
#[async_trait]
pub trait MmoAdapter: Send + Sync {
    async fn initiate(&self, tx: &MmoTransaction) -> CoreResult<MmoTransactionRecord>;
    async fn status(&self, reference: &str) -> CoreResult<Option<MmoTransactionRecord>>;
    async fn balance(&self, subject_phone: &str) -> CoreResult<Option<Decimal>>;
    fn supported_countries(&self) -> &[String];
    fn limits(&self) -> MmoLimits;
}

type DirectLimiter = RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

/// In-memory reference MMO adapter for tests and local development.
/// Monotonic status transitions: pending -> submitted -> confirmed|failed.
pub struct InMemoryMmoAdapter {
    supported_countries: Vec<String>,
    limits: MmoLimits,
    limiter: DirectLimiter,
    records: DashMap<String, MmoTransactionRecord>,
    balances: parking_lot::Mutex<HashMap<String, Decimal>>,
}

impl InMemoryMmoAdapter {
    pub fn new(supported_countries: Vec<String>, limits: MmoLimits, per_minute: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(per_minute.max(1)).unwrap());
        Self {
            supported_countries,
            limits,
            limiter: RateLimiter::direct(quota),
            records: DashMap::new(),
            balances: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    pub fn seed_balance(&self, subject_phone: &str, amount: Decimal) {
        self.balances.lock().insert(subject_phone.to_string(), amount);
    }
}

#[async_trait]
impl MmoAdapter for InMemoryMmoAdapter {
    async fn initiate(&self, tx: &MmoTransaction) -> CoreResult<MmoTransactionRecord> {
        if let Some(existing) = self.records.get(&tx.reference) {
            return Ok(existing.clone());
        }

        if !self.supported_countries.iter().any(|c| c == &tx.country) {
            return Err(CoreError::AdapterPermanent(format!("unsupported country {}", tx.country)));
        }
        if tx.amount > self.limits.max_per_transaction {
            return Err(CoreError::AdapterPermanent("amount exceeds per-transaction limit".to_string()));
        }
        if self.limiter.check().is_err() {
            return Err(CoreError::AdapterTransient("mmo provider rate limit exceeded".to_string()));
        }

        let record = MmoTransactionRecord {
            reference: tx.reference.clone(),
            provider_tx_id: format!("mmo-{}", tx.reference),
            status: MmoTransactionStatus::Confirmed,
        };
        self.records.insert(tx.reference.clone(), record.clone());
        Ok(record)
    }

    async fn status(&self, reference: &str) -> CoreResult<Option<MmoTransactionRecord>> {
        Ok(self.records.get(reference).map(|r| r.clone()))
    }

    async fn balance(&self, subject_phone: &str) -> CoreResult<Option<Decimal>> {
        Ok(self.balances.lock().get(subject_phone).copied())
    }

    fn supported_countries(&self) -> &[String] {
        &self.supported_countries
    }

    fn limits(&self) -> MmoLimits {
        self.limits
    }
}

pub fn default_mmo_adapter() -> Arc<dyn MmoAdapter> {
    Arc::new(InMemoryMmoAdapter::new(
        vec!["KE".to_string(), "NG".to_string(), "UG".to_string()],
        MmoLimits {
            max_per_transaction: Decimal::new(5_000_00, 2),
            max_daily: Decimal::new(20_000_00, 2),
        },
        600,
    ))
}
