//! Adapter Contracts (C9): abstract interfaces that external mobile-money
//! and settlement-chain plug-ins satisfy. The core never implements a real
//! wire integration — it defines the contract and ships in-memory
//! reference adapters satisfying the idempotency guarantees, for tests and
//! local development.

pub mod mmo;
pub mod settlement;

pub use mmo::{InMemoryMmoAdapter, MmoAdapter, MmoLimits, MmoTransaction, MmoTransactionStatus};
pub use settlement::{
    InMemorySettlementAdapter, SettlementAdapter, SettlementReceipt, SettlementRequest, SettlementStatus,
};
