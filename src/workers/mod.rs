//! Concrete workers satisfying the capabilities the canonical stage
//! pipeline consumes. The Compliance Worker (C4) lives at the crate root
//! (`crate::compliance`) since its result type is shared by `StagePayload`;
//! everything else lives here.

pub mod exchange_rate;
pub mod liquidity;
pub mod mmo_worker;
pub mod payment_service;
pub mod route_optimizer;
pub mod settlement_worker;

pub use exchange_rate::{ExchangeRateProvider, ExchangeRateWorker, StaticRateTable};
pub use liquidity::{InMemoryLiquidityPool, LiquidityProvider, LiquidityWorker};
pub use mmo_worker::MmoWorker;
pub use payment_service::PaymentServiceWorker;
pub use route_optimizer::{RouteOptimizerWorker, RouteProvider, StaticRouteProvider};
pub use settlement_worker::SettlementWorker;
