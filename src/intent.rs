//! Payment intent: the immutable input to a workflow run.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Payment type tag, carried through to stage executors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentType {
    PersonalRemittance,
    MerchantPayment,
    Payroll,
    BillPayment,
}

/// Payment method hint, used by route discovery and the MMO stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    MobileMoney,
    BankTransfer,
    CashPickup,
}

/// A sender or recipient descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyDescriptor {
    pub name: String,
    pub phone: String,
    pub country: String,
}

/// Optional routing/delivery preferences. Consulted by the Workflow Factory
/// and the Route Optimizer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Preferences {
    pub priority_cost: bool,
    pub priority_speed: bool,
    pub max_delivery_minutes: Option<u32>,
    pub max_fee: Option<Decimal>,
}

/// The user-submitted payment request before any processing. Immutable for
/// the lifetime of a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub reference_id: String,
    pub amount: Decimal,
    pub source_currency: String,
    pub destination_currency: String,
    pub payment_type: PaymentType,
    pub payment_method: PaymentMethod,
    pub sender: PartyDescriptor,
    pub recipient: PartyDescriptor,
    pub preferences: Option<Preferences>,
}

impl PaymentIntent {
    /// Structural validation: non-empty reference id, positive amount,
    /// distinct currency pair. Stage executors rely on this having already
    /// been checked before `create_payment` runs.
    pub fn validate(&self) -> Result<(), String> {
        if self.reference_id.trim().is_empty() {
            return Err("reference_id must not be empty".into());
        }
        if self.amount <= Decimal::ZERO {
            return Err("amount must be positive".into());
        }
        if self.source_currency == self.destination_currency {
            return Err("source and destination currency must differ".into());
        }
        if self.source_currency.len() != 3 || self.destination_currency.len() != 3 {
            return Err("currencies must be ISO 4217 codes".into());
        }
        Ok(())
    }

    pub fn corridor(&self) -> (String, String) {
        (self.sender.country.clone(), self.recipient.country.clone())
    }
}
