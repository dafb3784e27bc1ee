//! Transaction data structures and ingestion validation

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound on a single transaction amount accepted by the pipeline.
pub const MAX_AMOUNT: f64 = 1_000_000.0;

/// Payment method used for the order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    BankTransfer,
    Paypal,
    Crypto,
}

/// An incoming order to be scored for fraud risk.
///
/// Created at ingestion, immutable thereafter. Read-only input to the
/// scoring core; `validate` must pass before the transaction enters it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique order identifier
    pub order_id: String,

    /// User identifier
    pub user_id: String,

    /// Order amount in dollars
    #[serde(alias = "total_amount")]
    pub amount: f64,

    /// Payment method used
    pub payment_method: PaymentMethod,

    /// Age of the user account in days
    pub account_age_days: u32,

    /// Total number of orders by this user
    pub total_orders: u32,

    /// Average order value for this user
    #[serde(default)]
    pub avg_order_value: f64,

    /// IP address of the user, if known
    #[serde(default)]
    pub ip_address: Option<String>,

    /// Ingestion timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    /// Create a transaction with the required fields (test and tooling helper)
    pub fn new(order_id: &str, user_id: &str, amount: f64, payment_method: PaymentMethod) -> Self {
        Self {
            order_id: order_id.to_string(),
            user_id: user_id.to_string(),
            amount,
            payment_method,
            account_age_days: 365,
            total_orders: 10,
            avg_order_value: amount,
            ip_address: None,
            timestamp: Utc::now(),
        }
    }

    /// Validate the transaction before it enters the scoring core.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.order_id.trim().is_empty() {
            return Err(ValidationError::EmptyOrderId);
        }
        if self.user_id.trim().is_empty() {
            return Err(ValidationError::EmptyUserId);
        }
        if self.amount <= 0.0 {
            return Err(ValidationError::NonPositiveAmount(self.amount));
        }
        if self.amount >= MAX_AMOUNT {
            return Err(ValidationError::AmountTooLarge(self.amount));
        }
        if self.avg_order_value < 0.0 {
            return Err(ValidationError::NegativeAvgOrderValue(self.avg_order_value));
        }
        Ok(())
    }
}
