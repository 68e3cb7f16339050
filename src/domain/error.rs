//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use super::AmountError;

/// Business rule violations and domain invariant failures.
///
/// Every variant is recoverable and returned to the caller as-is; the calling
/// layer renders a message from `code()` plus the `Display` text.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Balance does not cover a debit
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    /// Transaction already left the pending state
    #[error("Transaction {transaction_id} is already {status}")]
    AlreadyFinalized { transaction_id: Uuid, status: String },

    /// An active order of the same client has an overlapping title
    #[error("Duplicate order: active order {order_number} has a similar title")]
    DuplicateOrder { order_number: String },

    /// An active ban denies the capability
    #[error("Restricted: active {ban_type} until {expires_at}")]
    Restricted {
        ban_type: String,
        expires_at: DateTime<Utc>,
    },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Promo code {0} is inactive")]
    Inactive(String),

    #[error("Promo code {code} expired at {expired_at}")]
    Expired {
        code: String,
        expired_at: DateTime<Utc>,
    },

    #[error("Promo code {code} reached its usage limit of {limit}")]
    UsageLimitReached { code: String, limit: i32 },

    #[error("Order amount {actual} is below the minimum of {required}")]
    MinAmountNotMet { required: Decimal, actual: Decimal },

    #[error("Invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    /// Invalid amount (zero, negative, or exceeds limit)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// The acting account may not perform the operation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The promo code targets a different audience
    #[error("Promo code {code} is only available to {audience}")]
    NotEligible { code: String, audience: String },

    /// An active promo code already uses this text
    #[error("Promo code {0} is already in use")]
    CodeTaken(String),

    /// Malformed input that is not an amount
    #[error("Validation failed: {0}")]
    Validation(String),
}

impl DomainError {
    pub fn insufficient_funds(required: Decimal, available: Decimal) -> Self {
        Self::InsufficientFunds {
            required,
            available,
        }
    }

    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn invalid_transition(
        from: impl ToString,
        to: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
            reason: reason.into(),
        }
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized(reason.into())
    }

    /// Stable machine-readable kind for the calling layer
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::AlreadyFinalized { .. } => "already_finalized",
            Self::DuplicateOrder { .. } => "duplicate_order",
            Self::Restricted { .. } => "restricted",
            Self::NotFound { .. } => "not_found",
            Self::Inactive(_) => "inactive",
            Self::Expired { .. } => "expired",
            Self::UsageLimitReached { .. } => "usage_limit_reached",
            Self::MinAmountNotMet { .. } => "min_amount_not_met",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::Unauthorized(_) => "unauthorized",
            Self::NotEligible { .. } => "not_eligible",
            Self::CodeTaken(_) => "code_taken",
            Self::Validation(_) => "validation_failed",
        }
    }

    /// Check if this error belongs to the promo redemption family
    pub fn is_promo_rejection(&self) -> bool {
        matches!(
            self,
            Self::Inactive(_)
                | Self::Expired { .. }
                | Self::UsageLimitReached { .. }
                | Self::MinAmountNotMet { .. }
                | Self::NotEligible { .. }
        )
    }
}

impl From<AmountError> for DomainError {
    fn from(err: AmountError) -> Self {
        Self::InvalidAmount(err.to_string())
    }
}
