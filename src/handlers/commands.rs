//! Command definitions
//!
//! Commands represent intentions to change the system state. Amounts travel
//! as strings and are parsed into `Amount` by the handler.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{
    BanType, Benefit, DistributionMethod, Order, Priority, PromoType, TargetAudience, Transaction,
    TransactionType,
};
use crate::domain::Role;

// =========================================================================
// Ledger
// =========================================================================

/// Command to register a new account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAccountCommand {
    pub display_name: String,
    pub role: Role,
}

impl RegisterAccountCommand {
    pub fn new(display_name: impl Into<String>, role: Role) -> Self {
        Self {
            display_name: display_name.into(),
            role,
        }
    }
}

/// Command to open a pending transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTransactionCommand {
    pub account_id: Uuid,
    pub transaction_type: TransactionType,
    /// Amount (as string for precise decimal)
    pub amount: String,
    pub metadata: serde_json::Value,
}

impl OpenTransactionCommand {
    pub fn new(account_id: Uuid, transaction_type: TransactionType, amount: impl Into<String>) -> Self {
        Self {
            account_id,
            transaction_type,
            amount: amount.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Admin-issued balance adjustment, settled immediately
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualAdjustmentCommand {
    pub account_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: String,
    pub notes: String,
}

impl ManualAdjustmentCommand {
    pub fn new(
        account_id: Uuid,
        transaction_type: TransactionType,
        amount: impl Into<String>,
        notes: impl Into<String>,
    ) -> Self {
        Self {
            account_id,
            transaction_type,
            amount: amount.into(),
            notes: notes.into(),
        }
    }
}

/// A transaction that reached `completed`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementResult {
    pub transaction: Transaction,
    pub new_balance: Decimal,
}

/// Running total against the sum of completed transactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceReconciliation {
    pub account_id: Uuid,
    pub recorded_balance: Decimal,
    pub computed_balance: Decimal,
    pub transactions_counted: usize,
}

impl BalanceReconciliation {
    pub fn is_consistent(&self) -> bool {
        self.recorded_balance == self.computed_balance
    }
}

// =========================================================================
// Orders
// =========================================================================

/// Command to post a new order. The client is the acting account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderCommand {
    pub title: String,
    pub description: String,
    pub price: String,
    pub priority: Priority,
    pub people_needed: i32,
    pub deadline: Option<DateTime<Utc>>,
    pub requirements: serde_json::Value,
    pub max_revisions: Option<i32>,
}

impl CreateOrderCommand {
    pub fn new(title: impl Into<String>, price: impl Into<String>, priority: Priority) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            price: price.into(),
            priority,
            people_needed: 1,
            deadline: None,
            requirements: serde_json::Value::Null,
            max_revisions: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_people_needed(mut self, people_needed: i32) -> Self {
        self.people_needed = people_needed;
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_requirements(mut self, requirements: serde_json::Value) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn with_max_revisions(mut self, max_revisions: i32) -> Self {
        self.max_revisions = Some(max_revisions);
        self
    }
}

/// Result of a successful order creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderResult {
    pub order: Order,
    pub fee_transaction: Transaction,
    pub new_balance: Decimal,
}

// =========================================================================
// Promo codes
// =========================================================================

/// Command to create a promo code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePromoCodeCommand {
    /// Explicit code; generated when absent
    pub code: Option<String>,
    pub promo_type: PromoType,
    /// Bonus amount or discount value, by type
    pub value: String,
    pub min_order_amount: Option<String>,
    pub max_discount: Option<String>,
    pub usage_limit: Option<i32>,
    pub expires_at: DateTime<Utc>,
    pub target_audience: TargetAudience,
    pub distribution_method: DistributionMethod,
}

impl CreatePromoCodeCommand {
    pub fn new(promo_type: PromoType, value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            code: None,
            promo_type,
            value: value.into(),
            min_order_amount: None,
            max_discount: None,
            usage_limit: None,
            expires_at,
            target_audience: TargetAudience::All,
            distribution_method: DistributionMethod::Public,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_usage_limit(mut self, limit: i32) -> Self {
        self.usage_limit = Some(limit);
        self
    }

    pub fn with_min_order_amount(mut self, amount: impl Into<String>) -> Self {
        self.min_order_amount = Some(amount.into());
        self
    }

    pub fn with_max_discount(mut self, amount: impl Into<String>) -> Self {
        self.max_discount = Some(amount.into());
        self
    }

    pub fn for_audience(mut self, audience: TargetAudience) -> Self {
        self.target_audience = audience;
        self
    }

    pub fn distributed_via(mut self, method: DistributionMethod) -> Self {
        self.distribution_method = method;
        self
    }
}

/// Command to redeem a promo code for an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemPromoCodeCommand {
    pub code: String,
    pub account_id: Uuid,
    /// Required for discount codes
    pub order_amount: Option<String>,
}

impl RedeemPromoCodeCommand {
    pub fn new(code: impl Into<String>, account_id: Uuid) -> Self {
        Self {
            code: code.into(),
            account_id,
            order_amount: None,
        }
    }

    pub fn with_order_amount(mut self, amount: impl Into<String>) -> Self {
        self.order_amount = Some(amount.into());
        self
    }
}

/// Result of a successful redemption
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionResult {
    pub benefit: Benefit,
    /// Synthetic deposit for bonus codes
    pub bonus_transaction_id: Option<Uuid>,
    pub new_balance: Option<Decimal>,
}

// =========================================================================
// Restrictions
// =========================================================================

/// Command to ban an account from one capability for a while
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueBanCommand {
    pub account_id: Uuid,
    pub ban_type: BanType,
    pub duration_minutes: i64,
    pub reason: Option<String>,
}

impl IssueBanCommand {
    pub fn new(account_id: Uuid, ban_type: BanType, duration_minutes: i64) -> Self {
        Self {
            account_id,
            ban_type,
            duration_minutes,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
