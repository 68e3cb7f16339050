//! Domain Events
//!
//! Notifications published after a ledger mutation commits. They are facts
//! for external collaborators (notification rendering, realtime feeds); the
//! core never consumes them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a balance change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerDirection {
    Credit,
    Debit,
}

/// Ledger notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LedgerEvent {
    /// A completed transaction changed an account balance
    BalanceChanged {
        account_id: Uuid,
        transaction_id: Uuid,
        direction: LedgerDirection,
        amount: Decimal,
        new_balance: Decimal,
        occurred_at: DateTime<Utc>,
    },

    /// A pending transaction was rejected without balance effect
    TransactionRejected {
        account_id: Uuid,
        transaction_id: Uuid,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
}

impl LedgerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::BalanceChanged { .. } => "BalanceChanged",
            LedgerEvent::TransactionRejected { .. } => "TransactionRejected",
        }
    }

    pub fn account_id(&self) -> Uuid {
        match self {
            LedgerEvent::BalanceChanged { account_id, .. } => *account_id,
            LedgerEvent::TransactionRejected { account_id, .. } => *account_id,
        }
    }
}
