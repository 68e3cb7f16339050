//! Transaction Aggregate
//!
//! A money-movement record. `pending → {completed, rejected}`; both outcomes
//! are terminal and only the move into `completed` touches a balance.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{Amount, DomainError, LedgerDirection};

use super::Aggregate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Coins arriving from outside (gateway top-up, promo bonus)
    Deposit,
    /// Coins leaving the platform
    Withdrawal,
    /// Coins spent inside the platform (priority fees)
    Payment,
    /// Coins bought with real currency
    Purchase,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Payment => "payment",
            TransactionType::Purchase => "purchase",
        }
    }

    pub fn direction(&self) -> LedgerDirection {
        match self {
            TransactionType::Deposit | TransactionType::Purchase => LedgerDirection::Credit,
            TransactionType::Withdrawal | TransactionType::Payment => LedgerDirection::Debit,
        }
    }

    /// Types gated by `payment_mute`
    pub fn is_deposit_class(&self) -> bool {
        self.direction() == LedgerDirection::Credit
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionType::Deposit),
            "withdrawal" => Ok(TransactionType::Withdrawal),
            "payment" => Ok(TransactionType::Payment),
            "purchase" => Ok(TransactionType::Purchase),
            other => Err(DomainError::Validation(format!(
                "unknown transaction type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Rejected,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Rejected => "rejected",
        }
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "rejected" => Ok(TransactionStatus::Rejected),
            other => Err(DomainError::Validation(format!(
                "unknown transaction status '{other}'"
            ))),
        }
    }
}

/// Transaction record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: Amount,
    pub status: TransactionStatus,
    /// Opaque caller payload (gateway reference, order number, promo code)
    pub metadata: serde_json::Value,
    pub admin_notes: Option<String>,
    pub processed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Open a pending transaction
    pub fn open(
        account_id: Uuid,
        transaction_type: TransactionType,
        amount: Amount,
        metadata: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            transaction_type,
            amount,
            status: TransactionStatus::Pending,
            metadata,
            admin_notes: None,
            processed_by: None,
            created_at: now,
            completed_at: None,
        }
    }

    /// Build a transaction that is born completed (manual adjustments,
    /// priority fees, promo bonuses). The caller must persist it in the same
    /// atomic unit as the balance mutation.
    pub fn settled(
        account_id: Uuid,
        transaction_type: TransactionType,
        amount: Amount,
        metadata: serde_json::Value,
        processed_by: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        let mut tx = Self::open(account_id, transaction_type, amount, metadata, now);
        tx.status = TransactionStatus::Completed;
        tx.processed_by = Some(processed_by);
        tx.completed_at = Some(now);
        tx
    }

    pub fn with_admin_notes(mut self, notes: impl Into<String>) -> Self {
        self.admin_notes = Some(notes.into());
        self
    }

    pub fn direction(&self) -> LedgerDirection {
        self.transaction_type.direction()
    }

    /// Contribution to the balance: +amount for completed credits,
    /// -amount for completed debits, zero otherwise
    pub fn signed_amount(&self) -> Decimal {
        if self.status != TransactionStatus::Completed {
            return Decimal::ZERO;
        }
        match self.direction() {
            LedgerDirection::Credit => self.amount.value(),
            LedgerDirection::Debit => -self.amount.value(),
        }
    }

    pub fn ensure_pending(&self) -> Result<(), DomainError> {
        if self.status.is_final() {
            return Err(DomainError::AlreadyFinalized {
                transaction_id: self.id,
                status: self.status.to_string(),
            });
        }
        Ok(())
    }

    /// Flip to completed. The ledger effect must be applied in the same unit.
    pub fn mark_completed(
        &mut self,
        processed_by: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_pending()?;
        self.status = TransactionStatus::Completed;
        self.processed_by = Some(processed_by);
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn mark_rejected(
        &mut self,
        reason: impl Into<String>,
        processed_by: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_pending()?;
        self.status = TransactionStatus::Rejected;
        self.admin_notes = Some(reason.into());
        self.processed_by = Some(processed_by);
        self.completed_at = Some(now);
        Ok(())
    }
}

impl Aggregate for Transaction {
    fn aggregate_type() -> &'static str {
        "transaction"
    }

    fn id(&self) -> Uuid {
        self.id
    }
}
