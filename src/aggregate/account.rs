//! Account Aggregate
//!
//! Holds the GT Coin balance. The balance is a maintained running total;
//! it only changes through `credit`/`debit`, which the stores call inside
//! the same atomic unit that completes the triggering transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Amount, Balance, DomainError, LedgerDirection, Role};

use super::{Aggregate, Transaction};

/// Account Aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    id: Uuid,

    display_name: String,

    /// Current balance (never negative once committed)
    balance: Balance,

    role: Role,

    /// Average review score, informational only
    rating: Decimal,

    created_at: DateTime<Utc>,

    updated_at: DateTime<Utc>,
}

impl Account {
    /// Register a new account with an empty balance
    pub fn register(display_name: impl Into<String>, role: Role, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
            balance: Balance::zero(),
            role,
            rating: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild an account from persisted state
    pub fn from_db_state(
        id: Uuid,
        display_name: String,
        balance: Decimal,
        role: Role,
        rating: Decimal,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            id,
            display_name,
            balance: Balance::new(balance)?,
            role,
            rating,
            created_at,
            updated_at,
        })
    }

    // =========================================================================
    // Ledger operations
    // =========================================================================

    /// Credit the account, returning the new balance
    pub fn credit(
        &mut self,
        amount: &Amount,
        tx_ref: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Balance, DomainError> {
        let new_balance = self.balance.credit(amount)?;

        tracing::debug!(
            account_id = %self.id,
            transaction_id = %tx_ref,
            amount = %amount,
            new_balance = %new_balance,
            "Ledger credit"
        );

        self.balance = new_balance;
        self.updated_at = now;
        Ok(new_balance)
    }

    /// Debit the account, returning the new balance.
    /// Fails with `InsufficientFunds` and leaves the balance untouched if the
    /// balance does not cover the amount.
    pub fn debit(
        &mut self,
        amount: &Amount,
        tx_ref: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Balance, DomainError> {
        if !self.balance.is_sufficient_for(amount) {
            return Err(DomainError::insufficient_funds(
                amount.value(),
                self.balance.value(),
            ));
        }

        let new_balance = self.balance.debit(amount)?;

        tracing::debug!(
            account_id = %self.id,
            transaction_id = %tx_ref,
            amount = %amount,
            new_balance = %new_balance,
            "Ledger debit"
        );

        self.balance = new_balance;
        self.updated_at = now;
        Ok(new_balance)
    }

    /// Apply a transaction's ledger effect in its direction
    pub fn apply(&mut self, tx: &Transaction, now: DateTime<Utc>) -> Result<Balance, DomainError> {
        if tx.account_id != self.id {
            return Err(DomainError::Validation(format!(
                "transaction {} belongs to account {}, not {}",
                tx.id, tx.account_id, self.id
            )));
        }

        match tx.direction() {
            LedgerDirection::Credit => self.credit(&tx.amount, tx.id, now),
            LedgerDirection::Debit => self.debit(&tx.amount, tx.id, now),
        }
    }

    pub fn set_role(&mut self, role: Role, now: DateTime<Utc>) {
        self.role = role;
        self.updated_at = now;
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn balance(&self) -> Balance {
        self.balance
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn rating(&self) -> Decimal {
        self.rating
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl Aggregate for Account {
    fn aggregate_type() -> &'static str {
        "account"
    }

    fn id(&self) -> Uuid {
        self.id
    }
}
