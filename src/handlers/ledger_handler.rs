//! Ledger Handler
//!
//! Accounts and their balances. The balance is a running total maintained by
//! the store; `verify_balance` recomputes it from history for operators.

use std::sync::Arc;
use uuid::Uuid;

use crate::aggregate::{Account, Aggregate, Transaction, TransactionStatus};
use crate::audit::{AuditAction, AuditLog, AuditLogBuilder};
use crate::domain::{Balance, Clock, DomainError, OperationContext, Role};
use crate::error::AppResult;
use crate::store::Store;

use super::{BalanceReconciliation, RegisterAccountCommand};

/// Handler for accounts
#[derive(Clone)]
pub struct LedgerHandler {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    audit: AuditLog,
}

impl LedgerHandler {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, audit: AuditLog) -> Self {
        Self { store, clock, audit }
    }

    /// Register a new account with a zero balance. Staff roles can only be
    /// handed out by an admin.
    pub async fn register_account(
        &self,
        command: RegisterAccountCommand,
        context: &OperationContext,
    ) -> AppResult<Account> {
        if command.role.is_staff() {
            context.require_admin("registering a staff account")?;
        }
        let display_name = command.display_name.trim();
        if display_name.is_empty() {
            return Err(DomainError::Validation("display name is empty".to_string()).into());
        }

        let now = self.clock.now();
        let account = Account::register(display_name, command.role, now);
        self.store.insert_account(&account).await?;

        tracing::info!(
            account_id = %account.id(),
            role = %account.role(),
            "Account registered"
        );

        self.audit
            .append(
                AuditLogBuilder::new(AuditAction::AccountRegistered)
                    .target(Account::aggregate_type(), account.id())
                    .detail("role", account.role())
                    .detail("display_name", account.display_name()),
                context,
                now,
            )
            .await;

        Ok(account)
    }

    pub async fn account(&self, account_id: Uuid) -> AppResult<Account> {
        self.store
            .account(account_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Account", account_id).into())
    }

    pub async fn balance(&self, account_id: Uuid) -> AppResult<Balance> {
        Ok(self.account(account_id).await?.balance())
    }

    /// Transaction history, oldest first
    pub async fn transactions(&self, account_id: Uuid) -> AppResult<Vec<Transaction>> {
        self.account(account_id).await?;
        Ok(self.store.account_transactions(account_id).await?)
    }

    /// Recompute Σcredits − Σdebits over completed transactions and compare
    /// it with the running total
    pub async fn verify_balance(&self, account_id: Uuid) -> AppResult<BalanceReconciliation> {
        let account = self.account(account_id).await?;
        let history = self.store.account_transactions(account_id).await?;

        let computed_balance = history.iter().map(Transaction::signed_amount).sum();
        let reconciliation = BalanceReconciliation {
            account_id,
            recorded_balance: account.balance().value(),
            computed_balance,
            transactions_counted: history
                .iter()
                .filter(|tx| tx.status == TransactionStatus::Completed)
                .count(),
        };

        if !reconciliation.is_consistent() {
            tracing::error!(
                %account_id,
                recorded = %reconciliation.recorded_balance,
                computed = %reconciliation.computed_balance,
                "Balance does not match transaction history"
            );
        }

        Ok(reconciliation)
    }

    /// Change an account's role, admin only
    pub async fn set_role(
        &self,
        account_id: Uuid,
        role: Role,
        context: &OperationContext,
    ) -> AppResult<Account> {
        context.require_admin("changing an account role")?;
        let before = self.account(account_id).await?;

        let now = self.clock.now();
        let account = self.store.set_role(account_id, role, now).await?;

        tracing::info!(
            %account_id,
            from = %before.role(),
            to = %account.role(),
            changed_by = %context.actor_id,
            "Account role changed"
        );

        self.audit
            .append(
                AuditLogBuilder::new(AuditAction::RoleChanged)
                    .target(Account::aggregate_type(), account_id)
                    .before_state(&before.role())
                    .after_state(&account.role()),
                context,
                now,
            )
            .await;

        Ok(account)
    }
}
