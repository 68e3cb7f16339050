//! Transaction Handler
//!
//! Pending transactions and their settlement. A balance moves only when a
//! transaction flips to `completed`, inside the store's atomic unit.

use std::sync::Arc;
use uuid::Uuid;

use crate::aggregate::{Aggregate, BanType, Transaction};
use crate::audit::{AuditAction, AuditLog, AuditLogBuilder};
use crate::domain::{Clock, DomainError, LedgerEvent, OperationContext};
use crate::error::AppResult;
use crate::store::Store;

use super::{
    parse_amount, LedgerNotifier, ManualAdjustmentCommand, OpenTransactionCommand,
    RestrictionHandler, SettlementResult,
};

/// Handler for transactions
#[derive(Clone)]
pub struct TransactionHandler {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    audit: AuditLog,
    notifier: LedgerNotifier,
    restrictions: RestrictionHandler,
}

impl TransactionHandler {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        audit: AuditLog,
        notifier: LedgerNotifier,
        restrictions: RestrictionHandler,
    ) -> Self {
        Self {
            store,
            clock,
            audit,
            notifier,
            restrictions,
        }
    }

    /// Open a pending transaction for the actor's own account (staff may open
    /// one for anybody). Deposit-class types are gated by `payment_mute`.
    pub async fn open(
        &self,
        command: OpenTransactionCommand,
        context: &OperationContext,
    ) -> AppResult<Transaction> {
        let amount = parse_amount(&command.amount)?;

        if command.account_id != context.actor_id && !context.is_staff() {
            return Err(DomainError::unauthorized(
                "transactions can only be opened for the actor's own account",
            )
            .into());
        }

        if self.store.account(command.account_id).await?.is_none() {
            return Err(DomainError::not_found("Account", command.account_id).into());
        }

        if command.transaction_type.is_deposit_class() {
            self.restrictions
                .ensure_unrestricted(command.account_id, BanType::PaymentMute)
                .await?;
        }

        let tx = Transaction::open(
            command.account_id,
            command.transaction_type,
            amount,
            command.metadata,
            self.clock.now(),
        );
        self.store.insert_transaction(&tx).await?;

        tracing::info!(
            transaction_id = %tx.id,
            account_id = %tx.account_id,
            transaction_type = %tx.transaction_type,
            amount = %tx.amount,
            "Transaction opened"
        );

        Ok(tx)
    }

    /// Admin adjustment, inserted already completed together with its
    /// balance effect
    pub async fn open_manual(
        &self,
        command: ManualAdjustmentCommand,
        context: &OperationContext,
    ) -> AppResult<SettlementResult> {
        context.require_admin("manual balance adjustment")?;
        let amount = parse_amount(&command.amount)?;
        if command.notes.trim().is_empty() {
            return Err(DomainError::Validation(
                "manual adjustments need a note".to_string(),
            )
            .into());
        }

        let now = self.clock.now();
        let tx = Transaction::settled(
            command.account_id,
            command.transaction_type,
            amount,
            serde_json::json!({ "manual": true }),
            context.actor_id,
            now,
        )
        .with_admin_notes(command.notes);

        let settlement = self.store.insert_settled(&tx, now).await?;

        tracing::info!(
            transaction_id = %tx.id,
            account_id = %tx.account_id,
            transaction_type = %tx.transaction_type,
            amount = %tx.amount,
            new_balance = %settlement.new_balance,
            admin_id = %context.actor_id,
            "Manual adjustment applied"
        );

        self.notifier.balance_changed(&settlement, now);
        self.audit
            .append(
                AuditLogBuilder::new(AuditAction::ManualAdjustment)
                    .target(Transaction::aggregate_type(), tx.id)
                    .detail("account_id", tx.account_id)
                    .detail("transaction_type", tx.transaction_type)
                    .detail("amount", tx.amount)
                    .detail("new_balance", settlement.new_balance)
                    .detail("notes", &tx.admin_notes),
                context,
                now,
            )
            .await;

        Ok(SettlementResult {
            transaction: settlement.transaction,
            new_balance: settlement.new_balance.value(),
        })
    }

    /// Settle a pending transaction (gateway confirmation or staff approval)
    pub async fn complete(
        &self,
        transaction_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<SettlementResult> {
        context.require_staff("completing a transaction")?;
        let now = self.clock.now();

        let settlement = match self
            .store
            .complete_transaction(transaction_id, context.actor_id, now)
            .await
        {
            Ok(settlement) => settlement,
            Err(e) => {
                tracing::warn!(
                    %transaction_id,
                    processed_by = %context.actor_id,
                    error = %e,
                    "Transaction completion refused"
                );
                return Err(e.into());
            }
        };
        let tx = &settlement.transaction;

        tracing::info!(
            transaction_id = %tx.id,
            account_id = %tx.account_id,
            direction = ?tx.direction(),
            amount = %tx.amount,
            new_balance = %settlement.new_balance,
            "Transaction completed"
        );

        self.notifier.balance_changed(&settlement, now);
        self.audit
            .append(
                AuditLogBuilder::new(AuditAction::TransactionCompleted)
                    .target(Transaction::aggregate_type(), tx.id)
                    .detail("account_id", tx.account_id)
                    .detail("transaction_type", tx.transaction_type)
                    .detail("amount", tx.amount)
                    .detail("new_balance", settlement.new_balance),
                context,
                now,
            )
            .await;

        Ok(SettlementResult {
            transaction: settlement.transaction,
            new_balance: settlement.new_balance.value(),
        })
    }

    /// Reject a pending transaction. No balance effect.
    pub async fn reject(
        &self,
        transaction_id: Uuid,
        reason: &str,
        context: &OperationContext,
    ) -> AppResult<Transaction> {
        context.require_staff("rejecting a transaction")?;
        let now = self.clock.now();

        let tx = self
            .store
            .reject_transaction(transaction_id, reason, context.actor_id, now)
            .await?;

        tracing::info!(
            transaction_id = %tx.id,
            account_id = %tx.account_id,
            reason,
            "Transaction rejected"
        );

        self.notifier.publish(LedgerEvent::TransactionRejected {
            account_id: tx.account_id,
            transaction_id: tx.id,
            reason: reason.to_string(),
            occurred_at: now,
        });
        self.audit
            .append(
                AuditLogBuilder::new(AuditAction::TransactionRejected)
                    .target(Transaction::aggregate_type(), tx.id)
                    .detail("account_id", tx.account_id)
                    .detail("amount", tx.amount)
                    .detail("reason", reason),
                context,
                now,
            )
            .await;

        Ok(tx)
    }

    pub async fn transaction(&self, transaction_id: Uuid) -> AppResult<Transaction> {
        self.store
            .transaction(transaction_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Transaction", transaction_id).into())
    }
}
