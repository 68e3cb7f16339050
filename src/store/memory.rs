//! In-memory store
//!
//! All tables sit behind one `tokio::sync::RwLock`. Each compound operation
//! takes the write guard once, decides, and mutates before releasing it, so
//! no other operation can observe or interleave with a half-applied unit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::aggregate::promo_code::normalize_code;
use crate::aggregate::{
    Account, Ban, DuplicateGuard, Order, PromoCode, PromoType, Transaction, TransactionType,
};
use crate::audit::{AuditLogEntry, AuditRecord, GENESIS_HASH};
use crate::domain::{Amount, DomainError, OperationContext, Role};

use super::{
    AuditStore, BanStore, LedgerStore, OrderChange, OrderRule, OrderStore, PromoStore,
    Redemption, Settlement, StoreError, StoreResult,
};

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<Uuid, Account>,
    /// Insertion order doubles as history order
    transactions: Vec<Transaction>,
    orders: Vec<Order>,
    promos: Vec<PromoCode>,
    bans: Vec<Ban>,
    audit: Vec<AuditLogEntry>,
}

impl Tables {
    fn account_mut(&mut self, id: Uuid) -> Result<&mut Account, DomainError> {
        self.accounts
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Account", id))
    }

    fn transaction_index(&self, id: Uuid) -> Result<usize, DomainError> {
        self.transactions
            .iter()
            .position(|tx| tx.id == id)
            .ok_or_else(|| DomainError::not_found("Transaction", id))
    }

    /// Active row first, then newest
    fn promo_index(&self, code: &str) -> Option<usize> {
        let code = normalize_code(code);
        self.promos
            .iter()
            .enumerate()
            .filter(|(_, p)| p.code == code)
            .max_by_key(|(_, p)| (p.is_active, p.created_at))
            .map(|(i, _)| i)
    }

    fn active_code_taken(&self, code: &str, except: Uuid) -> bool {
        self.promos
            .iter()
            .any(|p| p.is_active && p.code == code && p.id != except)
    }

    /// Apply a completed transaction's effect and record it
    fn settle(&mut self, tx: &Transaction, now: DateTime<Utc>) -> Result<Settlement, DomainError> {
        let new_balance = self.account_mut(tx.account_id)?.apply(tx, now)?;
        self.transactions.push(tx.clone());
        Ok(Settlement {
            transaction: tx.clone(),
            new_balance,
        })
    }
}

/// A thread-safe in-memory implementation of every store port.
///
/// Suitable for tests and embedded use; nothing survives the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    audit_unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make audit appends fail until switched back, to simulate an outage of
    /// the audit sink
    pub fn set_audit_unavailable(&self, unavailable: bool) {
        self.audit_unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn insert_account(&self, account: &Account) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.accounts.insert(account.id(), account.clone());
        Ok(())
    }

    async fn account(&self, id: Uuid) -> StoreResult<Option<Account>> {
        let tables = self.tables.read().await;
        Ok(tables.accounts.get(&id).cloned())
    }

    async fn set_role(&self, id: Uuid, role: Role, now: DateTime<Utc>) -> StoreResult<Account> {
        let mut tables = self.tables.write().await;
        let account = tables.account_mut(id)?;
        account.set_role(role, now);
        Ok(account.clone())
    }

    async fn insert_transaction(&self, tx: &Transaction) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.accounts.contains_key(&tx.account_id) {
            return Err(DomainError::not_found("Account", tx.account_id).into());
        }
        tables.transactions.push(tx.clone());
        Ok(())
    }

    async fn insert_settled(&self, tx: &Transaction, now: DateTime<Utc>) -> StoreResult<Settlement> {
        let mut tables = self.tables.write().await;
        Ok(tables.settle(tx, now)?)
    }

    async fn complete_transaction(
        &self,
        id: Uuid,
        processed_by: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Settlement> {
        let mut tables = self.tables.write().await;
        let index = tables.transaction_index(id)?;

        // Work on a copy so a failed debit leaves the row untouched
        let mut tx = tables.transactions[index].clone();
        tx.mark_completed(processed_by, now)?;
        let new_balance = tables.account_mut(tx.account_id)?.apply(&tx, now)?;
        tables.transactions[index] = tx.clone();

        Ok(Settlement {
            transaction: tx,
            new_balance,
        })
    }

    async fn reject_transaction(
        &self,
        id: Uuid,
        reason: &str,
        processed_by: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Transaction> {
        let mut tables = self.tables.write().await;
        let index = tables.transaction_index(id)?;
        let tx = &mut tables.transactions[index];
        tx.mark_rejected(reason, processed_by, now)?;
        Ok(tx.clone())
    }

    async fn transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        let tables = self.tables.read().await;
        Ok(tables.transactions.iter().find(|tx| tx.id == id).cloned())
    }

    async fn account_transactions(&self, account_id: Uuid) -> StoreResult<Vec<Transaction>> {
        let tables = self.tables.read().await;
        Ok(tables
            .transactions
            .iter()
            .filter(|tx| tx.account_id == account_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create_order(
        &self,
        order: &Order,
        fee: &Transaction,
        guard: DuplicateGuard,
        now: DateTime<Utc>,
    ) -> StoreResult<Settlement> {
        let mut tables = self.tables.write().await;

        let duplicate = guard.find_duplicate(
            &order.title,
            tables.orders.iter().filter(|o| o.client_id == order.client_id),
        );
        if let Some(existing) = duplicate {
            return Err(DomainError::DuplicateOrder {
                order_number: existing.order_number.clone(),
            }
            .into());
        }
        if tables
            .orders
            .iter()
            .any(|o| o.order_number == order.order_number)
        {
            return Err(DomainError::Validation(format!(
                "order number {} already exists",
                order.order_number
            ))
            .into());
        }

        // Debit first; nothing has been written if it fails
        let settlement = tables.settle(fee, now)?;
        tables.orders.push(order.clone());
        Ok(settlement)
    }

    async fn modify_order(&self, id: Uuid, rule: OrderRule<'_>) -> StoreResult<OrderChange> {
        let mut tables = self.tables.write().await;
        let order = tables
            .orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| DomainError::not_found("Order", id))?;

        let before = order.clone();
        let mut after = order.clone();
        rule(&mut after)?;
        *order = after.clone();

        Ok(OrderChange { before, after })
    }

    async fn order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn client_orders(&self, client_id: Uuid) -> StoreResult<Vec<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .iter()
            .rev()
            .filter(|o| o.client_id == client_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PromoStore for MemoryStore {
    async fn insert_promo(&self, promo: &PromoCode) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.active_code_taken(&promo.code, promo.id) {
            return Err(DomainError::CodeTaken(promo.code.clone()).into());
        }
        tables.promos.push(promo.clone());
        Ok(())
    }

    async fn redeem_promo(
        &self,
        code: &str,
        account_id: Uuid,
        order_amount: Option<Amount>,
        now: DateTime<Utc>,
    ) -> StoreResult<Redemption> {
        let mut tables = self.tables.write().await;

        let index = tables
            .promo_index(code)
            .ok_or_else(|| DomainError::not_found("Promo code", normalize_code(code)))?;
        let role = tables
            .accounts
            .get(&account_id)
            .map(|a| a.role())
            .ok_or_else(|| DomainError::not_found("Account", account_id))?;

        let mut promo = tables.promos[index].clone();
        let benefit = promo.redeem(role, order_amount, now)?;

        let bonus = if benefit.benefit_type == PromoType::Bonus {
            let amount = Amount::new(benefit.benefit_amount).map_err(DomainError::from)?;
            let deposit = Transaction::settled(
                account_id,
                TransactionType::Deposit,
                amount,
                serde_json::json!({ "promo_code": promo.code }),
                account_id,
                now,
            );
            Some(tables.settle(&deposit, now)?)
        } else {
            None
        };

        tables.promos[index] = promo;
        Ok(Redemption { benefit, bonus })
    }

    async fn set_promo_active(&self, code: &str, active: bool) -> StoreResult<PromoCode> {
        let mut tables = self.tables.write().await;
        let index = tables
            .promo_index(code)
            .ok_or_else(|| DomainError::not_found("Promo code", normalize_code(code)))?;

        let (id, text) = (tables.promos[index].id, tables.promos[index].code.clone());
        if active && tables.active_code_taken(&text, id) {
            return Err(DomainError::CodeTaken(text).into());
        }

        let promo = &mut tables.promos[index];
        promo.is_active = active;
        Ok(promo.clone())
    }

    async fn promo_by_code(&self, code: &str) -> StoreResult<Option<PromoCode>> {
        let tables = self.tables.read().await;
        Ok(tables.promo_index(code).map(|i| tables.promos[i].clone()))
    }

    async fn list_promos(&self) -> StoreResult<Vec<PromoCode>> {
        let tables = self.tables.read().await;
        Ok(tables.promos.iter().rev().cloned().collect())
    }
}

#[async_trait]
impl BanStore for MemoryStore {
    async fn insert_ban(&self, ban: &Ban) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.accounts.contains_key(&ban.account_id) {
            return Err(DomainError::not_found("Account", ban.account_id).into());
        }
        tables.bans.push(ban.clone());
        Ok(())
    }

    async fn lift_ban(&self, id: Uuid, ctx: &OperationContext, now: DateTime<Utc>) -> StoreResult<Ban> {
        let mut tables = self.tables.write().await;
        let ban = tables
            .bans
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| DomainError::not_found("Ban", id))?;
        ban.lift(ctx, now)?;
        Ok(ban.clone())
    }

    async fn account_bans(&self, account_id: Uuid) -> StoreResult<Vec<Ban>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bans
            .iter()
            .rev()
            .filter(|b| b.account_id == account_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append_audit(&self, record: AuditRecord) -> StoreResult<AuditLogEntry> {
        if self.audit_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("audit log".to_string()));
        }

        let mut tables = self.tables.write().await;
        let (sequence_number, previous_hash) = match tables.audit.last() {
            Some(last) => (last.sequence_number + 1, last.current_hash.clone()),
            None => (1, GENESIS_HASH.to_string()),
        };
        let entry = record.seal(sequence_number, &previous_hash);
        tables.audit.push(entry.clone());
        Ok(entry)
    }

    async fn audit_chain(&self, after_sequence: i64, limit: i64) -> StoreResult<Vec<AuditLogEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .audit
            .iter()
            .skip_while(|entry| entry.sequence_number <= after_sequence)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn recent_audit(&self, limit: i64) -> StoreResult<Vec<AuditLogEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .audit
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn audit_by_actor(&self, actor: Uuid, limit: i64) -> StoreResult<Vec<AuditLogEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .audit
            .iter()
            .rev()
            .filter(|e| e.actor_account_id == actor)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
