//! Store module
//!
//! Persistence ports. Every compound read-then-write (balance check + debit,
//! usage check + increment, duplicate scan + insert, pending check +
//! finalize) is one method here, and each implementation runs it as a single
//! atomic unit. Rules stay in the aggregates; the store only loads, calls the
//! rule and writes under the same lock.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::aggregate::{
    Account, Ban, Benefit, DuplicateGuard, Order, PromoCode, Transaction,
};
use crate::audit::{AuditLogEntry, AuditRecord};
use crate::domain::{Amount, Balance, DomainError, OperationContext, Role};

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted row no longer satisfies a domain invariant
    #[error("Corrupt {entity} row {id}: {reason}")]
    Corrupt {
        entity: &'static str,
        id: Uuid,
        reason: String,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub(crate) fn corrupt(entity: &'static str, id: Uuid, reason: impl ToString) -> Self {
        Self::Corrupt {
            entity,
            id,
            reason: reason.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A transaction that reached `completed` and the balance it produced
#[derive(Debug, Clone)]
pub struct Settlement {
    pub transaction: Transaction,
    pub new_balance: Balance,
}

/// Outcome of an atomic promo redemption
#[derive(Debug, Clone)]
pub struct Redemption {
    pub benefit: Benefit,
    /// Completed synthetic deposit for bonus codes
    pub bonus: Option<Settlement>,
}

/// Order before and after a state change
#[derive(Debug, Clone)]
pub struct OrderChange {
    pub before: Order,
    pub after: Order,
}

/// Rule applied to an order under the store's lock
pub type OrderRule<'a> = &'a (dyn Fn(&mut Order) -> Result<(), DomainError> + Send + Sync);

// =========================================================================
// Ports
// =========================================================================

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert_account(&self, account: &Account) -> StoreResult<()>;

    async fn account(&self, id: Uuid) -> StoreResult<Option<Account>>;

    async fn set_role(&self, id: Uuid, role: Role, now: DateTime<Utc>) -> StoreResult<Account>;

    /// Insert a pending transaction. `NotFound` if the account is unknown.
    async fn insert_transaction(&self, tx: &Transaction) -> StoreResult<()>;

    /// Insert an already-completed transaction and apply its ledger effect
    async fn insert_settled(&self, tx: &Transaction, now: DateTime<Utc>) -> StoreResult<Settlement>;

    /// Pending check, ledger effect and flip to `completed` in one unit.
    /// `InsufficientFunds` leaves both the transaction and the balance as
    /// they were.
    async fn complete_transaction(
        &self,
        id: Uuid,
        processed_by: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Settlement>;

    async fn reject_transaction(
        &self,
        id: Uuid,
        reason: &str,
        processed_by: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Transaction>;

    async fn transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>>;

    /// Oldest first
    async fn account_transactions(&self, account_id: Uuid) -> StoreResult<Vec<Transaction>>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Duplicate scan, fee debit, fee transaction insert and order insert in
    /// one unit. Any failure persists nothing.
    async fn create_order(
        &self,
        order: &Order,
        fee: &Transaction,
        guard: DuplicateGuard,
        now: DateTime<Utc>,
    ) -> StoreResult<Settlement>;

    /// Load, apply `rule`, write back under the order's lock
    async fn modify_order(&self, id: Uuid, rule: OrderRule<'_>) -> StoreResult<OrderChange>;

    async fn order(&self, id: Uuid) -> StoreResult<Option<Order>>;

    /// Newest first
    async fn client_orders(&self, client_id: Uuid) -> StoreResult<Vec<Order>>;
}

#[async_trait]
pub trait PromoStore: Send + Sync {
    /// `CodeTaken` if an active code already uses the same text
    async fn insert_promo(&self, promo: &PromoCode) -> StoreResult<()>;

    /// Validation, usage increment and (for bonus codes) the synthetic
    /// deposit in one unit
    async fn redeem_promo(
        &self,
        code: &str,
        account_id: Uuid,
        order_amount: Option<Amount>,
        now: DateTime<Utc>,
    ) -> StoreResult<Redemption>;

    async fn set_promo_active(&self, code: &str, active: bool) -> StoreResult<PromoCode>;

    /// Active code first when several rows share the text
    async fn promo_by_code(&self, code: &str) -> StoreResult<Option<PromoCode>>;

    async fn list_promos(&self) -> StoreResult<Vec<PromoCode>>;
}

#[async_trait]
pub trait BanStore: Send + Sync {
    async fn insert_ban(&self, ban: &Ban) -> StoreResult<()>;

    async fn lift_ban(&self, id: Uuid, ctx: &OperationContext, now: DateTime<Utc>) -> StoreResult<Ban>;

    /// All bans of the account, newest first, lifted and expired included
    async fn account_bans(&self, account_id: Uuid) -> StoreResult<Vec<Ban>>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Assign the next sequence number, link to the previous hash and insert
    async fn append_audit(&self, record: AuditRecord) -> StoreResult<AuditLogEntry>;

    /// Oldest first, starting after `after_sequence` (0 for the genesis entry)
    async fn audit_chain(&self, after_sequence: i64, limit: i64) -> StoreResult<Vec<AuditLogEntry>>;

    /// Newest first
    async fn recent_audit(&self, limit: i64) -> StoreResult<Vec<AuditLogEntry>>;

    /// Newest first
    async fn audit_by_actor(&self, actor: Uuid, limit: i64) -> StoreResult<Vec<AuditLogEntry>>;
}

/// Everything the marketplace core persists
pub trait Store: LedgerStore + OrderStore + PromoStore + BanStore + AuditStore {}

impl<T> Store for T where T: LedgerStore + OrderStore + PromoStore + BanStore + AuditStore {}
