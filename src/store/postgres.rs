//! PostgreSQL store
//!
//! Each compound operation is one SQL transaction. Contended rows are locked
//! with `SELECT ... FOR UPDATE` before the aggregate rule runs, and any error
//! drops the transaction, which rolls it back.
//!
//! Lock order is transaction row, then promo row, then account row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row};
use std::str::FromStr;
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

type PgTx<'c> = sqlx::Transaction<'c, Postgres>;

/// Advisory lock key serializing audit appends
const AUDIT_CHAIN_LOCK: i64 = 0x6774_6175_6469_74;

const ACCOUNT_COLUMNS: &str = "id, display_name, balance, role, rating, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, account_id, transaction_type, amount, status, metadata, \
     admin_notes, processed_by, created_at, completed_at";

const ORDER_COLUMNS: &str = "id, order_number, title, description, price, status, priority, \
     client_id, executor_id, people_needed, people_accepted, deadline, requirements, \
     revision_count, max_revisions, escrow_amount, commission_rate, priority_fee, \
     platform_fee, created_at, updated_at";

const PROMO_COLUMNS: &str = "id, code, promo_type, bonus_amount, discount_value, \
     min_order_amount, max_discount, usage_limit, usage_count, expires_at, is_active, \
     target_audience, distribution_method, created_by, created_at";

const BAN_COLUMNS: &str = "id, account_id, ban_type, reason, issued_by, duration_minutes, \
     created_at, expires_at, is_active, lifted_by, lifted_at";

const AUDIT_COLUMNS: &str = "id, sequence_number, actor_account_id, action, target_id, \
     target_type, details, correlation_id, previous_hash, current_hash, created_at";

/// Store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// =========================================================================
// Row mapping
// =========================================================================

fn parse_column<T>(row: &PgRow, column: &str, entity: &'static str, id: Uuid) -> StoreResult<T>
where
    T: FromStr<Err = DomainError>,
{
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|e: DomainError| StoreError::corrupt(entity, id, e))
}

fn amount_column(row: &PgRow, column: &str, entity: &'static str, id: Uuid) -> StoreResult<Amount> {
    let value: Decimal = row.try_get(column)?;
    Amount::new(value).map_err(|e| StoreError::corrupt(entity, id, e))
}

fn account_from_row(row: &PgRow) -> StoreResult<Account> {
    let id: Uuid = row.try_get("id")?;
    Account::from_db_state(
        id,
        row.try_get("display_name")?,
        row.try_get("balance")?,
        parse_column(row, "role", "account", id)?,
        row.try_get("rating")?,
        row.try_get("created_at")?,
        row.try_get("updated_at")?,
    )
    .map_err(|e| StoreError::corrupt("account", id, e))
}

fn transaction_from_row(row: &PgRow) -> StoreResult<Transaction> {
    let id: Uuid = row.try_get("id")?;
    Ok(Transaction {
        id,
        account_id: row.try_get("account_id")?,
        transaction_type: parse_column(row, "transaction_type", "transaction", id)?,
        amount: amount_column(row, "amount", "transaction", id)?,
        status: parse_column(row, "status", "transaction", id)?,
        metadata: row.try_get("metadata")?,
        admin_notes: row.try_get("admin_notes")?,
        processed_by: row.try_get("processed_by")?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn order_from_row(row: &PgRow) -> StoreResult<Order> {
    let id: Uuid = row.try_get("id")?;
    Ok(Order {
        id,
        order_number: row.try_get("order_number")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        price: amount_column(row, "price", "order", id)?,
        status: parse_column(row, "status", "order", id)?,
        priority: parse_column(row, "priority", "order", id)?,
        client_id: row.try_get("client_id")?,
        executor_id: row.try_get("executor_id")?,
        people_needed: row.try_get("people_needed")?,
        people_accepted: row.try_get("people_accepted")?,
        deadline: row.try_get("deadline")?,
        requirements: row.try_get("requirements")?,
        revision_count: row.try_get("revision_count")?,
        max_revisions: row.try_get("max_revisions")?,
        escrow_amount: row.try_get("escrow_amount")?,
        commission_rate: row.try_get("commission_rate")?,
        priority_fee: amount_column(row, "priority_fee", "order", id)?,
        platform_fee: row.try_get("platform_fee")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn promo_from_row(row: &PgRow) -> StoreResult<PromoCode> {
    let id: Uuid = row.try_get("id")?;
    Ok(PromoCode {
        id,
        code: row.try_get("code")?,
        promo_type: parse_column(row, "promo_type", "promo_code", id)?,
        bonus_amount: row.try_get("bonus_amount")?,
        discount_value: row.try_get("discount_value")?,
        min_order_amount: row.try_get("min_order_amount")?,
        max_discount: row.try_get("max_discount")?,
        usage_limit: row.try_get("usage_limit")?,
        usage_count: row.try_get("usage_count")?,
        expires_at: row.try_get("expires_at")?,
        is_active: row.try_get("is_active")?,
        target_audience: parse_column(row, "target_audience", "promo_code", id)?,
        distribution_method: parse_column(row, "distribution_method", "promo_code", id)?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
    })
}

fn ban_from_row(row: &PgRow) -> StoreResult<Ban> {
    let id: Uuid = row.try_get("id")?;
    Ok(Ban {
        id,
        account_id: row.try_get("account_id")?,
        ban_type: parse_column(row, "ban_type", "ban", id)?,
        reason: row.try_get("reason")?,
        issued_by: row.try_get("issued_by")?,
        duration_minutes: row.try_get("duration_minutes")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
        is_active: row.try_get("is_active")?,
        lifted_by: row.try_get("lifted_by")?,
        lifted_at: row.try_get("lifted_at")?,
    })
}

fn audit_from_row(row: &PgRow) -> StoreResult<AuditLogEntry> {
    Ok(AuditLogEntry {
        id: row.try_get("id")?,
        sequence_number: row.try_get("sequence_number")?,
        actor_account_id: row.try_get("actor_account_id")?,
        action: row.try_get("action")?,
        target_id: row.try_get("target_id")?,
        target_type: row.try_get("target_type")?,
        details: row.try_get("details")?,
        correlation_id: row.try_get("correlation_id")?,
        previous_hash: row.try_get("previous_hash")?,
        current_hash: row.try_get("current_hash")?,
        created_at: row.try_get("created_at")?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

// =========================================================================
// Statements shared by several units
// =========================================================================

async fn lock_account(tx: &mut PgTx<'_>, id: Uuid) -> StoreResult<Account> {
    let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 FOR UPDATE");
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| DomainError::not_found("Account", id))?;
    account_from_row(&row)
}

async fn save_balance(tx: &mut PgTx<'_>, account: &Account) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE accounts SET balance = $2, updated_at = $3
        WHERE id = $1
        "#,
    )
    .bind(account.id())
    .bind(account.balance().value())
    .bind(account.updated_at())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_transaction_row(tx: &mut PgTx<'_>, record: &Transaction) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO transactions (
            id, account_id, transaction_type, amount, status, metadata,
            admin_notes, processed_by, created_at, completed_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(record.id)
    .bind(record.account_id)
    .bind(record.transaction_type.as_str())
    .bind(record.amount.value())
    .bind(record.status.as_str())
    .bind(&record.metadata)
    .bind(&record.admin_notes)
    .bind(record.processed_by)
    .bind(record.created_at)
    .bind(record.completed_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn update_transaction_row(tx: &mut PgTx<'_>, record: &Transaction) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE transactions
        SET status = $2, admin_notes = $3, processed_by = $4, completed_at = $5
        WHERE id = $1
        "#,
    )
    .bind(record.id)
    .bind(record.status.as_str())
    .bind(&record.admin_notes)
    .bind(record.processed_by)
    .bind(record.completed_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn lock_transaction(tx: &mut PgTx<'_>, id: Uuid) -> StoreResult<Transaction> {
    let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1 FOR UPDATE");
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| DomainError::not_found("Transaction", id))?;
    transaction_from_row(&row)
}

/// Lock the account, apply a completed transaction and record it
async fn settle(tx: &mut PgTx<'_>, record: &Transaction, now: DateTime<Utc>) -> StoreResult<Settlement> {
    let mut account = lock_account(tx, record.account_id).await?;
    let new_balance = account.apply(record, now)?;
    save_balance(tx, &account).await?;
    insert_transaction_row(tx, record).await?;
    Ok(Settlement {
        transaction: record.clone(),
        new_balance,
    })
}

async fn lock_promo(tx: &mut PgTx<'_>, code: &str) -> StoreResult<PromoCode> {
    let code = normalize_code(code);
    let sql = format!(
        "SELECT {PROMO_COLUMNS} FROM promo_codes WHERE code = $1 \
         ORDER BY is_active DESC, created_at DESC LIMIT 1 FOR UPDATE"
    );
    let row = sqlx::query(&sql)
        .bind(&code)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| DomainError::not_found("Promo code", &code))?;
    promo_from_row(&row)
}

// =========================================================================
// LedgerStore
// =========================================================================

#[async_trait]
impl LedgerStore for PgStore {
    async fn insert_account(&self, account: &Account) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, display_name, balance, role, rating, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(account.id())
        .bind(account.display_name())
        .bind(account.balance().value())
        .bind(account.role().as_str())
        .bind(account.rating())
        .bind(account.created_at())
        .bind(account.updated_at())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn account(&self, id: Uuid) -> StoreResult<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn set_role(&self, id: Uuid, role: Role, now: DateTime<Utc>) -> StoreResult<Account> {
        let mut tx = self.pool.begin().await?;
        let mut account = lock_account(&mut tx, id).await?;
        account.set_role(role, now);

        sqlx::query("UPDATE accounts SET role = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(role.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(account)
    }

    async fn insert_transaction(&self, record: &Transaction) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM accounts WHERE id = $1)")
            .bind(record.account_id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(DomainError::not_found("Account", record.account_id).into());
        }
        insert_transaction_row(&mut tx, record).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_settled(&self, record: &Transaction, now: DateTime<Utc>) -> StoreResult<Settlement> {
        let mut tx = self.pool.begin().await?;
        let settlement = settle(&mut tx, record, now).await?;
        tx.commit().await?;
        Ok(settlement)
    }

    async fn complete_transaction(
        &self,
        id: Uuid,
        processed_by: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Settlement> {
        let mut tx = self.pool.begin().await?;

        let mut record = lock_transaction(&mut tx, id).await?;
        record.mark_completed(processed_by, now)?;

        let mut account = lock_account(&mut tx, record.account_id).await?;
        let new_balance = account.apply(&record, now)?;
        save_balance(&mut tx, &account).await?;
        update_transaction_row(&mut tx, &record).await?;

        tx.commit().await?;
        Ok(Settlement {
            transaction: record,
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
        let mut tx = self.pool.begin().await?;
        let mut record = lock_transaction(&mut tx, id).await?;
        record.mark_rejected(reason, processed_by, now)?;
        update_transaction_row(&mut tx, &record).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn account_transactions(&self, account_id: Uuid) -> StoreResult<Vec<Transaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE account_id = $1 \
             ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql).bind(account_id).fetch_all(&self.pool).await?;
        rows.iter().map(transaction_from_row).collect()
    }
}

// =========================================================================
// OrderStore
// =========================================================================

#[async_trait]
impl OrderStore for PgStore {
    async fn create_order(
        &self,
        order: &Order,
        fee: &Transaction,
        guard: DuplicateGuard,
        now: DateTime<Utc>,
    ) -> StoreResult<Settlement> {
        let mut tx = self.pool.begin().await?;

        // The client row lock serializes concurrent creations by one client
        let mut account = lock_account(&mut tx, order.client_id).await?;

        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE client_id = $1 \
             AND status IN ('pending', 'accepted', 'in_progress')"
        );
        let active = sqlx::query(&sql)
            .bind(order.client_id)
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(order_from_row)
            .collect::<StoreResult<Vec<_>>>()?;
        if let Some(existing) = guard.find_duplicate(&order.title, &active) {
            return Err(DomainError::DuplicateOrder {
                order_number: existing.order_number.clone(),
            }
            .into());
        }

        let new_balance = account.apply(fee, now)?;
        save_balance(&mut tx, &account).await?;
        insert_transaction_row(&mut tx, fee).await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number, title, description, price, status, priority,
                client_id, executor_id, people_needed, people_accepted, deadline,
                requirements, revision_count, max_revisions, escrow_amount,
                commission_rate, priority_fee, platform_fee, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                    $15, $16, $17, $18, $19, $20, $21)
            "#,
        )
        .bind(order.id)
        .bind(&order.order_number)
        .bind(&order.title)
        .bind(&order.description)
        .bind(order.price.value())
        .bind(order.status.as_str())
        .bind(order.priority.as_str())
        .bind(order.client_id)
        .bind(order.executor_id)
        .bind(order.people_needed)
        .bind(order.people_accepted)
        .bind(order.deadline)
        .bind(&order.requirements)
        .bind(order.revision_count)
        .bind(order.max_revisions)
        .bind(order.escrow_amount)
        .bind(order.commission_rate)
        .bind(order.priority_fee.value())
        .bind(order.platform_fee)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Settlement {
            transaction: fee.clone(),
            new_balance,
        })
    }

    async fn modify_order(&self, id: Uuid, rule: OrderRule<'_>) -> StoreResult<OrderChange> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", id))?;
        let before = order_from_row(&row)?;

        let mut after = before.clone();
        rule(&mut after)?;

        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, executor_id = $3, people_accepted = $4,
                revision_count = $5, platform_fee = $6, escrow_amount = $7,
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(after.status.as_str())
        .bind(after.executor_id)
        .bind(after.people_accepted)
        .bind(after.revision_count)
        .bind(after.platform_fee)
        .bind(after.escrow_amount)
        .bind(after.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(OrderChange { before, after })
    }

    async fn order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn client_orders(&self, client_id: Uuid) -> StoreResult<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE client_id = $1 ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&sql).bind(client_id).fetch_all(&self.pool).await?;
        rows.iter().map(order_from_row).collect()
    }
}

// =========================================================================
// PromoStore
// =========================================================================

#[async_trait]
impl PromoStore for PgStore {
    async fn insert_promo(&self, promo: &PromoCode) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO promo_codes (
                id, code, promo_type, bonus_amount, discount_value, min_order_amount,
                max_discount, usage_limit, usage_count, expires_at, is_active,
                target_audience, distribution_method, created_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(promo.id)
        .bind(&promo.code)
        .bind(promo.promo_type.as_str())
        .bind(promo.bonus_amount)
        .bind(promo.discount_value)
        .bind(promo.min_order_amount)
        .bind(promo.max_discount)
        .bind(promo.usage_limit)
        .bind(promo.usage_count)
        .bind(promo.expires_at)
        .bind(promo.is_active)
        .bind(promo.target_audience.as_str())
        .bind(promo.distribution_method.as_str())
        .bind(promo.created_by)
        .bind(promo.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(DomainError::CodeTaken(promo.code.clone()).into()),
            Err(e) => Err(e.into()),
        }
    }

    async fn redeem_promo(
        &self,
        code: &str,
        account_id: Uuid,
        order_amount: Option<Amount>,
        now: DateTime<Utc>,
    ) -> StoreResult<Redemption> {
        let mut tx = self.pool.begin().await?;

        let mut promo = lock_promo(&mut tx, code).await?;
        let mut account = lock_account(&mut tx, account_id).await?;
        let benefit = promo.redeem(account.role(), order_amount, now)?;

        sqlx::query("UPDATE promo_codes SET usage_count = $2 WHERE id = $1")
            .bind(promo.id)
            .bind(promo.usage_count)
            .execute(&mut *tx)
            .await?;

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
            let new_balance = account.apply(&deposit, now)?;
            save_balance(&mut tx, &account).await?;
            insert_transaction_row(&mut tx, &deposit).await?;
            Some(Settlement {
                transaction: deposit,
                new_balance,
            })
        } else {
            None
        };

        tx.commit().await?;
        Ok(Redemption { benefit, bonus })
    }

    async fn set_promo_active(&self, code: &str, active: bool) -> StoreResult<PromoCode> {
        let mut tx = self.pool.begin().await?;
        let mut promo = lock_promo(&mut tx, code).await?;
        promo.is_active = active;

        let result = sqlx::query("UPDATE promo_codes SET is_active = $2 WHERE id = $1")
            .bind(promo.id)
            .bind(active)
            .execute(&mut *tx)
            .await;
        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(DomainError::CodeTaken(promo.code.clone()).into())
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit().await?;
        Ok(promo)
    }

    async fn promo_by_code(&self, code: &str) -> StoreResult<Option<PromoCode>> {
        let sql = format!(
            "SELECT {PROMO_COLUMNS} FROM promo_codes WHERE code = $1 \
             ORDER BY is_active DESC, created_at DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(normalize_code(code))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(promo_from_row).transpose()
    }

    async fn list_promos(&self) -> StoreResult<Vec<PromoCode>> {
        let sql = format!("SELECT {PROMO_COLUMNS} FROM promo_codes ORDER BY created_at DESC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(promo_from_row).collect()
    }
}

// =========================================================================
// BanStore
// =========================================================================

#[async_trait]
impl BanStore for PgStore {
    async fn insert_ban(&self, ban: &Ban) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM accounts WHERE id = $1)")
            .bind(ban.account_id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(DomainError::not_found("Account", ban.account_id).into());
        }

        sqlx::query(
            r#"
            INSERT INTO bans (
                id, account_id, ban_type, reason, issued_by, duration_minutes,
                created_at, expires_at, is_active, lifted_by, lifted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(ban.id)
        .bind(ban.account_id)
        .bind(ban.ban_type.as_str())
        .bind(&ban.reason)
        .bind(ban.issued_by)
        .bind(ban.duration_minutes)
        .bind(ban.created_at)
        .bind(ban.expires_at)
        .bind(ban.is_active)
        .bind(ban.lifted_by)
        .bind(ban.lifted_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn lift_ban(&self, id: Uuid, ctx: &OperationContext, now: DateTime<Utc>) -> StoreResult<Ban> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {BAN_COLUMNS} FROM bans WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DomainError::not_found("Ban", id))?;
        let mut ban = ban_from_row(&row)?;
        ban.lift(ctx, now)?;

        sqlx::query("UPDATE bans SET is_active = $2, lifted_by = $3, lifted_at = $4 WHERE id = $1")
            .bind(id)
            .bind(ban.is_active)
            .bind(ban.lifted_by)
            .bind(ban.lifted_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(ban)
    }

    async fn account_bans(&self, account_id: Uuid) -> StoreResult<Vec<Ban>> {
        let sql = format!(
            "SELECT {BAN_COLUMNS} FROM bans WHERE account_id = $1 ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&sql).bind(account_id).fetch_all(&self.pool).await?;
        rows.iter().map(ban_from_row).collect()
    }
}

// =========================================================================
// AuditStore
// =========================================================================

#[async_trait]
impl AuditStore for PgStore {
    async fn append_audit(&self, record: AuditRecord) -> StoreResult<AuditLogEntry> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(AUDIT_CHAIN_LOCK)
            .execute(&mut *tx)
            .await?;

        let last: Option<(i64, String)> = sqlx::query_as(
            "SELECT sequence_number, current_hash FROM audit_log ORDER BY sequence_number DESC LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?;
        let (sequence_number, previous_hash) = match last {
            Some((seq, hash)) => (seq + 1, hash),
            None => (1, GENESIS_HASH.to_string()),
        };

        let entry = record.seal(sequence_number, &previous_hash);
        sqlx::query(
            r#"
            INSERT INTO audit_log (
                id, sequence_number, actor_account_id, action, target_id, target_type,
                details, correlation_id, previous_hash, current_hash, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(entry.id)
        .bind(entry.sequence_number)
        .bind(entry.actor_account_id)
        .bind(&entry.action)
        .bind(entry.target_id)
        .bind(&entry.target_type)
        .bind(&entry.details)
        .bind(entry.correlation_id)
        .bind(&entry.previous_hash)
        .bind(&entry.current_hash)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(entry)
    }

    async fn audit_chain(&self, after_sequence: i64, limit: i64) -> StoreResult<Vec<AuditLogEntry>> {
        let sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log WHERE sequence_number > $1 \
             ORDER BY sequence_number ASC LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(after_sequence)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(audit_from_row).collect()
    }

    async fn recent_audit(&self, limit: i64) -> StoreResult<Vec<AuditLogEntry>> {
        let sql = format!("SELECT {AUDIT_COLUMNS} FROM audit_log ORDER BY sequence_number DESC LIMIT $1");
        let rows = sqlx::query(&sql).bind(limit).fetch_all(&self.pool).await?;
        rows.iter().map(audit_from_row).collect()
    }

    async fn audit_by_actor(&self, actor: Uuid, limit: i64) -> StoreResult<Vec<AuditLogEntry>> {
        let sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log WHERE actor_account_id = $1 \
             ORDER BY sequence_number DESC LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(actor)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(audit_from_row).collect()
    }
}
