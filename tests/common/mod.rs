//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use gt_market::aggregate::TransactionType;
use gt_market::handlers::{ManualAdjustmentCommand, RegisterAccountCommand};
use gt_market::{ManualClock, MarketCore, MarketPolicy, MemoryStore, OperationContext, Role, Store};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

/// Fixed start instant for the manual clock
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap()
}

/// A market core over some store, driven by a manual clock
pub struct Market {
    pub core: MarketCore,
    pub clock: Arc<ManualClock>,
    pub admin: OperationContext,
}

impl Market {
    pub fn over<S: Store + 'static>(store: Arc<S>) -> Self {
        let clock = Arc::new(ManualClock::new(epoch()));
        Self {
            core: MarketCore::new(store, clock.clone(), MarketPolicy::default()),
            clock,
            admin: OperationContext::system(),
        }
    }

    pub fn in_memory() -> Self {
        Self::over(Arc::new(MemoryStore::new()))
    }

    /// Register an account and, when `funds` is given, credit it through an
    /// admin adjustment
    pub async fn account(&self, role: Role, funds: Option<&str>) -> OperationContext {
        let account = self
            .core
            .ledger()
            .register_account(RegisterAccountCommand::new("test account", role), &self.admin)
            .await
            .expect("Failed to register account");

        if let Some(amount) = funds {
            self.core
                .transactions()
                .open_manual(
                    ManualAdjustmentCommand::new(
                        account.id(),
                        TransactionType::Deposit,
                        amount,
                        "test funding",
                    ),
                    &self.admin,
                )
                .await
                .expect("Failed to fund account");
        }

        OperationContext::new(account.id(), role)
    }

    pub async fn client(&self, funds: &str) -> OperationContext {
        self.account(Role::Client, Some(funds)).await
    }

    pub async fn executor(&self) -> OperationContext {
        self.account(Role::Executor, None).await
    }

    pub async fn balance(&self, account_id: Uuid) -> Decimal {
        self.core
            .ledger()
            .balance(account_id)
            .await
            .expect("Failed to read balance")
            .value()
    }
}

/// Connect to the test database and clear every table. `None` when
/// `DATABASE_URL` is unset, so Postgres suites skip instead of failing.
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    sqlx::query("TRUNCATE TABLE audit_log, bans, promo_codes, orders, transactions, accounts CASCADE")
        .execute(&pool)
        .await
        .expect("Failed to clean up DB");

    Some(pool)
}
