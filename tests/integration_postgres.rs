//! The same core against PgStore. Skips when DATABASE_URL is unset.
//!
//! Kept in a single test so table truncation cannot race another test.

use std::sync::Arc;

use chrono::Duration;
use gt_market::aggregate::{BanType, OrderStatus, Priority, PromoType, TransactionType};
use gt_market::handlers::{
    CreateOrderCommand, CreatePromoCodeCommand, IssueBanCommand, OpenTransactionCommand,
    RedeemPromoCodeCommand,
};
use gt_market::{PgStore, Role};
use rust_decimal_macros::dec;

mod common;

use common::{epoch, Market};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_market_core_on_postgres() {
    let Some(pool) = common::setup_test_db().await else {
        eprintln!("DATABASE_URL not set, skipping Postgres suite");
        return;
    };
    let market = Market::over(Arc::new(PgStore::new(pool)));

    // Fee debit and order insert are one unit
    let poor = market.client("10").await;
    let err = market
        .core
        .orders()
        .create(CreateOrderCommand::new("Urgent landing page", "300", Priority::Urgent), &poor)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "insufficient_funds");
    assert_eq!(market.balance(poor.actor_id).await, dec!(10));
    assert!(market.core.orders().client_orders(poor.actor_id).await.unwrap().is_empty());

    let client = market.client("100").await;
    let created = market
        .core
        .orders()
        .create(CreateOrderCommand::new("Write release notes", "50", Priority::Normal), &client)
        .await
        .unwrap();
    assert_eq!(created.new_balance, dec!(85));
    assert_eq!(created.order.status, OrderStatus::Pending);

    let stored = market.core.orders().order(created.order.id).await.unwrap();
    assert_eq!(stored.order_number, created.order.order_number);
    assert_eq!(stored.priority_fee.value(), dec!(15));

    // Pending deposit, completed once
    let tx = market
        .core
        .transactions()
        .open(
            OpenTransactionCommand::new(client.actor_id, TransactionType::Deposit, "20"),
            &client,
        )
        .await
        .unwrap();
    market.core.transactions().complete(tx.id, &market.admin).await.unwrap();
    let again = market
        .core
        .transactions()
        .complete(tx.id, &market.admin)
        .await
        .unwrap_err();
    assert_eq!(again.error_code(), "already_finalized");
    assert!(market
        .core
        .ledger()
        .verify_balance(client.actor_id)
        .await
        .unwrap()
        .is_consistent());

    // Single-use bonus under contention
    let code = market
        .core
        .promos()
        .create(
            CreatePromoCodeCommand::new(PromoType::Bonus, "50", epoch() + Duration::days(1))
                .with_usage_limit(1),
            &market.admin,
        )
        .await
        .unwrap()
        .code;
    let first = market.account(Role::Client, None).await;
    let second = market.account(Role::Client, None).await;
    let promos = market.core.promos();
    let (a, b) = tokio::join!(
        promos.redeem(RedeemPromoCodeCommand::new(&code, first.actor_id), &first),
        promos.redeem(RedeemPromoCodeCommand::new(&code, second.actor_id), &second),
    );
    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    let total = market.balance(first.actor_id).await + market.balance(second.actor_id).await;
    assert_eq!(total, dec!(50));

    // Ban expiry is read against the clock
    market
        .core
        .restrictions()
        .issue(IssueBanCommand::new(client.actor_id, BanType::OrderMute, 60), &market.admin)
        .await
        .unwrap();
    market.clock.advance(Duration::minutes(59));
    assert!(market
        .core
        .restrictions()
        .is_restricted(client.actor_id, BanType::OrderMute)
        .await
        .unwrap());
    market.clock.advance(Duration::minutes(2));
    assert!(!market
        .core
        .restrictions()
        .is_restricted(client.actor_id, BanType::OrderMute)
        .await
        .unwrap());

    // Every entry above links into one intact chain
    let chain = market.core.audit().verify_chain(None).await.unwrap();
    assert!(chain.is_valid, "broken at {:?}", chain.first_invalid_entry);
    assert!(chain.entries_checked > 5);
}
