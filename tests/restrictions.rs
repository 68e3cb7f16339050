//! Time-boxed bans evaluated against the clock

use chrono::Duration;
use gt_market::aggregate::{BanType, Priority, TransactionType};
use gt_market::handlers::{CreateOrderCommand, IssueBanCommand, OpenTransactionCommand};
use gt_market::DomainError;

mod common;

use common::{epoch, Market};

/// order_mute for 60 minutes: restricted at +59m, free at +61m with no lift
#[tokio::test]
async fn test_scenario_ban_expires_without_lift() {
    let market = Market::in_memory();
    let client = market.client("100").await;
    let restrictions = market.core.restrictions();

    let ban = restrictions
        .issue(
            IssueBanCommand::new(client.actor_id, BanType::OrderMute, 60).with_reason("spam"),
            &market.admin,
        )
        .await
        .unwrap();
    assert_eq!(ban.expires_at, epoch() + Duration::minutes(60));

    market.clock.advance(Duration::minutes(59));
    assert!(restrictions.is_restricted(client.actor_id, BanType::OrderMute).await.unwrap());
    let err = market
        .core
        .orders()
        .create(CreateOrderCommand::new("Fill in spreadsheets", "20", Priority::Normal), &client)
        .await
        .unwrap_err();
    match err.domain() {
        Some(DomainError::Restricted {
            ban_type,
            expires_at,
        }) => {
            assert_eq!(ban_type, "order_mute");
            assert_eq!(*expires_at, ban.expires_at);
        }
        other => panic!("expected Restricted, got {other:?}"),
    }

    market.clock.advance(Duration::minutes(2));
    assert!(!restrictions.is_restricted(client.actor_id, BanType::OrderMute).await.unwrap());
    assert!(market
        .core
        .orders()
        .create(CreateOrderCommand::new("Fill in spreadsheets", "20", Priority::Normal), &client)
        .await
        .is_ok());

    // Expiry never rewrites history
    let history = restrictions.history(client.actor_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].is_active);
}

#[tokio::test]
async fn test_account_block_covers_every_capability() {
    let market = Market::in_memory();
    let client = market.client("100").await;
    let restrictions = market.core.restrictions();

    restrictions
        .issue(IssueBanCommand::new(client.actor_id, BanType::AccountBlock, 15), &market.admin)
        .await
        .unwrap();

    for capability in [BanType::OrderMute, BanType::PaymentMute, BanType::AccountBlock] {
        assert!(restrictions.is_restricted(client.actor_id, capability).await.unwrap());
    }

    let err = market
        .core
        .transactions()
        .open(
            OpenTransactionCommand::new(client.actor_id, TransactionType::Purchase, "10"),
            &client,
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "restricted");
}

#[tokio::test]
async fn test_only_staff_issue_and_lift() {
    let market = Market::in_memory();
    let client = market.client("5").await;
    let other = market.client("5").await;
    let restrictions = market.core.restrictions();

    let err = restrictions
        .issue(IssueBanCommand::new(other.actor_id, BanType::PaymentMute, 30), &client)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "unauthorized");

    let err = restrictions
        .issue(IssueBanCommand::new(other.actor_id, BanType::PaymentMute, 0), &market.admin)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "validation_failed");

    let ban = restrictions
        .issue(IssueBanCommand::new(other.actor_id, BanType::PaymentMute, 30), &market.admin)
        .await
        .unwrap();

    let err = restrictions.lift(ban.id, &client).await.unwrap_err();
    assert_eq!(err.error_code(), "unauthorized");

    let lifted = restrictions.lift(ban.id, &market.admin).await.unwrap();
    assert!(!lifted.is_active);
    assert_eq!(lifted.lifted_by, Some(market.admin.actor_id));

    let actions: Vec<_> = market
        .core
        .audit()
        .recent(2)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(actions, vec!["ban.lifted", "ban.issued"]);
}

#[tokio::test]
async fn test_ban_on_unknown_account_is_not_found() {
    let market = Market::in_memory();
    let err = market
        .core
        .restrictions()
        .issue(
            IssueBanCommand::new(uuid::Uuid::new_v4(), BanType::OrderMute, 10),
            &market.admin,
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "not_found");
}
