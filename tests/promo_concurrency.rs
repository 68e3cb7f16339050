//! Promo code usage caps under concurrent redemption

use std::sync::Arc;

use chrono::Duration;
use gt_market::aggregate::{PromoType, TargetAudience};
use gt_market::handlers::{CreatePromoCodeCommand, RedeemPromoCodeCommand, RedemptionResult};
use gt_market::{AppError, AppResult, DomainError, Role};
use rust_decimal_macros::dec;
use tokio::sync::Barrier;

mod common;

use common::{epoch, Market};

async fn create_code(market: &Market, command: CreatePromoCodeCommand) -> String {
    market
        .core
        .promos()
        .create(command, &market.admin)
        .await
        .expect("Failed to create promo code")
        .code
}

/// Race `accounts` redemptions of one code, all released at once
async fn race(
    market: &Market,
    code: &str,
    accounts: usize,
    order_amount: Option<&'static str>,
) -> Vec<AppResult<RedemptionResult>> {
    let barrier = Arc::new(Barrier::new(accounts));
    let mut handles = Vec::with_capacity(accounts);

    for _ in 0..accounts {
        let redeemer = market.account(Role::Client, None).await;
        let promos = market.core.promos().clone();
        let barrier = barrier.clone();
        let mut command = RedeemPromoCodeCommand::new(code, redeemer.actor_id);
        if let Some(amount) = order_amount {
            command = command.with_order_amount(amount);
        }

        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            promos.redeem(command, &redeemer).await
        }));
    }

    let mut results = Vec::with_capacity(accounts);
    for handle in handles {
        results.push(handle.await.expect("redemption task panicked"));
    }
    results
}

fn rejections(results: &[AppResult<RedemptionResult>]) -> Vec<&'static str> {
    results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .map(AppError::error_code)
        .collect()
}

/// Limit 1 bonus 50, two accounts at once: exactly one is credited
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scenario_single_use_bonus_race() {
    let market = Market::in_memory();
    let code = create_code(
        &market,
        CreatePromoCodeCommand::new(PromoType::Bonus, "50", epoch() + Duration::days(3))
            .with_usage_limit(1),
    )
    .await;

    let results = race(&market, &code, 2, None).await;

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].new_balance, Some(dec!(50)));
    assert_eq!(rejections(&results), vec!["usage_limit_reached"]);

    let promo = market
        .core
        .promos()
        .list()
        .await
        .unwrap()
        .into_iter()
        .find(|p| p.code == code)
        .unwrap();
    assert_eq!(promo.usage_count, 1);
}

/// usage_limit = N with N + k racers: N successes, k UsageLimitReached
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_usage_limit_holds_under_contention() {
    const LIMIT: i32 = 5;
    const EXTRA: usize = 7;

    let market = Market::in_memory();
    let code = create_code(
        &market,
        CreatePromoCodeCommand::new(PromoType::DiscountFixed, "10", epoch() + Duration::days(1))
            .with_usage_limit(LIMIT),
    )
    .await;

    let results = race(&market, &code, LIMIT as usize + EXTRA, Some("25")).await;

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, LIMIT as usize);
    let refused = rejections(&results);
    assert_eq!(refused.len(), EXTRA);
    assert!(refused.iter().all(|code| *code == "usage_limit_reached"));

    for benefit in results.iter().filter_map(|r| r.as_ref().ok()) {
        assert_eq!(benefit.benefit.benefit_amount, dec!(10));
        assert_eq!(benefit.bonus_transaction_id, None);
    }
}

#[tokio::test]
async fn test_validation_order() {
    let market = Market::in_memory();
    let client = market.account(Role::Client, None).await;
    let executor = market.executor().await;

    let code = create_code(
        &market,
        CreatePromoCodeCommand::new(PromoType::DiscountPercent, "10", epoch() + Duration::hours(1))
            .with_code("EXEC10")
            .with_min_order_amount("100")
            .for_audience(TargetAudience::Executors),
    )
    .await;
    let promos = market.core.promos();

    // Minimum is checked before the audience
    let err = promos
        .redeem(
            RedeemPromoCodeCommand::new(&code, client.actor_id).with_order_amount("50"),
            &client,
        )
        .await
        .unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::MinAmountNotMet { .. })));

    let err = promos
        .redeem(
            RedeemPromoCodeCommand::new(&code, client.actor_id).with_order_amount("150"),
            &client,
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "not_eligible");

    let err = promos
        .redeem(RedeemPromoCodeCommand::new(&code, executor.actor_id), &executor)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "invalid_amount");

    let ok = promos
        .redeem(
            RedeemPromoCodeCommand::new(&code, executor.actor_id).with_order_amount("150"),
            &executor,
        )
        .await
        .unwrap();
    assert_eq!(ok.benefit.benefit_amount, dec!(15));

    let err = promos
        .redeem(RedeemPromoCodeCommand::new("NOSUCHCODE", executor.actor_id), &executor)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "not_found");

    market.clock.advance(Duration::hours(1));
    let err = promos
        .redeem(
            RedeemPromoCodeCommand::new(&code, executor.actor_id).with_order_amount("150"),
            &executor,
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "expired");
}
