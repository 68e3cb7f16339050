//! Handler tests
//!
//! Run every handler against `MemoryStore` with a manual clock.

#[cfg(test)]
mod tests {
    use crate::aggregate::{BanType, OrderStatus, Priority, PromoType, TransactionStatus, TransactionType};
    use crate::config::MarketPolicy;
    use crate::domain::{DomainError, LedgerEvent, ManualClock, OperationContext, Role};
    use crate::error::AppError;
    use crate::handlers::{
        CreateOrderCommand, CreatePromoCodeCommand, IssueBanCommand, ManualAdjustmentCommand,
        MarketCore, OpenTransactionCommand, RedeemPromoCodeCommand, RegisterAccountCommand,
    };
    use crate::store::MemoryStore;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use uuid::Uuid;

    struct Harness {
        core: MarketCore,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        admin: OperationContext,
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start()));
        let core = MarketCore::new(store.clone(), clock.clone(), MarketPolicy::default());
        Harness {
            core,
            store,
            clock,
            admin: OperationContext::system(),
        }
    }

    impl Harness {
        async fn account(&self, role: Role, funds: Option<&str>) -> OperationContext {
            let account = self
                .core
                .ledger()
                .register_account(RegisterAccountCommand::new("someone", role), &self.admin)
                .await
                .unwrap();
            if let Some(amount) = funds {
                self.core
                    .transactions()
                    .open_manual(
                        ManualAdjustmentCommand::new(
                            account.id(),
                            TransactionType::Deposit,
                            amount,
                            "opening balance",
                        ),
                        &self.admin,
                    )
                    .await
                    .unwrap();
            }
            OperationContext::new(account.id(), role)
        }

        async fn balance(&self, account_id: Uuid) -> Decimal {
            self.core.ledger().balance(account_id).await.unwrap().value()
        }
    }

    fn domain(err: AppError) -> DomainError {
        match err {
            AppError::Domain(e) => e,
            other => panic!("expected a domain error, got {other:?}"),
        }
    }

    // =========================================================================
    // Ledger
    // =========================================================================

    #[tokio::test]
    async fn test_staff_registration_requires_admin() {
        let h = harness();
        let client = h.account(Role::Client, None).await;

        let err = h
            .core
            .ledger()
            .register_account(RegisterAccountCommand::new("mod", Role::Moderator), &client)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "unauthorized");
    }

    #[tokio::test]
    async fn test_pending_deposit_has_no_balance_effect_until_completed() {
        let h = harness();
        let client = h.account(Role::Client, None).await;

        let tx = h
            .core
            .transactions()
            .open(
                OpenTransactionCommand::new(client.actor_id, TransactionType::Deposit, "40.00"),
                &client,
            )
            .await
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(h.balance(client.actor_id).await, Decimal::ZERO);

        let settled = h.core.transactions().complete(tx.id, &h.admin).await.unwrap();
        assert_eq!(settled.new_balance, Decimal::new(40, 0));

        let err = h.core.transactions().reject(tx.id, "late", &h.admin).await.unwrap_err();
        assert_eq!(err.error_code(), "already_finalized");
        assert_eq!(h.balance(client.actor_id).await, Decimal::new(40, 0));
    }

    #[tokio::test]
    async fn test_client_cannot_complete_transactions() {
        let h = harness();
        let client = h.account(Role::Client, None).await;
        let tx = h
            .core
            .transactions()
            .open(
                OpenTransactionCommand::new(client.actor_id, TransactionType::Deposit, "5"),
                &client,
            )
            .await
            .unwrap();

        let err = h.core.transactions().complete(tx.id, &client).await.unwrap_err();
        assert_eq!(err.error_code(), "unauthorized");
    }

    #[tokio::test]
    async fn test_open_for_unknown_account_is_not_found() {
        let h = harness();
        let err = h
            .core
            .transactions()
            .open(
                OpenTransactionCommand::new(Uuid::new_v4(), TransactionType::Deposit, "5"),
                &h.admin,
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "not_found");
    }

    #[tokio::test]
    async fn test_open_rejects_non_positive_amount() {
        let h = harness();
        let client = h.account(Role::Client, None).await;
        let err = h
            .core
            .transactions()
            .open(
                OpenTransactionCommand::new(client.actor_id, TransactionType::Deposit, "0"),
                &client,
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid_amount");
    }

    #[tokio::test]
    async fn test_payment_mute_blocks_deposits_only() {
        let h = harness();
        let client = h.account(Role::Client, Some("20")).await;
        h.core
            .restrictions()
            .issue(
                IssueBanCommand::new(client.actor_id, BanType::PaymentMute, 30),
                &h.admin,
            )
            .await
            .unwrap();

        let err = h
            .core
            .transactions()
            .open(
                OpenTransactionCommand::new(client.actor_id, TransactionType::Deposit, "10"),
                &client,
            )
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::Restricted { .. }));

        let withdrawal = h
            .core
            .transactions()
            .open(
                OpenTransactionCommand::new(client.actor_id, TransactionType::Withdrawal, "10"),
                &client,
            )
            .await;
        assert!(withdrawal.is_ok());
    }

    #[tokio::test]
    async fn test_completion_is_broadcast() {
        let h = harness();
        let mut events = h.core.subscribe();
        let client = h.account(Role::Client, Some("12.50")).await;

        match events.recv().await.unwrap() {
            LedgerEvent::BalanceChanged {
                account_id,
                new_balance,
                ..
            } => {
                assert_eq!(account_id, client.actor_id);
                assert_eq!(new_balance, Decimal::new(1250, 2));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_audit_outage_does_not_fail_the_operation() {
        let h = harness();
        let client = h.account(Role::Client, None).await;
        h.store.set_audit_unavailable(true);

        let result = h
            .core
            .transactions()
            .open_manual(
                ManualAdjustmentCommand::new(client.actor_id, TransactionType::Deposit, "7", "refund"),
                &h.admin,
            )
            .await;
        assert!(result.is_ok());
        assert_eq!(h.balance(client.actor_id).await, Decimal::new(7, 0));
    }

    #[tokio::test]
    async fn test_verify_balance_after_mixed_history() {
        let h = harness();
        let client = h.account(Role::Client, Some("100")).await;
        h.core
            .orders()
            .create(CreateOrderCommand::new("Logo design", "80", Priority::High), &client)
            .await
            .unwrap();

        let report = h.core.ledger().verify_balance(client.actor_id).await.unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.computed_balance, Decimal::new(70, 0));
        assert_eq!(report.transactions_counted, 2);
    }

    // =========================================================================
    // Orders
    // =========================================================================

    #[tokio::test]
    async fn test_order_mute_blocks_creation() {
        let h = harness();
        let client = h.account(Role::Client, Some("100")).await;
        h.core
            .restrictions()
            .issue(IssueBanCommand::new(client.actor_id, BanType::AccountBlock, 10), &h.admin)
            .await
            .unwrap();

        let err = h
            .core
            .orders()
            .create(CreateOrderCommand::new("Landing page", "50", Priority::Normal), &client)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "restricted");
        assert_eq!(h.balance(client.actor_id).await, Decimal::new(100, 0));
    }

    #[tokio::test]
    async fn test_updated_fee_applies_to_next_order() {
        let h = harness();
        let client = h.account(Role::Client, Some("100")).await;

        let err = h
            .core
            .orders()
            .update_priority_fee(Priority::Normal, "20", &client)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "unauthorized");

        let schedule = h
            .core
            .orders()
            .update_priority_fee(Priority::Normal, "20", &h.admin)
            .await
            .unwrap();
        assert_eq!(schedule.normal.value(), Decimal::new(20, 0));

        let created = h
            .core
            .orders()
            .create(CreateOrderCommand::new("Translate a manual", "30", Priority::Normal), &client)
            .await
            .unwrap();
        assert_eq!(created.fee_transaction.amount.value(), Decimal::new(20, 0));
        assert_eq!(created.new_balance, Decimal::new(80, 0));
    }

    #[tokio::test]
    async fn test_force_transition_is_audited() {
        let h = harness();
        let client = h.account(Role::Client, Some("100")).await;
        let moderator = h.account(Role::Moderator, None).await;
        let created = h
            .core
            .orders()
            .create(CreateOrderCommand::new("Data entry", "25", Priority::Normal), &client)
            .await
            .unwrap();

        let err = h
            .core
            .orders()
            .force_transition(created.order.id, OrderStatus::Completed, "dispute", &client)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "unauthorized");

        let order = h
            .core
            .orders()
            .force_transition(created.order.id, OrderStatus::Completed, "dispute", &moderator)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Completed);

        let recent = h.core.audit().by_actor(moderator.actor_id, 10).await.unwrap();
        assert_eq!(recent[0].action, "order.forced_transition");
        let details = recent[0].details.as_ref().unwrap();
        assert_eq!(details["before"], "pending");
        assert_eq!(details["after"], "completed");
        assert!(h.core.audit().verify_chain(None).await.unwrap().is_valid);
    }

    #[tokio::test]
    async fn test_role_change_records_before_and_after() {
        let h = harness();
        let executor = h.account(Role::Executor, None).await;

        let err = h
            .core
            .ledger()
            .set_role(executor.actor_id, Role::Moderator, &executor)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "unauthorized");

        let account = h
            .core
            .ledger()
            .set_role(executor.actor_id, Role::Moderator, &h.admin)
            .await
            .unwrap();
        assert_eq!(account.role(), Role::Moderator);

        let entries = h.core.audit().recent(1).await.unwrap();
        assert_eq!(entries[0].action, "account.role_changed");
        let details = entries[0].details.as_ref().unwrap();
        assert_eq!(details["before"], "executor");
        assert_eq!(details["after"], "moderator");
    }

    // =========================================================================
    // Promo codes
    // =========================================================================

    #[tokio::test]
    async fn test_explicit_code_collision_is_code_taken() {
        let h = harness();
        let expires = start() + Duration::days(7);
        let command = CreatePromoCodeCommand::new(PromoType::Bonus, "25", expires).with_code("spring-25");

        let promo = h.core.promos().create(command.clone(), &h.admin).await.unwrap();
        assert_eq!(promo.code, "SPRING-25");

        let err = h.core.promos().create(command, &h.admin).await.unwrap_err();
        assert!(matches!(domain(err), DomainError::CodeTaken(_)));
    }

    #[tokio::test]
    async fn test_generated_code_shape() {
        let h = harness();
        let promo = h
            .core
            .promos()
            .create(
                CreatePromoCodeCommand::new(PromoType::DiscountPercent, "10", start() + Duration::days(1)),
                &h.admin,
            )
            .await
            .unwrap();

        assert_eq!(promo.code.len(), 8);
        assert!(promo.code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_preview_does_not_consume_a_use() {
        let h = harness();
        let executor = h.account(Role::Executor, None).await;
        h.core
            .promos()
            .create(
                CreatePromoCodeCommand::new(PromoType::DiscountPercent, "20", start() + Duration::days(1))
                    .with_code("TWENTY")
                    .with_usage_limit(1)
                    .with_max_discount("15"),
                &h.admin,
            )
            .await
            .unwrap();

        let preview = h
            .core
            .promos()
            .preview("twenty", executor.actor_id, Some("100"))
            .await
            .unwrap();
        assert_eq!(preview.benefit_amount, Decimal::new(15, 0));

        let redeemed = h
            .core
            .promos()
            .redeem(
                RedeemPromoCodeCommand::new("TWENTY", executor.actor_id).with_order_amount("100"),
                &executor,
            )
            .await
            .unwrap();
        assert_eq!(redeemed.benefit.benefit_amount, Decimal::new(15, 0));
        assert_eq!(redeemed.bonus_transaction_id, None);
    }

    #[tokio::test]
    async fn test_bonus_redemption_credits_balance() {
        let h = harness();
        let client = h.account(Role::Client, None).await;
        h.core
            .promos()
            .create(
                CreatePromoCodeCommand::new(PromoType::Bonus, "50", start() + Duration::hours(1))
                    .with_code("WELCOME50"),
                &h.admin,
            )
            .await
            .unwrap();

        let result = h
            .core
            .promos()
            .redeem(RedeemPromoCodeCommand::new("welcome50", client.actor_id), &client)
            .await
            .unwrap();
        assert_eq!(result.new_balance, Some(Decimal::new(50, 0)));
        assert!(result.bonus_transaction_id.is_some());

        h.clock.advance(Duration::hours(2));
        let err = h
            .core
            .promos()
            .redeem(RedeemPromoCodeCommand::new("welcome50", client.actor_id), &client)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "expired");
    }

    #[tokio::test]
    async fn test_deactivated_code_is_inactive() {
        let h = harness();
        let client = h.account(Role::Client, None).await;
        h.core
            .promos()
            .create(
                CreatePromoCodeCommand::new(PromoType::Bonus, "5", start() + Duration::days(1))
                    .with_code("PAUSED"),
                &h.admin,
            )
            .await
            .unwrap();
        h.core.promos().set_active("PAUSED", false, &h.admin).await.unwrap();

        let err = h
            .core
            .promos()
            .redeem(RedeemPromoCodeCommand::new("PAUSED", client.actor_id), &client)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "inactive");
    }

    // =========================================================================
    // Restrictions
    // =========================================================================

    #[tokio::test]
    async fn test_lifted_ban_stays_in_history() {
        let h = harness();
        let client = h.account(Role::Client, None).await;
        let ban = h
            .core
            .restrictions()
            .issue(IssueBanCommand::new(client.actor_id, BanType::OrderMute, 60), &h.admin)
            .await
            .unwrap();

        let restrictions = h.core.restrictions();
        assert!(restrictions.is_restricted(client.actor_id, BanType::OrderMute).await.unwrap());
        assert!(!restrictions.is_restricted(client.actor_id, BanType::PaymentMute).await.unwrap());

        restrictions.lift(ban.id, &h.admin).await.unwrap();
        assert!(!restrictions.is_restricted(client.actor_id, BanType::OrderMute).await.unwrap());
        assert!(restrictions.active_bans(client.actor_id).await.unwrap().is_empty());
        assert_eq!(restrictions.history(client.actor_id).await.unwrap().len(), 1);
    }
}
