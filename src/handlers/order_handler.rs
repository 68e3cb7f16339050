//! Order Handler
//!
//! Order creation with its up-front priority fee, role-gated transitions and
//! the staff override. Every state change runs as a rule under the store's
//! lock on the order row.

use rust_decimal::Decimal;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

use crate::aggregate::{
    Aggregate, BanType, DuplicateGuard, NewOrder, Order, OrderStatus, Priority,
    PriorityFeeSchedule, Transaction, TransactionType,
};
use crate::audit::{AuditAction, AuditLog, AuditLogBuilder};
use crate::config::MarketPolicy;
use crate::domain::{Clock, DomainError, OperationContext};
use crate::error::AppResult;
use crate::store::{OrderChange, OrderRule, Store};

use super::{parse_amount, CreateOrderCommand, CreateOrderResult, LedgerNotifier, RestrictionHandler};

/// Handler for orders
#[derive(Clone)]
pub struct OrderHandler {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    audit: AuditLog,
    notifier: LedgerNotifier,
    restrictions: RestrictionHandler,
    fees: Arc<RwLock<PriorityFeeSchedule>>,
    duplicate_guard: DuplicateGuard,
    commission_rate: Decimal,
    default_max_revisions: i32,
}

impl OrderHandler {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        audit: AuditLog,
        notifier: LedgerNotifier,
        restrictions: RestrictionHandler,
        policy: &MarketPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            audit,
            notifier,
            restrictions,
            fees: Arc::new(RwLock::new(policy.fee_schedule)),
            duplicate_guard: policy.duplicate_guard,
            commission_rate: policy.commission_rate,
            default_max_revisions: policy.default_max_revisions,
        }
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Post an order for the acting client. The priority fee is debited in
    /// the same atomic unit as the order insert.
    pub async fn create(
        &self,
        command: CreateOrderCommand,
        context: &OperationContext,
    ) -> AppResult<CreateOrderResult> {
        let client_id = context.actor_id;
        self.restrictions
            .ensure_unrestricted(client_id, BanType::OrderMute)
            .await?;

        let price = parse_amount(&command.price)?;
        let priority = command.priority;
        let fee = self.fee_schedule().fee_for(priority);
        let now = self.clock.now();

        let order = Order::create(
            client_id,
            NewOrder {
                title: command.title,
                description: command.description,
                price,
                priority,
                people_needed: command.people_needed,
                deadline: command.deadline,
                requirements: command.requirements,
                max_revisions: command.max_revisions,
            },
            fee,
            self.commission_rate,
            self.default_max_revisions,
            now,
        )?;

        let fee_tx = Transaction::settled(
            client_id,
            TransactionType::Payment,
            fee,
            serde_json::json!({
                "order_id": order.id,
                "order_number": order.order_number,
                "priority": priority,
            }),
            client_id,
            now,
        );

        let settlement = match self
            .store
            .create_order(&order, &fee_tx, self.duplicate_guard, now)
            .await
        {
            Ok(settlement) => settlement,
            Err(e) => {
                tracing::warn!(
                    %client_id,
                    priority = %priority,
                    fee = %fee,
                    error = %e,
                    "Order creation refused"
                );
                return Err(e.into());
            }
        };

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            %client_id,
            priority = %priority,
            fee = %fee,
            new_balance = %settlement.new_balance,
            "Order created"
        );

        self.notifier.balance_changed(&settlement, now);
        self.audit
            .append(
                AuditLogBuilder::new(AuditAction::OrderCreated)
                    .target(Order::aggregate_type(), order.id)
                    .detail("order_number", &order.order_number)
                    .detail("price", order.price)
                    .detail("priority", priority)
                    .detail("priority_fee", fee)
                    .detail("fee_transaction_id", settlement.transaction.id),
                context,
                now,
            )
            .await;

        Ok(CreateOrderResult {
            order,
            fee_transaction: settlement.transaction,
            new_balance: settlement.new_balance.value(),
        })
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Accept one executor onto the order
    pub async fn accept_participant(
        &self,
        order_id: Uuid,
        executor_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<Order> {
        if self.store.account(executor_id).await?.is_none() {
            return Err(DomainError::not_found("Account", executor_id).into());
        }
        let now = self.clock.now();
        let change = self
            .apply(order_id, &|order: &mut Order| {
                order.accept_participant(executor_id, context, now)
            })
            .await?;

        tracing::info!(
            %order_id,
            %executor_id,
            people_accepted = change.after.people_accepted,
            people_needed = change.after.people_needed,
            "Participant accepted"
        );
        Ok(change.after)
    }

    pub async fn start(&self, order_id: Uuid, context: &OperationContext) -> AppResult<Order> {
        let now = self.clock.now();
        let change = self
            .apply(order_id, &|order: &mut Order| order.start(context, now))
            .await?;
        log_transition(&change);
        Ok(change.after)
    }

    pub async fn submit_for_review(
        &self,
        order_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<Order> {
        let now = self.clock.now();
        let change = self
            .apply(order_id, &|order: &mut Order| order.submit_for_review(context, now))
            .await?;
        log_transition(&change);
        Ok(change.after)
    }

    /// Client accepts the work; the platform fee is recorded
    pub async fn complete(&self, order_id: Uuid, context: &OperationContext) -> AppResult<Order> {
        let now = self.clock.now();
        let change = self
            .apply(order_id, &|order: &mut Order| order.complete(context, now))
            .await?;
        log_transition(&change);
        Ok(change.after)
    }

    pub async fn request_revision(
        &self,
        order_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<Order> {
        let now = self.clock.now();
        let change = self
            .apply(order_id, &|order: &mut Order| order.request_revision(context, now))
            .await?;

        tracing::info!(
            %order_id,
            revision_count = change.after.revision_count,
            max_revisions = change.after.max_revisions,
            "Revision requested"
        );
        Ok(change.after)
    }

    pub async fn cancel(
        &self,
        order_id: Uuid,
        reason: &str,
        context: &OperationContext,
    ) -> AppResult<Order> {
        let now = self.clock.now();
        let change = self
            .apply(order_id, &|order: &mut Order| order.cancel(context, now))
            .await?;
        log_transition(&change);

        self.audit
            .append(
                AuditLogBuilder::new(AuditAction::OrderCancelled)
                    .target(Order::aggregate_type(), order_id)
                    .detail("from", change.before.status)
                    .detail("reason", reason),
                context,
                now,
            )
            .await;

        Ok(change.after)
    }

    /// Staff override to any other status, always audited
    pub async fn force_transition(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        reason: &str,
        context: &OperationContext,
    ) -> AppResult<Order> {
        let now = self.clock.now();
        let change = self
            .apply(order_id, &|order: &mut Order| {
                order.force_status(target, context, now).map(|_| ())
            })
            .await?;

        tracing::warn!(
            %order_id,
            from = %change.before.status,
            to = %change.after.status,
            forced_by = %context.actor_id,
            reason,
            "Order status forced"
        );

        self.audit
            .append(
                AuditLogBuilder::new(AuditAction::OrderForced)
                    .target(Order::aggregate_type(), order_id)
                    .before_state(&change.before.status)
                    .after_state(&change.after.status)
                    .detail("reason", reason),
                context,
                now,
            )
            .await;

        Ok(change.after)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn order(&self, order_id: Uuid) -> AppResult<Order> {
        self.store
            .order(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", order_id).into())
    }

    /// Orders posted by a client, newest first
    pub async fn client_orders(&self, client_id: Uuid) -> AppResult<Vec<Order>> {
        Ok(self.store.client_orders(client_id).await?)
    }

    // =========================================================================
    // Fee schedule
    // =========================================================================

    pub fn fee_schedule(&self) -> PriorityFeeSchedule {
        *self.fees.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change one priority fee, admin only. Applies to orders created after
    /// the change.
    pub async fn update_priority_fee(
        &self,
        priority: Priority,
        fee: &str,
        context: &OperationContext,
    ) -> AppResult<PriorityFeeSchedule> {
        context.require_admin("updating priority fees")?;
        let fee = parse_amount(fee)?;

        let (previous, schedule) = {
            let mut fees = self.fees.write().unwrap_or_else(PoisonError::into_inner);
            let previous = fees.fee_for(priority);
            fees.set_fee(priority, fee);
            (previous, *fees)
        };

        tracing::info!(
            priority = %priority,
            from = %previous,
            to = %fee,
            "Priority fee updated"
        );

        let now = self.clock.now();
        self.audit
            .append(
                AuditLogBuilder::new(AuditAction::PriorityFeeUpdated)
                    .detail("priority", priority)
                    .before_state(&previous)
                    .after_state(&fee),
                context,
                now,
            )
            .await;

        Ok(schedule)
    }

    async fn apply(&self, order_id: Uuid, rule: OrderRule<'_>) -> AppResult<OrderChange> {
        Ok(self.store.modify_order(order_id, rule).await?)
    }
}

fn log_transition(change: &OrderChange) {
    tracing::info!(
        order_id = %change.after.id,
        order_number = %change.after.order_number,
        from = %change.before.status,
        to = %change.after.status,
        "Order status changed"
    );
}
