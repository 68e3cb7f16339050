//! Promo Code Handler
//!
//! Creation, redemption and administration of promo codes. The usage check
//! and increment happen in one store unit, so a code with `usage_limit = N`
//! admits exactly N redemptions however many race for it.

use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

use crate::aggregate::promo_code::generate_code;
use crate::aggregate::{Aggregate, Benefit, NewPromoCode, PromoCode, PromoType};
use crate::audit::{AuditAction, AuditLog, AuditLogBuilder};
use crate::domain::{Amount, Clock, DomainError, OperationContext};
use crate::error::{AppError, AppResult};
use crate::store::{StoreError, Store};

use super::{
    parse_amount, CreatePromoCodeCommand, LedgerNotifier, RedeemPromoCodeCommand, RedemptionResult,
};

/// Handler for promo codes
#[derive(Clone)]
pub struct PromoCodeHandler {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    audit: AuditLog,
    notifier: LedgerNotifier,
    code_attempts: u32,
}

impl PromoCodeHandler {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        audit: AuditLog,
        notifier: LedgerNotifier,
        code_attempts: u32,
    ) -> Self {
        Self {
            store,
            clock,
            audit,
            notifier,
            code_attempts: code_attempts.max(1),
        }
    }

    /// Create a promo code, admin only. Without an explicit code a random one
    /// is generated, retrying on collision with an active code.
    pub async fn create(
        &self,
        command: CreatePromoCodeCommand,
        context: &OperationContext,
    ) -> AppResult<PromoCode> {
        context.require_admin("creating promo codes")?;
        let new = to_new_promo(&command)?;
        let now = self.clock.now();

        let promo = match command.code.as_deref() {
            Some(code) => {
                let promo = PromoCode::new(code, &new, context.actor_id, now)?;
                self.store.insert_promo(&promo).await?;
                promo
            }
            None => self.insert_generated(&new, context, now).await?,
        };

        tracing::info!(
            promo_code_id = %promo.id,
            code = %promo.code,
            promo_type = %promo.promo_type,
            usage_limit = ?promo.usage_limit,
            expires_at = %promo.expires_at,
            "Promo code created"
        );

        self.audit
            .append(
                AuditLogBuilder::new(AuditAction::PromoCreated)
                    .target(PromoCode::aggregate_type(), promo.id)
                    .detail("code", &promo.code)
                    .detail("promo_type", promo.promo_type)
                    .detail("bonus_amount", promo.bonus_amount)
                    .detail("discount_value", promo.discount_value)
                    .detail("usage_limit", promo.usage_limit)
                    .detail("target_audience", promo.target_audience)
                    .detail("distribution_method", promo.distribution_method)
                    .detail("expires_at", promo.expires_at),
                context,
                now,
            )
            .await;

        Ok(promo)
    }

    /// Redeem a code for the actor's own account (staff may redeem on behalf
    /// of anybody). Bonus codes credit the account in the same unit.
    pub async fn redeem(
        &self,
        command: RedeemPromoCodeCommand,
        context: &OperationContext,
    ) -> AppResult<RedemptionResult> {
        if command.account_id != context.actor_id && !context.is_staff() {
            return Err(DomainError::unauthorized(
                "promo codes can only be redeemed for the actor's own account",
            )
            .into());
        }
        let order_amount = parse_optional_amount(command.order_amount.as_deref())?;
        let now = self.clock.now();

        let redemption = match self
            .store
            .redeem_promo(&command.code, command.account_id, order_amount, now)
            .await
        {
            Ok(redemption) => redemption,
            Err(StoreError::Domain(e)) if e.is_promo_rejection() => {
                tracing::info!(
                    code = %command.code,
                    account_id = %command.account_id,
                    reason = e.code(),
                    "Promo code rejected"
                );
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        let benefit = &redemption.benefit;
        tracing::info!(
            promo_code_id = %benefit.promo_code_id,
            code = %benefit.code,
            account_id = %command.account_id,
            benefit_type = %benefit.benefit_type,
            benefit_amount = %benefit.benefit_amount,
            remaining_uses = ?benefit.remaining_uses,
            "Promo code redeemed"
        );

        if let Some(bonus) = &redemption.bonus {
            self.notifier.balance_changed(bonus, now);
        }

        self.audit
            .append(
                AuditLogBuilder::new(AuditAction::PromoRedeemed)
                    .target(PromoCode::aggregate_type(), benefit.promo_code_id)
                    .detail("code", &benefit.code)
                    .detail("account_id", command.account_id)
                    .detail("benefit_type", benefit.benefit_type)
                    .detail("benefit_amount", benefit.benefit_amount)
                    .detail(
                        "bonus_transaction_id",
                        redemption.bonus.as_ref().map(|b| b.transaction.id),
                    ),
                context,
                now,
            )
            .await;

        Ok(RedemptionResult {
            bonus_transaction_id: redemption.bonus.as_ref().map(|b| b.transaction.id),
            new_balance: redemption.bonus.as_ref().map(|b| b.new_balance.value()),
            benefit: redemption.benefit,
        })
    }

    /// Run the redemption checks and compute the benefit without consuming
    /// a use
    pub async fn preview(
        &self,
        code: &str,
        account_id: uuid::Uuid,
        order_amount: Option<&str>,
    ) -> AppResult<Benefit> {
        let order_amount = parse_optional_amount(order_amount)?;
        let promo = self
            .store
            .promo_by_code(code)
            .await?
            .ok_or_else(|| DomainError::not_found("Promo code", code))?;
        let account = self
            .store
            .account(account_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Account", account_id))?;

        Ok(promo.evaluate(account.role(), order_amount, self.clock.now())?)
    }

    /// Activate or deactivate a code, admin only
    pub async fn set_active(
        &self,
        code: &str,
        active: bool,
        context: &OperationContext,
    ) -> AppResult<PromoCode> {
        context.require_admin("changing promo code status")?;
        let promo = self.store.set_promo_active(code, active).await?;

        tracing::info!(
            promo_code_id = %promo.id,
            code = %promo.code,
            is_active = promo.is_active,
            "Promo code status changed"
        );

        self.audit
            .append(
                AuditLogBuilder::new(AuditAction::PromoStatusChanged)
                    .target(PromoCode::aggregate_type(), promo.id)
                    .detail("code", &promo.code)
                    .detail("is_active", promo.is_active),
                context,
                self.clock.now(),
            )
            .await;

        Ok(promo)
    }

    pub async fn list(&self) -> AppResult<Vec<PromoCode>> {
        Ok(self.store.list_promos().await?)
    }

    async fn insert_generated(
        &self,
        new: &NewPromoCode,
        context: &OperationContext,
        now: chrono::DateTime<chrono::Utc>,
    ) -> AppResult<PromoCode> {
        for attempt in 1..=self.code_attempts {
            let promo = PromoCode::new(&generate_code(), new, context.actor_id, now)?;
            match self.store.insert_promo(&promo).await {
                Ok(()) => return Ok(promo),
                Err(StoreError::Domain(DomainError::CodeTaken(code))) => {
                    tracing::debug!(attempt, %code, "Generated promo code collided, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::Internal(format!(
            "no unused promo code found after {} attempts",
            self.code_attempts
        )))
    }
}

fn to_new_promo(command: &CreatePromoCodeCommand) -> Result<NewPromoCode, DomainError> {
    let (bonus_amount, discount_value) = match command.promo_type {
        PromoType::Bonus => (Some(parse_amount(&command.value)?), None),
        PromoType::DiscountPercent | PromoType::DiscountFixed => {
            (None, Some(parse_decimal(&command.value)?))
        }
    };

    Ok(NewPromoCode {
        code: command.code.clone(),
        promo_type: command.promo_type,
        bonus_amount,
        discount_value,
        min_order_amount: command
            .min_order_amount
            .as_deref()
            .map(parse_decimal)
            .transpose()?,
        max_discount: parse_optional_amount(command.max_discount.as_deref())?,
        usage_limit: command.usage_limit,
        expires_at: command.expires_at,
        target_audience: command.target_audience,
        distribution_method: command.distribution_method,
    })
}

fn parse_decimal(raw: &str) -> Result<Decimal, DomainError> {
    Decimal::from_str(raw.trim())
        .map_err(|_| DomainError::InvalidAmount(format!("invalid decimal: {raw}")))
}

fn parse_optional_amount(raw: Option<&str>) -> Result<Option<Amount>, DomainError> {
    raw.map(parse_amount).transpose()
}
