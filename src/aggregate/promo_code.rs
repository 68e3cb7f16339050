//! Promo Code Aggregate
//!
//! Validation is ordered and short-circuiting; `redeem` is `evaluate` plus
//! the usage increment, and the store runs both under one lock.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{Amount, DomainError, Role};

use super::{random_code, Aggregate};

/// Length of generated codes
pub const GENERATED_CODE_LEN: usize = 8;

const MIN_CODE_LEN: usize = 4;
const MAX_CODE_LEN: usize = 32;
/// Decimal places stored for discount values and minimum order amounts
const VALUE_SCALE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromoType {
    /// Credits coins to the redeeming account
    Bonus,
    /// Percentage off an order amount
    DiscountPercent,
    /// Fixed amount off an order amount
    DiscountFixed,
}

impl PromoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromoType::Bonus => "bonus",
            PromoType::DiscountPercent => "discount_percent",
            PromoType::DiscountFixed => "discount_fixed",
        }
    }

    pub fn is_discount(&self) -> bool {
        !matches!(self, PromoType::Bonus)
    }
}

impl fmt::Display for PromoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromoType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bonus" => Ok(PromoType::Bonus),
            "discount_percent" => Ok(PromoType::DiscountPercent),
            "discount_fixed" => Ok(PromoType::DiscountFixed),
            other => Err(DomainError::Validation(format!(
                "unknown promo type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetAudience {
    All,
    Clients,
    Executors,
}

impl TargetAudience {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetAudience::All => "all",
            TargetAudience::Clients => "clients",
            TargetAudience::Executors => "executors",
        }
    }

    pub fn admits(&self, role: Role) -> bool {
        match self {
            TargetAudience::All => true,
            TargetAudience::Clients => role == Role::Client,
            TargetAudience::Executors => role == Role::Executor,
        }
    }
}

impl fmt::Display for TargetAudience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetAudience {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(TargetAudience::All),
            "clients" => Ok(TargetAudience::Clients),
            "executors" => Ok(TargetAudience::Executors),
            other => Err(DomainError::Validation(format!(
                "unknown target audience '{other}'"
            ))),
        }
    }
}

/// How the code reaches its users. Informational; redemption ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionMethod {
    Public,
    Direct,
    Campaign,
}

impl DistributionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistributionMethod::Public => "public",
            DistributionMethod::Direct => "direct",
            DistributionMethod::Campaign => "campaign",
        }
    }
}

impl fmt::Display for DistributionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistributionMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(DistributionMethod::Public),
            "direct" => Ok(DistributionMethod::Direct),
            "campaign" => Ok(DistributionMethod::Campaign),
            other => Err(DomainError::Validation(format!(
                "unknown distribution method '{other}'"
            ))),
        }
    }
}

/// Trim and upper-case a user-entered code
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

fn check_scale(field: &str, value: Decimal) -> Result<(), DomainError> {
    if value.normalize().scale() > VALUE_SCALE {
        return Err(DomainError::InvalidAmount(format!(
            "{field} allows at most {VALUE_SCALE} decimal places, got {value}"
        )));
    }
    Ok(())
}

pub fn generate_code() -> String {
    random_code(GENERATED_CODE_LEN)
}

/// Admin input for a new promo code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPromoCode {
    /// Explicit code; generated when absent
    pub code: Option<String>,
    pub promo_type: PromoType,
    pub bonus_amount: Option<Amount>,
    /// Percent (0, 100] or fixed coin amount, by type
    pub discount_value: Option<Decimal>,
    pub min_order_amount: Option<Decimal>,
    pub max_discount: Option<Amount>,
    pub usage_limit: Option<i32>,
    pub expires_at: DateTime<Utc>,
    pub target_audience: TargetAudience,
    pub distribution_method: DistributionMethod,
}

/// Result of a successful validation: what the redeemer gets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Benefit {
    pub promo_code_id: Uuid,
    pub code: String,
    pub benefit_type: PromoType,
    pub benefit_amount: Decimal,
    pub order_amount: Option<Decimal>,
    /// Uses left after this redemption, when limited
    pub remaining_uses: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoCode {
    pub id: Uuid,
    pub code: String,
    pub promo_type: PromoType,
    pub bonus_amount: Decimal,
    pub discount_value: Decimal,
    pub min_order_amount: Decimal,
    pub max_discount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub usage_count: i32,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub target_audience: TargetAudience,
    pub distribution_method: DistributionMethod,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl PromoCode {
    /// Validate admin input. `code` is the final text (explicit or generated).
    pub fn new(
        code: &str,
        new: &NewPromoCode,
        created_by: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let code = normalize_code(code);
        let len = code.chars().count();
        if !(MIN_CODE_LEN..=MAX_CODE_LEN).contains(&len) {
            return Err(DomainError::Validation(format!(
                "promo code must be {MIN_CODE_LEN}-{MAX_CODE_LEN} characters"
            )));
        }
        if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(DomainError::Validation(
                "promo code may only contain letters, digits and '-'".to_string(),
            ));
        }
        if new.expires_at <= now {
            return Err(DomainError::Validation(
                "expiry must be in the future".to_string(),
            ));
        }
        if let Some(limit) = new.usage_limit {
            if limit < 1 {
                return Err(DomainError::Validation(
                    "usage_limit must be at least 1".to_string(),
                ));
            }
        }

        let min_order_amount = new.min_order_amount.unwrap_or(Decimal::ZERO);
        if min_order_amount < Decimal::ZERO {
            return Err(DomainError::InvalidAmount(
                "min_order_amount cannot be negative".to_string(),
            ));
        }
        check_scale("min_order_amount", min_order_amount)?;

        let (bonus_amount, discount_value) = match new.promo_type {
            PromoType::Bonus => {
                let bonus = new.bonus_amount.ok_or_else(|| {
                    DomainError::InvalidAmount("bonus codes need a bonus_amount".to_string())
                })?;
                (bonus.value(), Decimal::ZERO)
            }
            PromoType::DiscountPercent => {
                let value = new.discount_value.unwrap_or(Decimal::ZERO);
                if value <= Decimal::ZERO || value > Decimal::ONE_HUNDRED {
                    return Err(DomainError::InvalidAmount(format!(
                        "discount percent must be in (0, 100], got {value}"
                    )));
                }
                check_scale("discount percent", value)?;
                (Decimal::ZERO, value)
            }
            PromoType::DiscountFixed => {
                let value = Amount::new(new.discount_value.unwrap_or(Decimal::ZERO))?;
                (Decimal::ZERO, value.value())
            }
        };

        Ok(Self {
            id: Uuid::new_v4(),
            code,
            promo_type: new.promo_type,
            bonus_amount,
            discount_value,
            min_order_amount,
            max_discount: new.max_discount.map(|m| m.value()),
            usage_limit: new.usage_limit,
            usage_count: 0,
            expires_at: new.expires_at,
            is_active: true,
            target_audience: new.target_audience,
            distribution_method: new.distribution_method,
            created_by,
            created_at: now,
        })
    }

    /// Run the redemption checks in order and compute the benefit, without
    /// consuming a use.
    pub fn evaluate(
        &self,
        role: Role,
        order_amount: Option<Amount>,
        now: DateTime<Utc>,
    ) -> Result<Benefit, DomainError> {
        if !self.is_active {
            return Err(DomainError::Inactive(self.code.clone()));
        }
        if now >= self.expires_at {
            return Err(DomainError::Expired {
                code: self.code.clone(),
                expired_at: self.expires_at,
            });
        }
        if let Some(limit) = self.usage_limit {
            if self.usage_count >= limit {
                return Err(DomainError::UsageLimitReached {
                    code: self.code.clone(),
                    limit,
                });
            }
        }

        let order_amount = order_amount.map(|a| a.value());
        if self.promo_type.is_discount() {
            let actual = order_amount.ok_or_else(|| {
                DomainError::InvalidAmount(format!(
                    "promo code {} needs an order amount",
                    self.code
                ))
            })?;
            if self.min_order_amount > Decimal::ZERO && actual < self.min_order_amount {
                return Err(DomainError::MinAmountNotMet {
                    required: self.min_order_amount,
                    actual,
                });
            }
        }

        if !self.target_audience.admits(role) {
            return Err(DomainError::NotEligible {
                code: self.code.clone(),
                audience: self.target_audience.to_string(),
            });
        }

        let benefit_amount = match (self.promo_type, order_amount) {
            (PromoType::Bonus, _) => self.bonus_amount,
            (PromoType::DiscountPercent, Some(order)) => {
                let raw = (order * self.discount_value / Decimal::ONE_HUNDRED).round_dp(2);
                match self.max_discount {
                    Some(cap) => raw.min(cap),
                    None => raw,
                }
            }
            (PromoType::DiscountFixed, Some(order)) => self.discount_value.min(order),
            (_, None) => Decimal::ZERO,
        }
        .max(Decimal::ZERO);

        Ok(Benefit {
            promo_code_id: self.id,
            code: self.code.clone(),
            benefit_type: self.promo_type,
            benefit_amount,
            order_amount,
            remaining_uses: self.usage_limit.map(|limit| limit - self.usage_count - 1),
        })
    }

    /// `evaluate` followed by the usage increment
    pub fn redeem(
        &mut self,
        role: Role,
        order_amount: Option<Amount>,
        now: DateTime<Utc>,
    ) -> Result<Benefit, DomainError> {
        let benefit = self.evaluate(role, order_amount, now)?;
        self.usage_count += 1;
        Ok(benefit)
    }
}

impl Aggregate for PromoCode {
    fn aggregate_type() -> &'static str {
        "promo_code"
    }

    fn id(&self) -> Uuid {
        self.id
    }
}
