//! Ban Aggregate
//!
//! Time-boxed restriction on one capability. Expiry is evaluated lazily
//! against the clock, so nothing has to run at `expires_at`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{DomainError, OperationContext};

use super::Aggregate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BanType {
    /// Cannot create orders
    OrderMute,
    /// Cannot open deposit-class transactions
    PaymentMute,
    /// Covers every capability
    AccountBlock,
}

impl BanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BanType::OrderMute => "order_mute",
            BanType::PaymentMute => "payment_mute",
            BanType::AccountBlock => "account_block",
        }
    }

    /// Whether a ban of this type denies `capability`
    pub fn covers(&self, capability: BanType) -> bool {
        *self == BanType::AccountBlock || *self == capability
    }
}

impl fmt::Display for BanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BanType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order_mute" => Ok(BanType::OrderMute),
            "payment_mute" => Ok(BanType::PaymentMute),
            "account_block" => Ok(BanType::AccountBlock),
            other => Err(DomainError::Validation(format!("unknown ban type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ban {
    pub id: Uuid,
    pub account_id: Uuid,
    pub ban_type: BanType,
    pub reason: Option<String>,
    pub issued_by: Uuid,
    pub duration_minutes: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Cleared by `lift`; expiry never touches it
    pub is_active: bool,
    pub lifted_by: Option<Uuid>,
    pub lifted_at: Option<DateTime<Utc>>,
}

impl Ban {
    pub fn issue(
        account_id: Uuid,
        ban_type: BanType,
        duration_minutes: i64,
        reason: Option<String>,
        ctx: &OperationContext,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        ctx.require_staff("issuing a ban")?;
        if duration_minutes <= 0 {
            return Err(DomainError::Validation(format!(
                "ban duration must be positive, got {duration_minutes} minutes"
            )));
        }
        if account_id == ctx.actor_id {
            return Err(DomainError::Validation(
                "staff cannot ban their own account".to_string(),
            ));
        }

        let expires_at = Duration::try_minutes(duration_minutes)
            .and_then(|d| now.checked_add_signed(d))
            .ok_or_else(|| {
                DomainError::Validation(format!(
                    "ban duration of {duration_minutes} minutes is out of range"
                ))
            })?;

        Ok(Self {
            id: Uuid::new_v4(),
            account_id,
            ban_type,
            reason: reason.filter(|r| !r.trim().is_empty()),
            issued_by: ctx.actor_id,
            duration_minutes,
            created_at: now,
            expires_at,
            is_active: true,
            lifted_by: None,
            lifted_at: None,
        })
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now < self.expires_at
    }

    /// Active and covering `capability`
    pub fn restricts(&self, capability: BanType, now: DateTime<Utc>) -> bool {
        self.is_active_at(now) && self.ban_type.covers(capability)
    }

    pub fn lift(&mut self, ctx: &OperationContext, now: DateTime<Utc>) -> Result<(), DomainError> {
        ctx.require_staff("lifting a ban")?;
        if !self.is_active {
            return Err(DomainError::invalid_transition(
                "lifted",
                "lifted",
                format!("ban {} was already lifted", self.id),
            ));
        }
        self.is_active = false;
        self.lifted_by = Some(ctx.actor_id);
        self.lifted_at = Some(now);
        Ok(())
    }

    pub fn to_restricted_error(&self) -> DomainError {
        DomainError::Restricted {
            ban_type: self.ban_type.to_string(),
            expires_at: self.expires_at,
        }
    }
}

/// The active ban denying `capability` that expires last, if any
pub fn find_restriction<'a, I>(bans: I, capability: BanType, now: DateTime<Utc>) -> Option<&'a Ban>
where
    I: IntoIterator<Item = &'a Ban>,
{
    bans.into_iter()
        .filter(|ban| ban.restricts(capability, now))
        .max_by_key(|ban| ban.expires_at)
}

impl Aggregate for Ban {
    fn aggregate_type() -> &'static str {
        "ban"
    }

    fn id(&self) -> Uuid {
        self.id
    }
}
