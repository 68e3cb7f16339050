//! Restriction Handler
//!
//! Issues, lifts and evaluates bans. Expiry is evaluated at read time against
//! the clock, so a ban stops restricting at `expires_at` with no job running.

use std::sync::Arc;
use uuid::Uuid;

use crate::aggregate::ban::find_restriction;
use crate::aggregate::{Aggregate, Ban, BanType};
use crate::audit::{AuditAction, AuditLog, AuditLogBuilder};
use crate::domain::{Clock, OperationContext};
use crate::error::AppResult;
use crate::store::Store;

use super::IssueBanCommand;

/// Handler for bans
#[derive(Clone)]
pub struct RestrictionHandler {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    audit: AuditLog,
}

impl RestrictionHandler {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, audit: AuditLog) -> Self {
        Self { store, clock, audit }
    }

    /// Ban an account from one capability, staff only
    pub async fn issue(&self, command: IssueBanCommand, context: &OperationContext) -> AppResult<Ban> {
        let now = self.clock.now();
        let ban = Ban::issue(
            command.account_id,
            command.ban_type,
            command.duration_minutes,
            command.reason,
            context,
            now,
        )?;

        self.store.insert_ban(&ban).await?;

        tracing::info!(
            ban_id = %ban.id,
            account_id = %ban.account_id,
            ban_type = %ban.ban_type,
            expires_at = %ban.expires_at,
            issued_by = %ban.issued_by,
            "Ban issued"
        );

        self.audit
            .append(
                AuditLogBuilder::new(AuditAction::BanIssued)
                    .target(Ban::aggregate_type(), ban.id)
                    .detail("account_id", ban.account_id)
                    .detail("ban_type", ban.ban_type)
                    .detail("duration_minutes", ban.duration_minutes)
                    .detail("expires_at", ban.expires_at)
                    .detail("reason", &ban.reason),
                context,
                now,
            )
            .await;

        Ok(ban)
    }

    /// Deactivate a ban early, staff only. History is retained.
    pub async fn lift(&self, ban_id: Uuid, context: &OperationContext) -> AppResult<Ban> {
        context.require_staff("lifting a ban")?;
        let now = self.clock.now();
        let ban = self.store.lift_ban(ban_id, context, now).await?;

        tracing::info!(
            ban_id = %ban.id,
            account_id = %ban.account_id,
            lifted_by = %context.actor_id,
            "Ban lifted"
        );

        self.audit
            .append(
                AuditLogBuilder::new(AuditAction::BanLifted)
                    .target(Ban::aggregate_type(), ban.id)
                    .detail("account_id", ban.account_id)
                    .detail("ban_type", ban.ban_type),
                context,
                now,
            )
            .await;

        Ok(ban)
    }

    /// Whether an active ban of `ban_type`, or an active account block,
    /// applies right now
    pub async fn is_restricted(&self, account_id: Uuid, ban_type: BanType) -> AppResult<bool> {
        Ok(self.blocking_ban(account_id, ban_type).await?.is_some())
    }

    /// `Restricted` carrying the blocking ban's type and expiry
    pub async fn ensure_unrestricted(&self, account_id: Uuid, ban_type: BanType) -> AppResult<()> {
        match self.blocking_ban(account_id, ban_type).await? {
            Some(ban) => {
                tracing::warn!(
                    %account_id,
                    capability = %ban_type,
                    ban_id = %ban.id,
                    "Restricted account attempted a gated action"
                );
                Err(ban.to_restricted_error().into())
            }
            None => Ok(()),
        }
    }

    /// Bans in force right now
    pub async fn active_bans(&self, account_id: Uuid) -> AppResult<Vec<Ban>> {
        let now = self.clock.now();
        let bans = self.store.account_bans(account_id).await?;
        Ok(bans.into_iter().filter(|b| b.is_active_at(now)).collect())
    }

    /// Every ban ever issued to the account, newest first
    pub async fn history(&self, account_id: Uuid) -> AppResult<Vec<Ban>> {
        Ok(self.store.account_bans(account_id).await?)
    }

    async fn blocking_ban(&self, account_id: Uuid, ban_type: BanType) -> AppResult<Option<Ban>> {
        let now = self.clock.now();
        let bans = self.store.account_bans(account_id).await?;
        Ok(find_restriction(&bans, ban_type, now).cloned())
    }
}
