//! Audit Log
//!
//! Append-only, tamper-evident record of privileged and money-moving
//! operations. Entries form a SHA-256 hash chain: each entry's hash covers
//! its own fields plus the previous entry's hash.
//!
//! Writes are best-effort. A failed append is logged on the `audit` target
//! and never fails the operation being audited.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::OperationContext;
use crate::store::{AuditStore, StoreError};

/// Entries fetched per page while walking the chain
const VERIFY_PAGE_SIZE: i64 = 1000;

/// `previous_hash` of the first entry
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Persisted audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub sequence_number: i64,
    pub actor_account_id: Uuid,
    pub action: String,
    pub target_id: Option<Uuid>,
    pub target_type: Option<String>,
    pub details: Option<serde_json::Value>,
    pub correlation_id: Option<Uuid>,
    pub previous_hash: String,
    pub current_hash: String,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Recompute the hash from the entry's own fields
    pub fn compute_hash(&self) -> String {
        let hash_input = format!(
            "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
            self.id,
            self.sequence_number,
            self.actor_account_id,
            self.action,
            self.target_id.map(|u| u.to_string()).unwrap_or_default(),
            self.target_type.as_deref().unwrap_or_default(),
            self.details.as_ref().map(|v| v.to_string()).unwrap_or_default(),
            self.correlation_id.map(|u| u.to_string()).unwrap_or_default(),
            self.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.previous_hash,
        );
        sha256_hex(&hash_input)
    }
}

/// An entry that has not been placed in the chain yet
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub id: Uuid,
    pub actor_account_id: Uuid,
    pub action: String,
    pub target_id: Option<Uuid>,
    pub target_type: Option<String>,
    pub details: Option<serde_json::Value>,
    pub correlation_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Place the record after `previous_hash` at `sequence_number`
    pub fn seal(self, sequence_number: i64, previous_hash: &str) -> AuditLogEntry {
        let mut entry = AuditLogEntry {
            id: self.id,
            sequence_number,
            actor_account_id: self.actor_account_id,
            action: self.action,
            target_id: self.target_id,
            target_type: self.target_type,
            details: self.details,
            correlation_id: self.correlation_id,
            previous_hash: previous_hash.to_string(),
            current_hash: String::new(),
            created_at: self.created_at,
        };
        entry.current_hash = entry.compute_hash();
        entry
    }
}

/// Audit action types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    AccountRegistered,
    RoleChanged,
    TransactionCompleted,
    TransactionRejected,
    ManualAdjustment,
    OrderCreated,
    OrderCancelled,
    OrderForced,
    PriorityFeeUpdated,
    PromoCreated,
    PromoRedeemed,
    PromoStatusChanged,
    BanIssued,
    BanLifted,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::AccountRegistered => "account.registered",
            AuditAction::RoleChanged => "account.role_changed",
            AuditAction::TransactionCompleted => "transaction.completed",
            AuditAction::TransactionRejected => "transaction.rejected",
            AuditAction::ManualAdjustment => "transaction.manual_adjustment",
            AuditAction::OrderCreated => "order.created",
            AuditAction::OrderCancelled => "order.cancelled",
            AuditAction::OrderForced => "order.forced_transition",
            AuditAction::PriorityFeeUpdated => "order.priority_fee_updated",
            AuditAction::PromoCreated => "promo.created",
            AuditAction::PromoRedeemed => "promo.redeemed",
            AuditAction::PromoStatusChanged => "promo.status_changed",
            AuditAction::BanIssued => "ban.issued",
            AuditAction::BanLifted => "ban.lifted",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Builder for creating audit log entries
#[derive(Debug, Clone)]
pub struct AuditLogBuilder {
    action: String,
    target_type: Option<String>,
    target_id: Option<Uuid>,
    details: serde_json::Map<String, serde_json::Value>,
}

impl AuditLogBuilder {
    pub fn new(action: AuditAction) -> Self {
        Self {
            action: action.as_str().to_string(),
            target_type: None,
            target_id: None,
            details: serde_json::Map::new(),
        }
    }

    /// Set the target type and ID
    pub fn target(mut self, target_type: &str, target_id: Uuid) -> Self {
        self.target_type = Some(target_type.to_string());
        self.target_id = Some(target_id);
        self
    }

    /// Add one detail field. Values that fail to serialize are dropped.
    pub fn detail<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.details.insert(key.to_string(), value);
        }
        self
    }

    pub fn before_state<T: Serialize>(self, state: &T) -> Self {
        self.detail("before", state)
    }

    pub fn after_state<T: Serialize>(self, state: &T) -> Self {
        self.detail("after", state)
    }

    /// Stamp the record with the acting account and time. Timestamps are
    /// truncated to microseconds so the hash survives a database round trip.
    pub fn record(self, context: &OperationContext, now: DateTime<Utc>) -> AuditRecord {
        AuditRecord {
            id: Uuid::new_v4(),
            actor_account_id: context.actor_id,
            action: self.action,
            target_id: self.target_id,
            target_type: self.target_type,
            details: (!self.details.is_empty()).then(|| serde_json::Value::Object(self.details)),
            correlation_id: context.correlation_id,
            created_at: now.trunc_subsecs(6),
        }
    }
}

/// Audit log service
#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn AuditStore>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Append an entry, best-effort. Failures are logged and swallowed.
    pub async fn append(
        &self,
        builder: AuditLogBuilder,
        context: &OperationContext,
        now: DateTime<Utc>,
    ) -> Option<AuditLogEntry> {
        let action = builder.action.clone();
        match self.try_append(builder, context, now).await {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::error!(
                    target: "audit",
                    action = %action,
                    actor_id = %context.actor_id,
                    error = %e,
                    "Failed to write audit log entry"
                );
                None
            }
        }
    }

    /// Append an entry, surfacing the failure
    pub async fn try_append(
        &self,
        builder: AuditLogBuilder,
        context: &OperationContext,
        now: DateTime<Utc>,
    ) -> Result<AuditLogEntry, AuditLogError> {
        let entry = self.store.append_audit(builder.record(context, now)).await?;

        tracing::debug!(
            audit_id = %entry.id,
            sequence_number = entry.sequence_number,
            action = %entry.action,
            "Audit log entry created"
        );

        Ok(entry)
    }

    /// Verify the hash chain from the genesis entry. `None` walks the whole
    /// chain page by page; `Some(n)` stops after the first `n` entries.
    pub async fn verify_chain(&self, limit: Option<i64>) -> Result<ChainVerificationResult, AuditLogError> {
        let mut walk = ChainWalk::new();
        let mut after_sequence = 0;

        loop {
            let page_size = match limit {
                Some(limit) => (limit - walk.checked as i64).min(VERIFY_PAGE_SIZE),
                None => VERIFY_PAGE_SIZE,
            };
            if page_size <= 0 {
                break;
            }

            let page = self.store.audit_chain(after_sequence, page_size).await?;
            for entry in &page {
                if let Some(broken) = walk.check(entry) {
                    return Ok(broken);
                }
            }

            match page.last() {
                Some(last) if page.len() as i64 == page_size => after_sequence = last.sequence_number,
                _ => break,
            }
        }

        Ok(walk.finish())
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        Ok(self.store.recent_audit(limit).await?)
    }

    pub async fn by_actor(&self, actor: Uuid, limit: i64) -> Result<Vec<AuditLogEntry>, AuditLogError> {
        Ok(self.store.audit_by_actor(actor, limit).await?)
    }
}

/// Result of hash chain verification
#[derive(Debug, Clone, PartialEq)]
pub struct ChainVerificationResult {
    pub is_valid: bool,
    pub entries_checked: u64,
    pub first_invalid_entry: Option<Uuid>,
    pub expected_hash: Option<String>,
    pub actual_hash: Option<String>,
}

/// Walk entries in sequence order and report the first broken link
pub fn verify_entries(entries: &[AuditLogEntry]) -> ChainVerificationResult {
    let mut walk = ChainWalk::new();
    for entry in entries {
        if let Some(broken) = walk.check(entry) {
            return broken;
        }
    }
    walk.finish()
}

/// Chain verification state carried across pages
struct ChainWalk {
    previous_hash: String,
    checked: u64,
}

impl ChainWalk {
    fn new() -> Self {
        Self {
            previous_hash: GENESIS_HASH.to_string(),
            checked: 0,
        }
    }

    /// Check the next entry; `Some` when the chain breaks here
    fn check(&mut self, entry: &AuditLogEntry) -> Option<ChainVerificationResult> {
        self.checked += 1;

        if entry.previous_hash != self.previous_hash {
            return Some(self.broken(entry, self.previous_hash.clone(), entry.previous_hash.clone()));
        }

        let calculated_hash = entry.compute_hash();
        if calculated_hash != entry.current_hash {
            return Some(self.broken(entry, calculated_hash, entry.current_hash.clone()));
        }

        self.previous_hash = entry.current_hash.clone();
        None
    }

    fn broken(&self, entry: &AuditLogEntry, expected: String, actual: String) -> ChainVerificationResult {
        ChainVerificationResult {
            is_valid: false,
            entries_checked: self.checked,
            first_invalid_entry: Some(entry.id),
            expected_hash: Some(expected),
            actual_hash: Some(actual),
        }
    }

    fn finish(self) -> ChainVerificationResult {
        ChainVerificationResult {
            is_valid: true,
            entries_checked: self.checked,
            first_invalid_entry: None,
            expected_hash: None,
            actual_hash: None,
        }
    }
}

/// Calculate SHA-256 hash and return as hex string
fn sha256_hex(input: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Audit log errors
#[derive(Debug, thiserror::Error)]
pub enum AuditLogError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;

    fn chain(n: usize) -> Vec<AuditLogEntry> {
        let ctx = OperationContext::new(Uuid::new_v4(), Role::Admin);
        let mut previous = GENESIS_HASH.to_string();
        (0..n)
            .map(|i| {
                let entry = AuditLogBuilder::new(AuditAction::BanIssued)
                    .target("ban", Uuid::new_v4())
                    .detail("duration_minutes", 60 + i)
                    .record(&ctx, Utc::now())
                    .seal(i as i64 + 1, &previous);
                previous = entry.current_hash.clone();
                entry
            })
            .collect()
    }

    #[test]
    fn test_audit_action_as_str() {
        assert_eq!(AuditAction::OrderForced.as_str(), "order.forced_transition");
        assert_eq!(AuditAction::PromoRedeemed.as_str(), "promo.redeemed");
        assert_eq!(AuditAction::BanLifted.to_string(), "ban.lifted");
    }

    #[test]
    fn test_builder_collects_details() {
        let ctx = OperationContext::system().with_correlation_id(Uuid::new_v4());
        let record = AuditLogBuilder::new(AuditAction::RoleChanged)
            .target("account", Uuid::new_v4())
            .before_state(&Role::Client)
            .after_state(&Role::Moderator)
            .record(&ctx, Utc::now());

        let details = record.details.unwrap();
        assert_eq!(details["before"], "client");
        assert_eq!(details["after"], "moderator");
        assert_eq!(record.correlation_id, ctx.correlation_id);
        assert_eq!(record.target_type.as_deref(), Some("account"));
    }

    #[test]
    fn test_empty_details_are_omitted() {
        let record = AuditLogBuilder::new(AuditAction::AccountRegistered)
            .record(&OperationContext::system(), Utc::now());
        assert!(record.details.is_none());
    }

    #[test]
    fn test_sha256_hex() {
        let hash = sha256_hex("test input");
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_intact_chain_verifies() {
        let entries = chain(5);
        let result = verify_entries(&entries);
        assert!(result.is_valid);
        assert_eq!(result.entries_checked, 5);
        assert!(verify_entries(&[]).is_valid);
    }

    #[test]
    fn test_tampered_entry_detected() {
        let mut entries = chain(4);
        entries[2].action = "ban.lifted".to_string();

        let result = verify_entries(&entries);
        assert!(!result.is_valid);
        assert_eq!(result.first_invalid_entry, Some(entries[2].id));
        assert_eq!(result.entries_checked, 3);
    }

    #[tokio::test]
    async fn test_verify_chain_walks_past_first_page() {
        let store = Arc::new(crate::store::MemoryStore::new());
        let audit = AuditLog::new(store);
        let ctx = OperationContext::system();
        let total = VERIFY_PAGE_SIZE + 5;
        for _ in 0..total {
            audit
                .try_append(AuditLogBuilder::new(AuditAction::PromoRedeemed), &ctx, Utc::now())
                .await
                .unwrap();
        }

        let full = audit.verify_chain(None).await.unwrap();
        assert!(full.is_valid);
        assert_eq!(full.entries_checked, total as u64);

        let partial = audit.verify_chain(Some(3)).await.unwrap();
        assert!(partial.is_valid);
        assert_eq!(partial.entries_checked, 3);
    }

    #[test]
    fn test_broken_link_detected() {
        let mut entries = chain(3);
        entries.remove(1);

        let result = verify_entries(&entries);
        assert!(!result.is_valid);
        assert_eq!(result.first_invalid_entry, Some(entries[1].id));
    }
}
