//! Order Aggregate
//!
//! The order state machine:
//!
//! ```text
//! pending → accepted → in_progress → review → completed
//!                                      ↕
//!                                   revision
//! pending / accepted / in_progress → cancelled
//! ```
//!
//! Every ordinary transition is role-gated here. The staff override
//! (`force_status`) is a separate method so the table above stays the only
//! path for everyone else.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{Amount, DomainError, OperationContext};

use super::{random_code, Aggregate};

const MAX_TITLE_CHARS: usize = 200;
/// Decimal places stored for the commission rate
pub const COMMISSION_RATE_SCALE: u32 = 4;

// =========================================================================
// Priority and fee table
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(DomainError::Validation(format!("unknown priority '{other}'"))),
        }
    }
}

/// Fee debited from the client when an order is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityFeeSchedule {
    pub normal: Amount,
    pub high: Amount,
    pub urgent: Amount,
}

impl PriorityFeeSchedule {
    pub fn fee_for(&self, priority: Priority) -> Amount {
        match priority {
            Priority::Normal => self.normal,
            Priority::High => self.high,
            Priority::Urgent => self.urgent,
        }
    }

    pub fn set_fee(&mut self, priority: Priority, fee: Amount) {
        match priority {
            Priority::Normal => self.normal = fee,
            Priority::High => self.high = fee,
            Priority::Urgent => self.urgent = fee,
        }
    }
}

impl Default for PriorityFeeSchedule {
    fn default() -> Self {
        Self {
            normal: Amount::whole_coins(15),
            high: Amount::whole_coins(30),
            urgent: Amount::whole_coins(55),
        }
    }
}

// =========================================================================
// Duplicate-submission guard
// =========================================================================

/// Heuristic that blocks accidental double submission: two titles match when
/// the leading `prefix_chars` characters of either one (trimmed,
/// case-insensitive) occur inside the other. A title shorter than
/// `prefix_chars` only matches as whole words, so "Art" does not block
/// "Start a cooking blog".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGuard {
    pub prefix_chars: usize,
}

impl DuplicateGuard {
    pub fn new(prefix_chars: usize) -> Self {
        Self { prefix_chars }
    }

    fn prefix(&self, title: &str) -> String {
        title
            .trim()
            .to_lowercase()
            .chars()
            .take(self.prefix_chars)
            .collect()
    }

    pub fn is_duplicate(&self, candidate: &str, existing: &str) -> bool {
        if self.prefix_chars == 0 {
            return false;
        }

        let candidate_prefix = self.prefix(candidate);
        let existing_prefix = self.prefix(existing);
        if candidate_prefix.is_empty() || existing_prefix.is_empty() {
            return false;
        }

        let candidate_full = candidate.trim().to_lowercase();
        let existing_full = existing.trim().to_lowercase();

        self.occurs_in(&candidate_prefix, &existing_full)
            || self.occurs_in(&existing_prefix, &candidate_full)
    }

    fn occurs_in(&self, prefix: &str, title: &str) -> bool {
        if prefix.chars().count() >= self.prefix_chars {
            return title.contains(prefix);
        }

        title.match_indices(prefix).any(|(start, matched)| {
            let before = title[..start].chars().next_back();
            let after = title[start + matched.len()..].chars().next();
            !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
        })
    }

    /// First active order whose title overlaps the candidate title
    pub fn find_duplicate<'a, I>(&self, candidate: &str, orders: I) -> Option<&'a Order>
    where
        I: IntoIterator<Item = &'a Order>,
    {
        orders
            .into_iter()
            .filter(|order| order.status.is_active())
            .find(|order| self.is_duplicate(candidate, &order.title))
    }
}

impl Default for DuplicateGuard {
    fn default() -> Self {
        Self::new(15)
    }
}

// =========================================================================
// Status
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Accepted,
    InProgress,
    Review,
    Revision,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Accepted => "accepted",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Review => "review",
            OrderStatus::Revision => "revision",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// The ordinary transition table
    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (Pending, Accepted)
                | (Accepted, InProgress)
                | (InProgress, Review)
                | (Review, Completed)
                | (Review, Revision)
                | (Revision, Review)
                | (Pending, Cancelled)
                | (Accepted, Cancelled)
                | (InProgress, Cancelled)
        )
    }

    /// Statuses scanned by the duplicate guard
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Accepted | OrderStatus::InProgress
        )
    }

    /// Work statuses whose next ordinary step is taken by the executor
    fn needs_executor(&self) -> bool {
        matches!(
            self,
            OrderStatus::Accepted
                | OrderStatus::InProgress
                | OrderStatus::Review
                | OrderStatus::Revision
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "accepted" => Ok(OrderStatus::Accepted),
            "in_progress" => Ok(OrderStatus::InProgress),
            "review" => Ok(OrderStatus::Review),
            "revision" => Ok(OrderStatus::Revision),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::Validation(format!(
                "unknown order status '{other}'"
            ))),
        }
    }
}

// =========================================================================
// Order
// =========================================================================

/// Client-supplied part of a new order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub title: String,
    pub description: String,
    pub price: Amount,
    pub priority: Priority,
    pub people_needed: i32,
    pub deadline: Option<DateTime<Utc>>,
    pub requirements: serde_json::Value,
    /// Falls back to the platform default when absent
    pub max_revisions: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub title: String,
    pub description: String,
    pub price: Amount,
    pub status: OrderStatus,
    pub priority: Priority,
    pub client_id: Uuid,
    pub executor_id: Option<Uuid>,
    pub people_needed: i32,
    pub people_accepted: i32,
    pub deadline: Option<DateTime<Utc>>,
    pub requirements: serde_json::Value,
    pub revision_count: i32,
    pub max_revisions: i32,
    pub escrow_amount: Option<Decimal>,
    pub commission_rate: Decimal,
    /// Priority fee debited at creation
    pub priority_fee: Amount,
    pub platform_fee: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Build a pending order. The fee debit happens in the store, in the same
    /// atomic unit as the insert.
    pub fn create(
        client_id: Uuid,
        new: NewOrder,
        priority_fee: Amount,
        commission_rate: Decimal,
        default_max_revisions: i32,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let title = new.title.trim().to_string();
        if title.is_empty() {
            return Err(DomainError::Validation("order title is empty".to_string()));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(DomainError::Validation(format!(
                "order title exceeds {MAX_TITLE_CHARS} characters"
            )));
        }
        if new.people_needed < 1 {
            return Err(DomainError::Validation(
                "people_needed must be at least 1".to_string(),
            ));
        }
        let max_revisions = new.max_revisions.unwrap_or(default_max_revisions);
        if max_revisions < 0 {
            return Err(DomainError::Validation(
                "max_revisions cannot be negative".to_string(),
            ));
        }
        if let Some(deadline) = new.deadline {
            if deadline <= now {
                return Err(DomainError::Validation(
                    "deadline must be in the future".to_string(),
                ));
            }
        }
        if commission_rate < Decimal::ZERO || commission_rate > Decimal::ONE {
            return Err(DomainError::Validation(format!(
                "commission rate {commission_rate} is outside [0, 1]"
            )));
        }
        if commission_rate.normalize().scale() > COMMISSION_RATE_SCALE {
            return Err(DomainError::Validation(format!(
                "commission rate {commission_rate} has more than {COMMISSION_RATE_SCALE} decimal places"
            )));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            order_number: Self::generate_order_number(now),
            title,
            description: new.description,
            price: new.price,
            status: OrderStatus::Pending,
            priority: new.priority,
            client_id,
            executor_id: None,
            people_needed: new.people_needed,
            people_accepted: 0,
            deadline: new.deadline,
            requirements: new.requirements,
            revision_count: 0,
            max_revisions,
            escrow_amount: None,
            commission_rate,
            priority_fee,
            platform_fee: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// `ORD-YYYYMMDD-XXXXXX`
    pub fn generate_order_number(now: DateTime<Utc>) -> String {
        format!("ORD-{}-{}", now.format("%Y%m%d"), random_code(6))
    }

    pub fn is_full(&self) -> bool {
        self.people_accepted >= self.people_needed
    }

    pub fn remaining_slots(&self) -> i32 {
        (self.people_needed - self.people_accepted).max(0)
    }

    fn is_client(&self, ctx: &OperationContext) -> bool {
        ctx.actor_id == self.client_id
    }

    fn is_executor(&self, ctx: &OperationContext) -> bool {
        self.executor_id == Some(ctx.actor_id)
    }

    fn require_client(&self, ctx: &OperationContext, action: &str) -> Result<(), DomainError> {
        if self.is_client(ctx) {
            Ok(())
        } else {
            Err(DomainError::unauthorized(format!(
                "only the client of {} may {action}",
                self.order_number
            )))
        }
    }

    fn require_executor(&self, ctx: &OperationContext, action: &str) -> Result<(), DomainError> {
        if self.is_executor(ctx) {
            Ok(())
        } else {
            Err(DomainError::unauthorized(format!(
                "only the assigned executor of {} may {action}",
                self.order_number
            )))
        }
    }

    fn transition(&mut self, to: OrderStatus, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.status.can_transition_to(to) {
            return Err(DomainError::invalid_transition(
                self.status,
                to,
                "not allowed by the order state machine",
            ));
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    // =========================================================================
    // Ordinary transitions
    // =========================================================================

    /// Accept one participant. The first acceptance assigns the executor and
    /// moves the order out of `pending`.
    pub fn accept_participant(
        &mut self,
        executor_id: Uuid,
        ctx: &OperationContext,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.is_client(ctx) && !ctx.is_staff() {
            return Err(DomainError::unauthorized(format!(
                "only the client or staff may accept participants for {}",
                self.order_number
            )));
        }
        if executor_id == self.client_id {
            return Err(DomainError::Validation(
                "a client cannot execute their own order".to_string(),
            ));
        }
        if !matches!(self.status, OrderStatus::Pending | OrderStatus::Accepted) {
            return Err(DomainError::invalid_transition(
                self.status,
                OrderStatus::Accepted,
                "participants can only join pending or accepted orders",
            ));
        }
        if self.is_full() {
            return Err(DomainError::invalid_transition(
                self.status,
                OrderStatus::Accepted,
                format!("all {} places are taken", self.people_needed),
            ));
        }

        if self.status == OrderStatus::Pending {
            self.transition(OrderStatus::Accepted, now)?;
        }
        if self.executor_id.is_none() {
            self.executor_id = Some(executor_id);
        }
        self.people_accepted += 1;
        self.updated_at = now;
        Ok(())
    }

    pub fn start(&mut self, ctx: &OperationContext, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.require_executor(ctx, "start work")?;
        self.transition(OrderStatus::InProgress, now)
    }

    /// `in_progress → review` and `revision → review`
    pub fn submit_for_review(
        &mut self,
        ctx: &OperationContext,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.require_executor(ctx, "submit work for review")?;
        self.transition(OrderStatus::Review, now)
    }

    pub fn complete(&mut self, ctx: &OperationContext, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.require_client(ctx, "accept the work")?;
        self.transition(OrderStatus::Completed, now)?;
        self.platform_fee = Some(self.compute_platform_fee());
        Ok(())
    }

    /// `review → revision`, bounded by `max_revisions`
    pub fn request_revision(
        &mut self,
        ctx: &OperationContext,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.require_client(ctx, "request a revision")?;
        if !self.status.can_transition_to(OrderStatus::Revision) {
            return Err(DomainError::invalid_transition(
                self.status,
                OrderStatus::Revision,
                "revisions can only be requested during review",
            ));
        }
        if self.revision_count >= self.max_revisions {
            return Err(DomainError::invalid_transition(
                self.status,
                OrderStatus::Revision,
                format!(
                    "revision limit of {} reached; the order can only be completed",
                    self.max_revisions
                ),
            ));
        }

        self.transition(OrderStatus::Revision, now)?;
        self.revision_count += 1;
        Ok(())
    }

    /// Client or staff may cancel a pending order; once accepted, only staff
    pub fn cancel(&mut self, ctx: &OperationContext, now: DateTime<Utc>) -> Result<(), DomainError> {
        let allowed = match self.status {
            OrderStatus::Pending => self.is_client(ctx) || ctx.is_staff(),
            OrderStatus::Accepted | OrderStatus::InProgress => ctx.is_staff(),
            _ => true,
        };
        if !allowed {
            return Err(DomainError::unauthorized(format!(
                "cancelling {} while {} requires staff",
                self.order_number, self.status
            )));
        }
        self.transition(OrderStatus::Cancelled, now)
    }

    // =========================================================================
    // Staff override
    // =========================================================================

    /// Move to any other status regardless of the table. Returns the previous
    /// status. The caller must record the override in the audit log.
    pub fn force_status(
        &mut self,
        target: OrderStatus,
        ctx: &OperationContext,
        now: DateTime<Utc>,
    ) -> Result<OrderStatus, DomainError> {
        ctx.require_staff("forcing an order transition")?;
        if target == self.status {
            return Err(DomainError::invalid_transition(
                self.status,
                target,
                "order is already in the target status",
            ));
        }

        if target.needs_executor() && self.executor_id.is_none() {
            return Err(DomainError::invalid_transition(
                self.status,
                target,
                "no executor is assigned",
            ));
        }

        let previous = self.status;
        self.status = target;
        if target == OrderStatus::Pending {
            self.executor_id = None;
            self.people_accepted = 0;
        }
        if target == OrderStatus::Completed && self.platform_fee.is_none() {
            self.platform_fee = Some(self.compute_platform_fee());
        }
        self.updated_at = now;
        Ok(previous)
    }

    fn compute_platform_fee(&self) -> Decimal {
        (self.price.value() * self.commission_rate).round_dp(2)
    }
}

impl Aggregate for Order {
    fn aggregate_type() -> &'static str {
        "order"
    }

    fn id(&self) -> Uuid {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;

    fn new_order(title: &str) -> NewOrder {
        NewOrder {
            title: title.to_string(),
            description: "Logo in vector format".to_string(),
            price: Amount::from_integer(200).unwrap(),
            priority: Priority::Normal,
            people_needed: 1,
            deadline: None,
            requirements: serde_json::json!({ "format": "svg" }),
            max_revisions: Some(3),
        }
    }

    fn order_for(client: Uuid) -> Order {
        Order::create(
            client,
            new_order("Design a company logo"),
            Amount::from_integer(15).unwrap(),
            Decimal::new(10, 2),
            3,
            Utc::now(),
        )
        .unwrap()
    }

    fn ctx(actor: Uuid, role: Role) -> OperationContext {
        OperationContext::new(actor, role)
    }

    fn in_review(client: Uuid, executor: Uuid) -> Order {
        let mut order = order_for(client);
        order
            .accept_participant(executor, &ctx(client, Role::Client), Utc::now())
            .unwrap();
        order.start(&ctx(executor, Role::Executor), Utc::now()).unwrap();
        order
            .submit_for_review(&ctx(executor, Role::Executor), Utc::now())
            .unwrap();
        order
    }

    #[test]
    fn test_transition_table() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Accepted));
        assert!(Revision.can_transition_to(Review));
        assert!(InProgress.can_transition_to(Cancelled));
        assert!(!Review.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Review));
        assert!(!Pending.can_transition_to(InProgress));
    }

    #[test]
    fn test_create_validates() {
        let client = Uuid::new_v4();
        let fee = Amount::from_integer(15).unwrap();

        let empty = Order::create(client, new_order("   "), fee, Decimal::ZERO, 3, Utc::now());
        assert!(matches!(empty, Err(DomainError::Validation(_))));

        let mut nobody = new_order("Translate a contract");
        nobody.people_needed = 0;
        assert!(Order::create(client, nobody, fee, Decimal::ZERO, 3, Utc::now()).is_err());

        let order = order_for(client);
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.executor_id.is_none());
        assert!(order.order_number.starts_with("ORD-"));
        assert_eq!(order.order_number.len(), "ORD-20260101-ABC123".len());
    }

    #[test]
    fn test_happy_path_to_completion() {
        let client = Uuid::new_v4();
        let executor = Uuid::new_v4();
        let mut order = in_review(client, executor);

        assert_eq!(order.executor_id, Some(executor));
        order.complete(&ctx(client, Role::Client), Utc::now()).unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.platform_fee, Some(Decimal::new(2000, 2)));
    }

    #[test]
    fn test_only_executor_drives_work() {
        let client = Uuid::new_v4();
        let executor = Uuid::new_v4();
        let mut order = order_for(client);
        order
            .accept_participant(executor, &ctx(client, Role::Client), Utc::now())
            .unwrap();

        let by_client = order.start(&ctx(client, Role::Client), Utc::now());
        assert!(matches!(by_client, Err(DomainError::Unauthorized(_))));

        let by_admin = order.start(&ctx(Uuid::new_v4(), Role::Admin), Utc::now());
        assert!(matches!(by_admin, Err(DomainError::Unauthorized(_))));
    }

    #[test]
    fn test_revision_limit() {
        let client = Uuid::new_v4();
        let executor = Uuid::new_v4();
        let mut order = in_review(client, executor);

        for _ in 0..3 {
            order
                .request_revision(&ctx(client, Role::Client), Utc::now())
                .unwrap();
            order
                .submit_for_review(&ctx(executor, Role::Executor), Utc::now())
                .unwrap();
        }

        let fourth = order.request_revision(&ctx(client, Role::Client), Utc::now());
        assert!(matches!(fourth, Err(DomainError::InvalidTransition { .. })));
        assert_eq!(order.revision_count, 3);
        assert_eq!(order.status, OrderStatus::Review);
    }

    #[test]
    fn test_participants_bounded() {
        let client = Uuid::new_v4();
        let mut order = order_for(client);
        order.people_needed = 2;

        order
            .accept_participant(Uuid::new_v4(), &ctx(client, Role::Client), Utc::now())
            .unwrap();
        let lead = order.executor_id;
        order
            .accept_participant(Uuid::new_v4(), &ctx(client, Role::Client), Utc::now())
            .unwrap();

        assert!(order.is_full());
        assert_eq!(order.remaining_slots(), 0);
        assert_eq!(order.executor_id, lead);

        let third = order.accept_participant(Uuid::new_v4(), &ctx(client, Role::Client), Utc::now());
        assert!(matches!(third, Err(DomainError::InvalidTransition { .. })));
        assert_eq!(order.people_accepted, 2);
    }

    #[test]
    fn test_cancel_gating() {
        let client = Uuid::new_v4();
        let executor = Uuid::new_v4();

        let mut pending = order_for(client);
        pending.cancel(&ctx(client, Role::Client), Utc::now()).unwrap();
        assert_eq!(pending.status, OrderStatus::Cancelled);

        let mut accepted = order_for(client);
        accepted
            .accept_participant(executor, &ctx(client, Role::Client), Utc::now())
            .unwrap();
        assert!(matches!(
            accepted.cancel(&ctx(client, Role::Client), Utc::now()),
            Err(DomainError::Unauthorized(_))
        ));
        accepted
            .cancel(&ctx(Uuid::new_v4(), Role::Moderator), Utc::now())
            .unwrap();

        let mut review = in_review(client, executor);
        assert!(matches!(
            review.cancel(&ctx(Uuid::new_v4(), Role::Admin), Utc::now()),
            Err(DomainError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_force_status_is_staff_only() {
        let client = Uuid::new_v4();
        let mut order = order_for(client);

        assert!(matches!(
            order.force_status(OrderStatus::Completed, &ctx(client, Role::Client), Utc::now()),
            Err(DomainError::Unauthorized(_))
        ));

        let previous = order
            .force_status(OrderStatus::Completed, &ctx(Uuid::new_v4(), Role::Admin), Utc::now())
            .unwrap();
        assert_eq!(previous, OrderStatus::Pending);
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.platform_fee, Some(Decimal::new(2000, 2)));
    }

    #[test]
    fn test_force_status_into_work_needs_an_executor() {
        let client = Uuid::new_v4();
        let admin = ctx(Uuid::new_v4(), Role::Admin);

        for target in [
            OrderStatus::Accepted,
            OrderStatus::InProgress,
            OrderStatus::Review,
            OrderStatus::Revision,
        ] {
            let mut order = order_for(client);
            assert!(matches!(
                order.force_status(target, &admin, Utc::now()),
                Err(DomainError::InvalidTransition { .. })
            ));
            assert_eq!(order.status, OrderStatus::Pending);
        }

        let executor = Uuid::new_v4();
        let mut order = in_review(client, executor);
        order.force_status(OrderStatus::InProgress, &admin, Utc::now()).unwrap();
        order.submit_for_review(&ctx(executor, Role::Executor), Utc::now()).unwrap();
        assert_eq!(order.status, OrderStatus::Review);
    }

    #[test]
    fn test_acceptance_assigns_missing_executor() {
        let client = Uuid::new_v4();
        let executor = Uuid::new_v4();
        let mut order = order_for(client);
        order.people_needed = 2;
        order.status = OrderStatus::Accepted;

        order
            .accept_participant(executor, &ctx(client, Role::Client), Utc::now())
            .unwrap();
        assert_eq!(order.executor_id, Some(executor));
        assert_eq!(order.people_accepted, 1);

        order.start(&ctx(executor, Role::Executor), Utc::now()).unwrap();
        assert_eq!(order.status, OrderStatus::InProgress);
    }

    #[test]
    fn test_duplicate_guard() {
        let guard = DuplicateGuard::default();
        assert!(guard.is_duplicate("Design a company logo", "design a company logo for my bakery"));
        assert!(guard.is_duplicate("  DESIGN A COMPANY LOGO  ", "Design a company logo"));
        assert!(!guard.is_duplicate("Translate a contract", "Design a company logo"));
        assert!(!DuplicateGuard::new(0).is_duplicate("same", "same"));
    }

    #[test]
    fn test_short_titles_match_whole_words_only() {
        let guard = DuplicateGuard::default();
        assert!(!guard.is_duplicate("Start a cooking blog", "Art"));
        assert!(!guard.is_duplicate("Art", "Start a cooking blog"));
        assert!(!guard.is_duplicate("Logo", "Logotype refresh for a bakery"));

        assert!(guard.is_duplicate("Art", "  ART "));
        assert!(guard.is_duplicate("Logo", "logo for a bakery"));
        assert!(guard.is_duplicate("New logo, please", "Logo"));
    }

    #[test]
    fn test_find_duplicate_ignores_inactive() {
        let guard = DuplicateGuard::default();
        let client = Uuid::new_v4();
        let mut done = order_for(client);
        done.status = OrderStatus::Completed;
        let active = order_for(client);

        let orders = vec![done];
        assert!(guard.find_duplicate("Design a company logo", &orders).is_none());

        let orders = vec![active];
        assert!(guard.find_duplicate("Design a company logo", &orders).is_some());
    }

    #[test]
    fn test_fee_schedule() {
        let mut fees = PriorityFeeSchedule::default();
        assert_eq!(fees.fee_for(Priority::Normal).value(), Decimal::new(15, 0));
        assert_eq!(fees.fee_for(Priority::Urgent).value(), Decimal::new(55, 0));

        fees.set_fee(Priority::High, Amount::from_integer(40).unwrap());
        assert_eq!(fees.fee_for(Priority::High).value(), Decimal::new(40, 0));
    }
}
