//! Marketplace core façade
//!
//! Wires every handler to one store, one clock and one notification channel.

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::audit::AuditLog;
use crate::config::MarketPolicy;
use crate::domain::{Clock, LedgerEvent, SystemClock};
use crate::store::{MemoryStore, Store};

use super::{
    LedgerHandler, LedgerNotifier, OrderHandler, PromoCodeHandler, RestrictionHandler,
    TransactionHandler,
};

#[derive(Clone)]
pub struct MarketCore {
    ledger: LedgerHandler,
    transactions: TransactionHandler,
    orders: OrderHandler,
    promos: PromoCodeHandler,
    restrictions: RestrictionHandler,
    audit: AuditLog,
    notifier: LedgerNotifier,
}

impl MarketCore {
    pub fn new<S: Store + 'static>(store: Arc<S>, clock: Arc<dyn Clock>, policy: MarketPolicy) -> Self {
        let audit = AuditLog::new(store.clone());
        let store: Arc<dyn Store> = store;
        let notifier = LedgerNotifier::new(policy.ledger_event_capacity);

        let restrictions = RestrictionHandler::new(store.clone(), clock.clone(), audit.clone());
        let ledger = LedgerHandler::new(store.clone(), clock.clone(), audit.clone());
        let transactions = TransactionHandler::new(
            store.clone(),
            clock.clone(),
            audit.clone(),
            notifier.clone(),
            restrictions.clone(),
        );
        let orders = OrderHandler::new(
            store.clone(),
            clock.clone(),
            audit.clone(),
            notifier.clone(),
            restrictions.clone(),
            &policy,
        );
        let promos = PromoCodeHandler::new(
            store,
            clock,
            audit.clone(),
            notifier.clone(),
            policy.promo_code_attempts,
        );

        tracing::debug!(
            fee_normal = %policy.fee_schedule.normal,
            fee_high = %policy.fee_schedule.high,
            fee_urgent = %policy.fee_schedule.urgent,
            duplicate_prefix = policy.duplicate_guard.prefix_chars,
            "Market core initialised"
        );

        Self {
            ledger,
            transactions,
            orders,
            promos,
            restrictions,
            audit,
            notifier,
        }
    }

    /// In-memory core on the system clock
    pub fn in_memory(policy: MarketPolicy) -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock), policy)
    }

    pub fn ledger(&self) -> &LedgerHandler {
        &self.ledger
    }

    pub fn transactions(&self) -> &TransactionHandler {
        &self.transactions
    }

    pub fn orders(&self) -> &OrderHandler {
        &self.orders
    }

    pub fn promos(&self) -> &PromoCodeHandler {
        &self.promos
    }

    pub fn restrictions(&self) -> &RestrictionHandler {
        &self.restrictions
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Receive every `LedgerEvent` committed from now on
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.notifier.subscribe()
    }
}
