//! Ledger notifications
//!
//! In-process broadcast of committed ledger mutations. Subscribers are
//! external collaborators; publishing with nobody listening is normal.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::domain::LedgerEvent;
use crate::store::Settlement;

#[derive(Debug, Clone)]
pub struct LedgerNotifier {
    sender: broadcast::Sender<LedgerEvent>,
}

impl LedgerNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: LedgerEvent) {
        let event_type = event.event_type();
        let account_id = event.account_id();
        match self.sender.send(event) {
            Ok(receivers) => {
                tracing::trace!(%account_id, event_type, receivers, "Ledger event published");
            }
            Err(_) => {
                tracing::trace!(%account_id, event_type, "Ledger event dropped, no subscribers");
            }
        }
    }

    pub fn balance_changed(&self, settlement: &Settlement, occurred_at: DateTime<Utc>) {
        let tx = &settlement.transaction;
        self.publish(LedgerEvent::BalanceChanged {
            account_id: tx.account_id,
            transaction_id: tx.id,
            direction: tx.direction(),
            amount: tx.amount.value(),
            new_balance: settlement.new_balance.value(),
            occurred_at,
        });
    }
}
