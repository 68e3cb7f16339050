//! Command Handlers module
//!
//! Handlers orchestrate one business operation each: authorize against the
//! `OperationContext`, let the aggregate decide, hand the compound write to
//! the store, then publish notifications and audit entries.

mod commands;
mod ledger_handler;
mod market;
mod notifier;
mod order_handler;
mod promo_handler;
mod restriction_handler;
mod transaction_handler;

#[cfg(test)]
mod tests;

pub use commands::*;
pub use ledger_handler::LedgerHandler;
pub use market::MarketCore;
pub use notifier::LedgerNotifier;
pub use order_handler::OrderHandler;
pub use promo_handler::PromoCodeHandler;
pub use restriction_handler::RestrictionHandler;
pub use transaction_handler::TransactionHandler;

use crate::domain::{Amount, DomainError};

/// Parse a command amount into a validated `Amount`
pub(crate) fn parse_amount(raw: &str) -> Result<Amount, DomainError> {
    raw.trim().parse::<Amount>().map_err(DomainError::from)
}
