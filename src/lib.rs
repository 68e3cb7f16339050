//! GT Market core library
//!
//! Ledger, order lifecycle, promo codes, restrictions and the audit trail of
//! the GT Coin work marketplace. Outer surfaces (HTTP, UI, gateways) call in
//! through `handlers::MarketCore`.

pub mod aggregate;
pub mod audit;
pub mod config;
pub mod db;
pub mod domain;
pub mod handlers;
pub mod store;

mod error;

pub use config::{Config, MarketPolicy};
pub use domain::{Amount, AmountError, Balance, DomainError, OperationContext, Role};
pub use domain::{Clock, LedgerEvent, ManualClock, SystemClock};
pub use error::{AppError, AppResult, ErrorResponse};
pub use handlers::MarketCore;
pub use store::{MemoryStore, PgStore, Store, StoreError};
