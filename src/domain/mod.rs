//! Domain module
//!
//! Core domain primitives shared by every aggregate.

pub mod amount;
pub mod clock;
pub mod context;
pub mod error;
pub mod events;

pub use amount::{Amount, AmountError, Balance};
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{OperationContext, Role};
pub use error::DomainError;
pub use events::{LedgerDirection, LedgerEvent};
