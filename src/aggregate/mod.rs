//! Aggregate module
//!
//! Entities of the marketplace core. Each aggregate owns the rules for its
//! own state changes; the store decides nothing and only makes a rule check
//! plus its write one atomic unit.

pub mod account;
pub mod ban;
pub mod order;
pub mod promo_code;
pub mod transaction;

pub use account::Account;
pub use ban::{Ban, BanType};
pub use order::{
    DuplicateGuard, NewOrder, Order, OrderStatus, Priority, PriorityFeeSchedule,
};
pub use promo_code::{
    Benefit, DistributionMethod, NewPromoCode, PromoCode, PromoType, TargetAudience,
};
pub use transaction::{Transaction, TransactionStatus, TransactionType};

use rand::Rng;

/// Alphabet for human-facing codes (order numbers, promo codes)
pub(crate) const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Random upper-case alphanumeric string of the given length
pub(crate) fn random_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Common identity of persisted aggregates
pub trait Aggregate {
    /// Get the aggregate type name (used as audit target type)
    fn aggregate_type() -> &'static str;

    /// Get the aggregate ID
    fn id(&self) -> uuid::Uuid;
}
