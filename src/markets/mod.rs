pub mod codec;
pub mod selection;
pub mod vocabulary;

pub use codec::{EncodeOutcome, MarketKey, RowViolation};
pub use vocabulary::{bet_type, BetType, SportId, BET_TYPES, SPORTS};

/// Margins compare in hundredths so f64 noise can never split a map key.
pub fn margin_key(margin: f64) -> i64 {
    (margin * 100.0).round() as i64
}
