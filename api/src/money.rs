//! Fixed-point amount arithmetic and transaction hashing.
//!
//! Amounts cross the wire as floating point but every balance mutation is
//! performed on the integers produced by [`precise`]. This keeps addition
//! associative and immune to the rounding surprises of repeated float math.

use jiff::Timestamp;
use payloads::{BalanceRef, TransactionId, TransactionStatus};
use sha2::{Digest, Sha256};

/// Convert a floating-point amount to its integer representation at the
/// given precision, rounding half away from zero.
///
/// `precise(x, p) = round(x * p)`. This implementation always rounds
/// half-away-from-zero via `f64::round`; callers needing banker's rounding
/// must pre-round before calling in.
pub fn precise(amount: f64, precision: i64) -> i64 {
    (amount * precision as f64).round() as i64
}

/// Recover a floating-point amount from its precise integer representation.
pub fn from_precise(precise_amount: i64, precision: i64) -> f64 {
    precise_amount as f64 / precision as f64
}

/// Canonical fields hashed into a transaction's content digest.
pub struct HashInput<'a> {
    pub transaction_id: TransactionId,
    pub parent_transaction: Option<TransactionId>,
    pub source: &'a BalanceRef,
    pub destination: &'a BalanceRef,
    pub reference: &'a str,
    pub precise_amount: i64,
    pub precision: i64,
    pub rate: f64,
    pub currency: &'a str,
    pub status: TransactionStatus,
    pub created_at: Timestamp,
}

/// Compute the deterministic SHA-256 digest of a transaction's canonical
/// fields, in a fixed field order, hex-encoded.
pub fn transaction_hash(input: &HashInput) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.transaction_id.to_string().as_bytes());
    hasher.update(b"|");
    if let Some(parent) = input.parent_transaction {
        hasher.update(parent.to_string().as_bytes());
    }
    hasher.update(b"|");
    hasher.update(input.source.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(input.destination.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(input.reference.as_bytes());
    hasher.update(b"|");
    hasher.update(input.precise_amount.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(input.precision.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(input.rate.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(input.currency.as_bytes());
    hasher.update(b"|");
    hasher.update(input.status.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(input.created_at.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precise_rounds_half_away_from_zero() {
        assert_eq!(precise(10.0, 100), 1000);
        assert_eq!(precise(10.005, 100), 1001); // 1000.5 -> 1001
        assert_eq!(precise(-10.005, 100), -1001);
    }

    #[test]
    fn rate_conversion_scales_destination_credit() {
        // amount 1_000_000, precision 100, rate 1300
        let precise_amount = precise(1_000_000.0, 100);
        assert_eq!(precise_amount, 100_000_000);
        let dst_credit = (precise_amount as f64 * 1300.0) as i64;
        assert_eq!(dst_credit, 130_000_000_000);
    }

    #[test]
    fn from_precise_round_trips() {
        assert_eq!(from_precise(1000, 100), 10.0);
    }
}
