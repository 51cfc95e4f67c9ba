//! Pure balance-update rules.
//!
//! No I/O lives here: given a transaction and two balance snapshots, compute
//! the new counters. The orchestrator is responsible for locking, loading
//! snapshots, persisting the result and handling retries around this module.

use payloads::BalanceId;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("insufficient funds on source balance")]
    InsufficientFunds,
    #[error("source currency does not match transaction currency")]
    SourceCurrencyMismatch,
    #[error("destination currency does not match transaction currency")]
    DestinationCurrencyMismatch,
}

/// A mutable, in-memory view of a balance's counters, as loaded at a
/// particular `version`. The engine mutates this in place; persistence with
/// an optimistic `WHERE version = ?` guard happens in the store layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub id: BalanceId,
    pub currency: String,
    pub precision: i64,
    pub balance: i64,
    pub credit_balance: i64,
    pub debit_balance: i64,
    pub inflight_balance: i64,
    pub inflight_credit_balance: i64,
    pub inflight_debit_balance: i64,
    pub version: i64,
}

impl BalanceSnapshot {
    fn recompute_balance(&mut self) {
        self.balance = self.credit_balance - self.debit_balance;
    }

    fn recompute_inflight_balance(&mut self) {
        self.inflight_balance =
            self.inflight_credit_balance - self.inflight_debit_balance;
    }

    pub fn apply_debit(&mut self, amount: i64) {
        self.debit_balance += amount;
        self.recompute_balance();
    }

    pub fn apply_credit(&mut self, amount: i64) {
        self.credit_balance += amount;
        self.recompute_balance();
    }

    pub fn apply_inflight_debit(&mut self, amount: i64) {
        self.inflight_debit_balance += amount;
        self.recompute_inflight_balance();
    }

    pub fn apply_inflight_credit(&mut self, amount: i64) {
        self.inflight_credit_balance += amount;
        self.recompute_inflight_balance();
    }

    /// Move `amount` from the inflight debit counter to the cleared debit
    /// counter, as happens on the source side of a commit.
    pub fn commit_inflight_debit(&mut self, amount: i64) {
        self.inflight_debit_balance -= amount;
        self.recompute_inflight_balance();
        self.apply_debit(amount);
    }

    /// Move `amount` from the inflight credit counter to the cleared credit
    /// counter, as happens on the destination side of a commit.
    pub fn commit_inflight_credit(&mut self, amount: i64) {
        self.inflight_credit_balance -= amount;
        self.recompute_inflight_balance();
        self.apply_credit(amount);
    }

    /// Remove `amount` from the inflight debit counter without touching
    /// cleared counters, as happens on the source side of a void.
    pub fn rollback_inflight_debit(&mut self, amount: i64) {
        self.inflight_debit_balance -= amount;
        self.recompute_inflight_balance();
    }

    /// Remove `amount` from the inflight credit counter without touching
    /// cleared counters, as happens on the destination side of a void.
    pub fn rollback_inflight_credit(&mut self, amount: i64) {
        self.inflight_credit_balance -= amount;
        self.recompute_inflight_balance();
    }
}

/// The subset of a transaction the engine needs to mutate balances.
pub struct EngineTransaction<'a> {
    pub precise_amount: i64,
    pub rate: f64,
    pub currency: &'a str,
    pub inflight: bool,
    pub allow_overdraft: bool,
}

/// Apply `txn` to `source` and `destination` in place.
///
/// Direct applies touch cleared counters, inflight applies touch only the
/// pending counters, and an overdraft check always runs against the
/// source's post-debit position: cleared plus inflight debits against
/// cleared credits, so a pending authorization reserves funds the same way
/// a cleared debit does.
pub fn apply(
    txn: &EngineTransaction,
    source: &mut BalanceSnapshot,
    destination: &mut BalanceSnapshot,
) -> Result<(), EngineError> {
    if source.currency != txn.currency {
        return Err(EngineError::SourceCurrencyMismatch);
    }
    if txn.rate == 1.0 && destination.currency != txn.currency {
        return Err(EngineError::DestinationCurrencyMismatch);
    }

    let src_debit = txn.precise_amount;
    let dst_credit = (txn.precise_amount as f64 * txn.rate) as i64;

    if txn.inflight {
        source.apply_inflight_debit(src_debit);
        destination.apply_inflight_credit(dst_credit);
    } else {
        source.apply_debit(src_debit);
        destination.apply_credit(dst_credit);
    }

    let available = source.balance - source.inflight_debit_balance;
    if !txn.allow_overdraft && available < 0 {
        return Err(EngineError::InsufficientFunds);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balance(id: &str, currency: &str) -> BalanceSnapshot {
        BalanceSnapshot {
            id: id.parse().unwrap_or_else(|_| BalanceId::new()),
            currency: currency.to_string(),
            precision: 100,
            balance: 0,
            credit_balance: 0,
            debit_balance: 0,
            inflight_balance: 0,
            inflight_credit_balance: 0,
            inflight_debit_balance: 0,
            version: 1,
        }
    }

    #[test]
    fn direct_apply_moves_cleared_counters() {
        let mut a = balance("a", "NGN");
        let mut b = balance("b", "NGN");
        let txn = EngineTransaction {
            precise_amount: 1000,
            rate: 1.0,
            currency: "NGN",
            inflight: false,
            allow_overdraft: true,
        };
        apply(&txn, &mut a, &mut b).unwrap();
        assert_eq!(a.debit_balance, 1000);
        assert_eq!(a.balance, -1000);
        assert_eq!(b.credit_balance, 1000);
        assert_eq!(b.balance, 1000);
    }

    #[test]
    fn overdraft_without_allowance_is_blocked() {
        let mut a = balance("a", "NGN");
        let mut b = balance("b", "NGN");
        let txn = EngineTransaction {
            precise_amount: 1000,
            rate: 1.0,
            currency: "NGN",
            inflight: false,
            allow_overdraft: false,
        };
        let err = apply(&txn, &mut a, &mut b).unwrap_err();
        assert_eq!(err, EngineError::InsufficientFunds);
    }

    #[test]
    fn rate_conversion_scales_destination_credit() {
        let mut a = balance("a", "USD");
        let mut b = balance("b", "NGN");
        let txn = EngineTransaction {
            precise_amount: 100_000_000,
            rate: 1300.0,
            currency: "USD",
            inflight: false,
            allow_overdraft: true,
        };
        apply(&txn, &mut a, &mut b).unwrap();
        assert_eq!(a.debit_balance, 100_000_000);
        assert_eq!(b.credit_balance, 130_000_000_000);
    }

    #[test]
    fn inflight_commit_can_settle_partially() {
        let mut a = balance("a", "NGN");
        a.credit_balance = 5_000;
        a.balance = 5_000;
        let mut b = balance("b", "NGN");

        let txn = EngineTransaction {
            precise_amount: 2000,
            rate: 1.0,
            currency: "NGN",
            inflight: true,
            allow_overdraft: true,
        };
        apply(&txn, &mut a, &mut b).unwrap();
        assert_eq!(a.inflight_debit_balance, 2000);
        assert_eq!(b.inflight_credit_balance, 2000);

        a.commit_inflight_debit(500);
        b.commit_inflight_credit(500);
        assert_eq!(a.debit_balance, 500);
        assert_eq!(a.inflight_debit_balance, 1500);
        assert_eq!(b.credit_balance, 500);
        assert_eq!(b.inflight_credit_balance, 1500);

        a.commit_inflight_debit(1500);
        b.commit_inflight_credit(1500);
        assert_eq!(a.inflight_debit_balance, 0);
        assert_eq!(a.debit_balance, 2000);
    }

    #[test]
    fn inflight_void_leaves_cleared_counters_untouched() {
        let mut a = balance("a", "NGN");
        a.credit_balance = 5_000;
        a.balance = 5_000;
        let mut b = balance("b", "NGN");

        let txn = EngineTransaction {
            precise_amount: 2000,
            rate: 1.0,
            currency: "NGN",
            inflight: true,
            allow_overdraft: true,
        };
        apply(&txn, &mut a, &mut b).unwrap();
        a.commit_inflight_debit(500);
        b.commit_inflight_credit(500);

        a.rollback_inflight_debit(1500);
        b.rollback_inflight_credit(1500);
        assert_eq!(a.inflight_debit_balance, 0);
        assert_eq!(a.debit_balance, 500); // unchanged by void
        assert_eq!(b.inflight_credit_balance, 0);
        assert_eq!(b.credit_balance, 500);
    }
}
