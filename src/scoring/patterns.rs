use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::RiskConfig;
use crate::models::{CustomerContext, Transaction, TransactionType};

pub const STRUCTURING: &str = "structuring";
pub const SMURFING: &str = "smurfing";
pub const LARGE_CASH: &str = "large_cash";
pub const RAPID_MOVEMENT: &str = "rapid_movement";
pub const ROUND_AMOUNT: &str = "round_amount";

/// Detected pattern labels and the factors explaining them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternOutcome {
    pub patterns: Vec<String>,
    pub factors: Vec<String>,
}

impl PatternOutcome {
    fn detect(&mut self, pattern: &str, factor: &str) {
        self.patterns.push(pattern.to_string());
        self.factors.push(factor.to_string());
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.patterns.iter().any(|p| p == pattern)
    }
}

/// Categorical money-laundering pattern detection
#[derive(Debug, Clone)]
pub struct PatternDetector {
    ctr_threshold: Decimal,
    suspicious_threshold: Decimal,
    rapid_movement_window: Duration,
    round_amount_floor: Decimal,
}

impl PatternDetector {
    pub fn new(ctr_threshold: Decimal, suspicious_threshold: Decimal) -> Self {
        PatternDetector {
            ctr_threshold,
            suspicious_threshold,
            rapid_movement_window: Duration::hours(48),
            round_amount_floor: dec!(5000),
        }
    }

    pub fn from_config(config: &RiskConfig) -> Self {
        Self::new(config.ctr_threshold, config.suspicious_threshold)
    }

    pub fn detect_patterns(&self, transaction: &Transaction, context: &CustomerContext) -> PatternOutcome {
        let mut outcome = PatternOutcome::default();
        let amount = transaction.amount;
        let is_cash = transaction.transaction_type.is_cash();

        if is_cash && self.in_structuring_band(amount) {
            outcome.detect(STRUCTURING, "cash_just_below_reporting_threshold");

            let prior_band_cash = context
                .recent_transactions
                .iter()
                .filter(|tx| tx.transaction_id != transaction.transaction_id)
                .filter(|tx| tx.transaction_type.is_cash() && self.in_structuring_band(tx.amount))
                .count();
            if prior_band_cash > 0 {
                outcome.detect(SMURFING, "repeated_near_threshold_cash");
            }
        }

        if is_cash && amount >= self.ctr_threshold {
            outcome.detect(LARGE_CASH, "cash_above_reporting_threshold");
        }

        if transaction.transaction_type.is_wire() && self.follows_cash_deposit(transaction, context) {
            outcome.detect(RAPID_MOVEMENT, "funds_moved_shortly_after_cash_deposit");
        }

        if amount >= self.round_amount_floor && (amount % dec!(1000)).is_zero() {
            outcome.detect(ROUND_AMOUNT, "round_amount_transaction");
        }

        outcome
    }

    fn in_structuring_band(&self, amount: Decimal) -> bool {
        amount >= self.suspicious_threshold && amount < self.ctr_threshold
    }

    // A cash deposit of at least half the wired amount within the window before it
    fn follows_cash_deposit(&self, transaction: &Transaction, context: &CustomerContext) -> bool {
        let window_start = transaction.timestamp - self.rapid_movement_window;

        context.recent_transactions.iter().any(|tx| {
            tx.transaction_id != transaction.transaction_id
                && tx.transaction_type == TransactionType::CashDeposit
                && tx.timestamp >= window_start
                && tx.timestamp <= transaction.timestamp
                && tx.amount * dec!(2) >= transaction.amount
        })
    }
}
