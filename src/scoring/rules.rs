use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::RiskConfig;
use crate::models::{Channel, CustomerProfile, RiskTier, Transaction, TransactionType};

// Accounts younger than this are treated as new
const NEW_ACCOUNT_DAYS: u32 = 90;

/// Factors and actions produced by the rule engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleOutcome {
    pub factors: Vec<String>,
    pub actions: Vec<String>,
}

impl RuleOutcome {
    fn flag(&mut self, factor: &str, action: Option<&str>) {
        if !self.factors.iter().any(|f| f == factor) {
            self.factors.push(factor.to_string());
        }
        if let Some(action) = action {
            if !self.actions.iter().any(|a| a == action) {
                self.actions.push(action.to_string());
            }
        }
    }
}

/// Deterministic threshold rules over the transaction and customer
#[derive(Debug, Clone)]
pub struct RuleEngine {
    ctr_threshold: Decimal,
    suspicious_threshold: Decimal,
}

impl RuleEngine {
    pub fn new(ctr_threshold: Decimal, suspicious_threshold: Decimal) -> Self {
        RuleEngine {
            ctr_threshold,
            suspicious_threshold,
        }
    }

    pub fn from_config(config: &RiskConfig) -> Self {
        Self::new(config.ctr_threshold, config.suspicious_threshold)
    }

    pub fn analyze(&self, transaction: &Transaction, customer: &CustomerProfile) -> RuleOutcome {
        let mut outcome = RuleOutcome::default();
        let amount = transaction.amount;

        // Amount thresholds
        if amount >= self.ctr_threshold {
            outcome.flag("amount_exceeds_ctr_threshold", Some("file_currency_transaction_report"));
        } else if amount >= self.suspicious_threshold {
            outcome.flag("amount_near_reporting_threshold", Some("review_for_structuring"));
        }

        if transaction.transaction_type.is_cash() && amount >= self.suspicious_threshold {
            outcome.flag("large_cash_transaction", Some("verify_source_of_funds"));
        }

        if transaction.transaction_type == TransactionType::InternationalWire {
            outcome.flag("cross_border_transfer", Some("verify_beneficiary"));
        }

        if transaction.channel == Channel::Correspondent {
            outcome.flag("correspondent_banking_channel", Some("verify_beneficiary"));
        }

        // Customer attributes
        if customer.risk_tier == RiskTier::HighRisk {
            outcome.flag("high_risk_customer", Some("enhanced_due_diligence"));
        }

        if customer.pep_status {
            outcome.flag("politically_exposed_person", Some("senior_management_review"));
        }

        if customer.sanctions_match {
            outcome.flag("sanctions_list_match", Some("freeze_and_escalate"));
        }

        if !customer.kyc_status.is_complete() {
            outcome.flag("incomplete_kyc", Some("refresh_kyc"));
        }

        if customer.account_age_days < NEW_ACCOUNT_DAYS {
            outcome.flag("new_account", None);
        }

        if customer.monthly_volume > Decimal::ZERO && amount > customer.monthly_volume * dec!(0.5) {
            outcome.flag("amount_exceeds_typical_volume", Some("review_account_activity"));
        }

        if outcome.actions.is_empty() {
            outcome.actions.push("standard_monitoring".to_string());
        }

        outcome
    }
}
