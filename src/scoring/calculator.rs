use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::config::RiskConfig;
use crate::models::{Channel, CustomerProfile, RiskTier, Transaction};

// Component weights, summing to 1.0
const TIER_WEIGHT: f64 = 0.35;
const AMOUNT_WEIGHT: f64 = 0.30;
const CHANNEL_WEIGHT: f64 = 0.15;
const FLAG_WEIGHT: f64 = 0.20;

// Amounts at twice the CTR threshold or more score the full amount component
const AMOUNT_RATIO_CAP: f64 = 2.0;

/// Numeric 0-100 risk score from customer and transaction attributes
#[derive(Debug, Clone)]
pub struct RiskCalculator {
    ctr_threshold: Decimal,
}

impl RiskCalculator {
    pub fn new(ctr_threshold: Decimal) -> Self {
        RiskCalculator { ctr_threshold }
    }

    pub fn from_config(config: &RiskConfig) -> Self {
        Self::new(config.ctr_threshold)
    }

    pub fn calculate_risk(&self, transaction: &Transaction, customer: &CustomerProfile) -> f64 {
        let score = TIER_WEIGHT * tier_risk(customer.risk_tier)
            + AMOUNT_WEIGHT * self.amount_risk(transaction.amount)
            + CHANNEL_WEIGHT * channel_risk(transaction.channel)
            + FLAG_WEIGHT * flag_risk(customer);

        score.clamp(0.0, 100.0)
    }

    fn amount_risk(&self, amount: Decimal) -> f64 {
        if self.ctr_threshold <= Decimal::ZERO {
            return 100.0;
        }

        let ratio = (amount / self.ctr_threshold).to_f64().unwrap_or(AMOUNT_RATIO_CAP);
        ratio.clamp(0.0, AMOUNT_RATIO_CAP) / AMOUNT_RATIO_CAP * 100.0
    }
}

fn tier_risk(tier: RiskTier) -> f64 {
    match tier {
        RiskTier::LowRisk => 10.0,
        RiskTier::MediumRisk => 40.0,
        RiskTier::HighRisk => 80.0,
    }
}

fn channel_risk(channel: Channel) -> f64 {
    match channel {
        Channel::Online | Channel::Mobile => 30.0,
        Channel::Branch => 40.0,
        Channel::Atm => 50.0,
        Channel::Correspondent => 80.0,
    }
}

// Strongest of the profile flags
fn flag_risk(customer: &CustomerProfile) -> f64 {
    if customer.sanctions_match {
        100.0
    } else if customer.pep_status {
        70.0
    } else if !customer.kyc_status.is_complete() {
        40.0
    } else {
        0.0
    }
}
