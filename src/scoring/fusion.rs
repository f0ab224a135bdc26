use crate::config::RiskConfig;
use crate::models::{CustomerProfile, RiskLevel};
use crate::utils::dedup_preserving_order;
use super::patterns::{PatternOutcome, SMURFING, STRUCTURING};
use super::rules::RuleOutcome;

/// Score-to-level mapping plus the profile overrides that force `Severe`
#[derive(Debug, Clone, PartialEq)]
pub struct RiskThresholds {
    pub medium: f64,
    pub high: f64,
    pub severe: f64,
    pub severe_on_pep: bool,
    pub severe_on_sanctions: bool,
}

impl RiskThresholds {
    pub fn from_config(config: &RiskConfig) -> Self {
        RiskThresholds {
            medium: config.medium_risk_score,
            high: config.high_risk_score,
            severe: config.severe_risk_score,
            severe_on_pep: config.severe_on_pep,
            severe_on_sanctions: config.severe_on_sanctions,
        }
    }

    pub fn level_for_score(&self, score: f64) -> RiskLevel {
        if score >= self.severe {
            RiskLevel::Severe
        } else if score >= self.high {
            RiskLevel::High
        } else if score >= self.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Raises a reported level so it is never below what the score implies
    pub fn reconcile(&self, level: RiskLevel, score: f64) -> RiskLevel {
        level.max(self.level_for_score(score))
    }

    pub fn forces_severe(&self, customer: &CustomerProfile) -> bool {
        (self.severe_on_sanctions && customer.sanctions_match) || (self.severe_on_pep && customer.pep_status)
    }
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self::from_config(&RiskConfig::default())
    }
}

/// Fused output of the local sub-analyses
#[derive(Debug, Clone, PartialEq)]
pub struct FusedResult {
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    pub risk_factors: Vec<String>,
    pub recommended_actions: Vec<String>,
    pub detected_patterns: Vec<String>,
    pub confidence: f64,
}

/// Combines rule factors, detected patterns and the numeric score
#[derive(Debug, Clone)]
pub struct ResultFusion {
    thresholds: RiskThresholds,
    pattern_score_uplift: f64,
    base_confidence: f64,
}

impl ResultFusion {
    pub fn new(thresholds: RiskThresholds, pattern_score_uplift: f64, base_confidence: f64) -> Self {
        ResultFusion {
            thresholds,
            pattern_score_uplift,
            base_confidence: base_confidence.clamp(0.0, 1.0),
        }
    }

    pub fn fuse(
        &self,
        rules: RuleOutcome,
        patterns: PatternOutcome,
        base_score: f64,
        customer: &CustomerProfile,
    ) -> FusedResult {
        let detected_patterns = dedup_preserving_order(patterns.patterns);

        let uplift = self.pattern_score_uplift * detected_patterns.len() as f64;
        let risk_score = round_score((base_score + uplift).clamp(0.0, 100.0));

        let risk_level = if self.thresholds.forces_severe(customer) {
            RiskLevel::Severe
        } else {
            self.thresholds.level_for_score(risk_score)
        };

        let risk_factors = dedup_preserving_order(rules.factors.into_iter().chain(patterns.factors));

        let mut actions = rules.actions;
        if detected_patterns.iter().any(|p| p == STRUCTURING || p == SMURFING) {
            actions.push("file_suspicious_activity_report".to_string());
        }
        if risk_level.requires_alert() {
            actions.retain(|a| a != "standard_monitoring");
        }
        let recommended_actions = dedup_preserving_order(actions);

        FusedResult {
            risk_level,
            risk_score,
            risk_factors,
            recommended_actions,
            detected_patterns,
            confidence: self.base_confidence,
        }
    }
}

fn round_score(score: f64) -> f64 {
    (score * 100.0).round() / 100.0
}
