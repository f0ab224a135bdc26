use std::sync::Arc;
use async_trait::async_trait;
use log::debug;

use super::calculator::RiskCalculator;
use super::fusion::{ResultFusion, RiskThresholds};
use super::patterns::PatternDetector;
use super::rules::RuleEngine;
use super::{BackendRegistry, ScoringBackend, ScoringError, LOCAL_BACKEND_ID};
use crate::config::Config;
use crate::models::{CustomerContext, RiskAssessment, Transaction};

pub const LOCAL_ANALYSIS_METHOD: &str = "local_intelligence";

/// Rule, pattern and score analysis fused into one assessment, always available
pub struct LocalIntelligenceBackend {
    rule_engine: RuleEngine,
    pattern_detector: PatternDetector,
    risk_calculator: RiskCalculator,
    fusion: ResultFusion,
}

impl LocalIntelligenceBackend {
    pub fn new(config: &Config) -> Self {
        let risk = &config.risk;
        LocalIntelligenceBackend {
            rule_engine: RuleEngine::from_config(risk),
            pattern_detector: PatternDetector::from_config(risk),
            risk_calculator: RiskCalculator::from_config(risk),
            fusion: ResultFusion::new(
                RiskThresholds::from_config(risk),
                risk.pattern_score_uplift,
                config.ai.local_base_confidence,
            ),
        }
    }

    /// Synchronous core of `assess`
    pub fn analyze(&self, transaction: &Transaction, context: &CustomerContext) -> RiskAssessment {
        let customer = &context.profile;

        let rules = self.rule_engine.analyze(transaction, customer);
        let patterns = self.pattern_detector.detect_patterns(transaction, context);
        let score = self.risk_calculator.calculate_risk(transaction, customer);

        debug!(
            "Local analysis of {}: {} rule factors, {} patterns, base score {:.2}",
            transaction.transaction_id,
            rules.factors.len(),
            patterns.patterns.len(),
            score
        );

        let fused = self.fusion.fuse(rules, patterns, score, customer);

        RiskAssessment {
            risk_level: fused.risk_level,
            risk_score: fused.risk_score,
            risk_factors: fused.risk_factors,
            detected_patterns: fused.detected_patterns,
            recommended_actions: fused.recommended_actions,
            confidence: fused.confidence,
            backend: LOCAL_BACKEND_ID.to_string(),
            fallback_used: false,
            analysis_method: LOCAL_ANALYSIS_METHOD.to_string(),
        }
    }
}

#[async_trait]
impl ScoringBackend for LocalIntelligenceBackend {
    fn id(&self) -> &str {
        LOCAL_BACKEND_ID
    }

    async fn assess(&self, transaction: &Transaction, context: &CustomerContext) -> Result<RiskAssessment, ScoringError> {
        Ok(self.analyze(transaction, context))
    }
}

pub(super) fn from_config(config: &Config, _registry: &BackendRegistry) -> Option<Arc<dyn ScoringBackend>> {
    Some(Arc::new(LocalIntelligenceBackend::new(config)))
}
