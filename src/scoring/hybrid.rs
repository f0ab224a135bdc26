use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use futures_util::future::join_all;
use log::{debug, warn};
use tokio::time::timeout;

use super::fusion::RiskThresholds;
use super::{BackendRegistry, ScoringBackend, ScoringError, HYBRID_BACKEND_ID};
use crate::config::Config;
use crate::models::{CustomerContext, RiskAssessment, RiskLevel, Transaction};
use crate::utils::dedup_preserving_order;

pub const HYBRID_ANALYSIS_METHOD: &str = "hybrid_consensus";

// Floor on a member's weight so a zero-confidence answer still counts
const MIN_MEMBER_WEIGHT: f64 = 0.05;

/// Consults every member backend concurrently and merges their answers
pub struct HybridBackend {
    members: Vec<Arc<dyn ScoringBackend>>,
    thresholds: RiskThresholds,
    member_timeout: Duration,
}

impl HybridBackend {
    pub fn new(members: Vec<Arc<dyn ScoringBackend>>, thresholds: RiskThresholds, member_timeout: Duration) -> Self {
        HybridBackend {
            members,
            thresholds,
            member_timeout,
        }
    }

    pub fn member_ids(&self) -> Vec<String> {
        self.members.iter().map(|m| m.id().to_string()).collect()
    }

    fn merge(&self, assessments: Vec<RiskAssessment>) -> RiskAssessment {
        let total_weight: f64 = assessments
            .iter()
            .map(|a| a.confidence.max(MIN_MEMBER_WEIGHT))
            .sum();
        let weighted_score: f64 = assessments
            .iter()
            .map(|a| a.risk_score * a.confidence.max(MIN_MEMBER_WEIGHT))
            .sum();
        let risk_score = ((weighted_score / total_weight).clamp(0.0, 100.0) * 100.0).round() / 100.0;

        let highest_member_level = assessments
            .iter()
            .map(|a| a.risk_level)
            .max()
            .unwrap_or(RiskLevel::Low);
        let risk_level = self.thresholds.reconcile(highest_member_level, risk_score);

        let confidence = assessments.iter().map(|a| a.confidence).sum::<f64>() / assessments.len() as f64;

        let mut risk_factors = Vec::new();
        let mut detected_patterns = Vec::new();
        let mut recommended_actions = Vec::new();
        for assessment in assessments {
            risk_factors.extend(assessment.risk_factors);
            detected_patterns.extend(assessment.detected_patterns);
            recommended_actions.extend(assessment.recommended_actions);
        }
        if risk_level.requires_alert() {
            recommended_actions.retain(|a| a != "standard_monitoring");
        }

        RiskAssessment {
            risk_level,
            risk_score,
            risk_factors: dedup_preserving_order(risk_factors),
            detected_patterns: dedup_preserving_order(detected_patterns),
            recommended_actions: dedup_preserving_order(recommended_actions),
            confidence: confidence.clamp(0.0, 1.0),
            backend: HYBRID_BACKEND_ID.to_string(),
            fallback_used: false,
            analysis_method: HYBRID_ANALYSIS_METHOD.to_string(),
        }
    }
}

#[async_trait]
impl ScoringBackend for HybridBackend {
    fn id(&self) -> &str {
        HYBRID_BACKEND_ID
    }

    fn members(&self) -> Vec<String> {
        let mut ids = vec![HYBRID_BACKEND_ID.to_string()];
        ids.extend(self.member_ids());
        ids
    }

    async fn assess(&self, transaction: &Transaction, context: &CustomerContext) -> Result<RiskAssessment, ScoringError> {
        let calls = self.members.iter().map(|member| async move {
            match timeout(self.member_timeout, member.assess(transaction, context)).await {
                Ok(result) => result,
                Err(_) => Err(ScoringError::BackendTimeout {
                    backend: member.id().to_string(),
                    timeout: self.member_timeout,
                }),
            }
        });

        let mut assessments = Vec::new();
        for result in join_all(calls).await {
            match result {
                Ok(assessment) => assessments.push(assessment),
                Err(e) => warn!("Hybrid member failed: {}", e),
            }
        }

        if assessments.is_empty() {
            return Err(ScoringError::unavailable(HYBRID_BACKEND_ID, "no member backend produced an assessment"));
        }

        debug!(
            "Hybrid consensus for {} from {} of {} members",
            transaction.transaction_id,
            assessments.len(),
            self.members.len()
        );

        Ok(self.merge(assessments))
    }
}

pub(super) fn from_config(config: &Config, registry: &BackendRegistry) -> Option<Arc<dyn ScoringBackend>> {
    if registry.len() < 2 {
        return None;
    }

    let members = registry
        .iter()
        .filter(|b| b.id() != HYBRID_BACKEND_ID)
        .cloned()
        .collect();

    Some(Arc::new(HybridBackend::new(
        members,
        RiskThresholds::from_config(&config.risk),
        config.ai.backend_timeout(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Channel, CustomerProfile, KycStatus, RiskTier, TransactionType};
    use crate::scoring::testing::{as_backends, MockBackend};
    use rust_decimal_macros::dec;

    fn context() -> CustomerContext {
        CustomerContext::new(
            CustomerProfile {
                customer_id: "CUST001".to_string(),
                name: "Downtown Restaurant LLC".to_string(),
                business_type: "Restaurant".to_string(),
                risk_tier: RiskTier::MediumRisk,
                kyc_status: KycStatus::Verified,
                pep_status: false,
                sanctions_match: false,
                monthly_volume: dec!(75000),
                account_age_days: 420,
                account_balance: dec!(150000),
            },
            Vec::new(),
        )
    }

    fn transaction() -> Transaction {
        Transaction::new("TX1", "CUST001", dec!(4000), TransactionType::CardPayment, Channel::Online)
    }

    #[tokio::test]
    async fn test_merges_member_assessments() {
        let members = as_backends(&[
            MockBackend::succeeding("a", 20.0, RiskLevel::Low),
            MockBackend::succeeding("b", 80.0, RiskLevel::High),
        ]);
        let hybrid = HybridBackend::new(members, RiskThresholds::default(), Duration::from_secs(1));

        let assessment = hybrid.assess(&transaction(), &context()).await.unwrap();
        assert_eq!(assessment.risk_score, 50.0);
        assert_eq!(assessment.risk_level, RiskLevel::High);
        assert_eq!(assessment.risk_factors, vec!["a_factor".to_string(), "b_factor".to_string()]);
        assert!(assessment.recommended_actions.is_empty());
        assert!((assessment.confidence - 0.9).abs() < 1e-9);
        assert_eq!(assessment.backend, HYBRID_BACKEND_ID);
    }

    #[test]
    fn test_members_include_consulted_backends() {
        let members = as_backends(&[
            MockBackend::succeeding("external", 20.0, RiskLevel::Low),
            MockBackend::succeeding("local", 30.0, RiskLevel::Low),
        ]);
        let hybrid = HybridBackend::new(members, RiskThresholds::default(), Duration::from_secs(1));

        assert_eq!(
            hybrid.members(),
            vec!["hybrid".to_string(), "external".to_string(), "local".to_string()]
        );
        assert_eq!(MockBackend::failing("local").members(), vec!["local".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_and_hanging_members_are_skipped() {
        let members = as_backends(&[
            MockBackend::failing("a"),
            MockBackend::hanging("b"),
            MockBackend::succeeding("c", 45.0, RiskLevel::Medium),
        ]);
        let hybrid = HybridBackend::new(members, RiskThresholds::default(), Duration::from_millis(50));

        let assessment = hybrid.assess(&transaction(), &context()).await.unwrap();
        assert_eq!(assessment.risk_score, 45.0);
        assert_eq!(assessment.risk_level, RiskLevel::Medium);
    }

    #[tokio::test]
    async fn test_no_successful_member_is_unavailable() {
        let members = as_backends(&[MockBackend::failing("a"), MockBackend::failing("b")]);
        let hybrid = HybridBackend::new(members, RiskThresholds::default(), Duration::from_secs(1));

        let result = hybrid.assess(&transaction(), &context()).await;
        assert!(matches!(result, Err(ScoringError::BackendUnavailable { .. })));
    }

    #[test]
    fn test_requires_two_other_backends() {
        let config = Config::default();
        let mut registry = BackendRegistry::new();
        registry.register(MockBackend::succeeding("local", 10.0, RiskLevel::Low));
        assert!(from_config(&config, &registry).is_none());

        registry.register(MockBackend::succeeding("external", 10.0, RiskLevel::Low));
        assert!(from_config(&config, &registry).is_some());
    }
}
