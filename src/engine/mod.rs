pub mod confidence;

use std::sync::Arc;
use std::time::Duration;
use log::{debug, info, warn};
use tokio::time::timeout;

use crate::config::Config;
use crate::learning::{FeedbackOutcome, LearningStore};
use crate::models::{CustomerContext, Feedback, RiskAssessment, Transaction};
use crate::scoring::{
    BackendRegistry, LocalIntelligenceBackend, RiskThresholds, ScoringBackend, ScoringError, LOCAL_BACKEND_ID,
};
use self::confidence::calculate_confidence;

const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Selects a scoring backend per request: the primary first, then a single
/// sweep over the remaining backends in registration order, then the local
/// composite as the last resort.
pub struct FallbackOrchestrator {
    registry: BackendRegistry,
    primary: String,
    ultimate: Arc<dyn ScoringBackend>,
    thresholds: RiskThresholds,
    call_timeout: Duration,
    confidence_threshold: f64,
    learning: Arc<LearningStore>,
    learning_enabled: bool,
}

impl FallbackOrchestrator {
    pub fn new(registry: BackendRegistry, primary: impl Into<String>, ultimate: Arc<dyn ScoringBackend>) -> Self {
        FallbackOrchestrator {
            registry,
            primary: primary.into(),
            ultimate,
            thresholds: RiskThresholds::default(),
            call_timeout: Duration::from_secs(2),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            learning: Arc::new(LearningStore::default()),
            learning_enabled: true,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let registry = BackendRegistry::from_config(config);
        let primary = config.ai.primary_provider().as_str().to_string();
        let ultimate = registry
            .get(LOCAL_BACKEND_ID)
            .unwrap_or_else(|| Arc::new(LocalIntelligenceBackend::new(config)) as Arc<dyn ScoringBackend>);

        info!(
            "Scoring engine ready: primary {}, backends [{}]",
            primary,
            registry.ids().join(", ")
        );

        FallbackOrchestrator::new(registry, primary, ultimate)
            .with_thresholds(RiskThresholds::from_config(&config.risk))
            .with_timeout(config.ai.backend_timeout())
            .with_confidence_threshold(config.ai.confidence_threshold)
            .with_learning(Arc::new(LearningStore::from_config(&config.learning)), config.ai.enable_learning)
    }

    pub fn with_thresholds(mut self, thresholds: RiskThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn with_confidence_threshold(mut self, confidence_threshold: f64) -> Self {
        self.confidence_threshold = confidence_threshold;
        self
    }

    pub fn with_learning(mut self, learning: Arc<LearningStore>, enabled: bool) -> Self {
        self.learning = learning;
        self.learning_enabled = enabled;
        self
    }

    pub async fn analyze(&self, transaction: &Transaction, context: &CustomerContext) -> Result<RiskAssessment, ScoringError> {
        let mut attempted: Vec<String> = Vec::new();

        match self.registry.get(&self.primary) {
            Some(primary) => {
                note_consulted(&mut attempted, &primary);
                match self.call(&primary, transaction, context).await {
                    Ok(assessment) => return Ok(self.finalize(assessment, &self.primary, false, transaction, context)),
                    Err(e) => warn!("Primary backend failed for {}: {}", transaction.transaction_id, e),
                }
            }
            None => warn!("Primary backend {} is not registered", self.primary),
        }

        for backend in self.registry.iter() {
            if already_consulted(&attempted, backend) {
                continue;
            }
            let id = backend.id().to_string();
            note_consulted(&mut attempted, backend);

            match self.call(backend, transaction, context).await {
                Ok(assessment) => {
                    info!("Fallback backend {} answered for {}", id, transaction.transaction_id);
                    return Ok(self.finalize(assessment, &id, true, transaction, context));
                }
                Err(e) => warn!("Fallback backend failed for {}: {}", transaction.transaction_id, e),
            }
        }

        if !already_consulted(&attempted, &self.ultimate) {
            let ultimate_id = self.ultimate.id().to_string();
            note_consulted(&mut attempted, &self.ultimate);
            match self.call(&self.ultimate, transaction, context).await {
                Ok(assessment) => {
                    warn!("Ultimate fallback used for {}", transaction.transaction_id);
                    return Ok(self.finalize(assessment, &ultimate_id, true, transaction, context));
                }
                Err(e) => warn!("Ultimate fallback failed for {}: {}", transaction.transaction_id, e),
            }
        }

        Err(ScoringError::AllBackendsFailed { attempted })
    }

    async fn call(
        &self,
        backend: &Arc<dyn ScoringBackend>,
        transaction: &Transaction,
        context: &CustomerContext,
    ) -> Result<RiskAssessment, ScoringError> {
        match timeout(self.call_timeout, backend.assess(transaction, context)).await {
            Ok(result) => result,
            Err(_) => Err(ScoringError::BackendTimeout {
                backend: backend.id().to_string(),
                timeout: self.call_timeout,
            }),
        }
    }

    fn finalize(
        &self,
        mut assessment: RiskAssessment,
        backend: &str,
        fallback_used: bool,
        transaction: &Transaction,
        context: &CustomerContext,
    ) -> RiskAssessment {
        assessment.backend = backend.to_string();
        assessment.fallback_used = fallback_used;
        assessment.risk_score = assessment.risk_score.clamp(0.0, 100.0);
        assessment.risk_level = self.thresholds.reconcile(assessment.risk_level, assessment.risk_score);
        assessment.confidence = calculate_confidence(
            assessment.confidence,
            self.learning.backend_performance(backend),
            assessment.risk_factors.len(),
        );

        if self.is_low_confidence(assessment.confidence) {
            warn!(
                "Low confidence assessment for {} by {}: {:.3} below {:.2}",
                transaction.transaction_id, backend, assessment.confidence, self.confidence_threshold
            );
        }

        if self.learning_enabled {
            self.learning.record(transaction, &context.profile, &assessment);
        }

        debug!(
            "Assessment for {} by {}: {} ({:.2}), confidence {:.3}",
            transaction.transaction_id, backend, assessment.risk_level, assessment.risk_score, assessment.confidence
        );

        assessment
    }

    pub fn submit_feedback(&self, transaction_id: &str, feedback: Feedback) -> FeedbackOutcome {
        self.learning.submit_feedback(transaction_id, feedback)
    }

    /// Whether an assessment this confident should be reviewed by an analyst
    pub fn is_low_confidence(&self, confidence: f64) -> bool {
        confidence < self.confidence_threshold
    }

    pub fn primary_provider(&self) -> &str {
        &self.primary
    }

    pub fn available_providers(&self) -> Vec<String> {
        self.registry.ids()
    }

    pub fn learning(&self) -> &Arc<LearningStore> {
        &self.learning
    }

    pub fn learning_enabled(&self) -> bool {
        self.learning_enabled
    }
}

// A composite backend counts as consulted once any backend it calls has been
fn already_consulted(attempted: &[String], backend: &Arc<dyn ScoringBackend>) -> bool {
    backend.members().iter().any(|id| attempted.contains(id))
}

fn note_consulted(attempted: &mut Vec<String>, backend: &Arc<dyn ScoringBackend>) {
    for id in backend.members() {
        if !attempted.contains(&id) {
            attempted.push(id);
        }
    }
}
