use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use chrono::Utc;
use log::{debug, error, info, warn};
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::banking::{BankConnection, BankSystemFactory, BankingError};
use crate::config::{Config, ConfigError};
use crate::engine::FallbackOrchestrator;
use crate::learning::FeedbackOutcome;
use crate::models::{
    Alert, AnalysisContext, AnalysisResult, CustomerContext, Feedback, RiskAssessment, SystemInfo, Transaction,
};
use crate::scoring::ScoringError;

// Number of risk factors quoted in alert reasoning
const ALERT_REASON_FACTORS: usize = 3;

/// Error types for the assistant workflow
#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error(transparent)]
    Banking(#[from] BankingError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Stages a transaction passes through during analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    Received,
    ContextFetched,
    Assessed,
    AlertDecision,
    Completed,
    Failed,
}

impl WorkflowStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStage::Received => "received",
            WorkflowStage::ContextFetched => "context_fetched",
            WorkflowStage::Assessed => "assessed",
            WorkflowStage::AlertDecision => "alert_decision",
            WorkflowStage::Completed => "completed",
            WorkflowStage::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Tracks and logs the stage of one analysis
struct Workflow<'a> {
    transaction_id: &'a str,
    stage: WorkflowStage,
}

impl<'a> Workflow<'a> {
    fn start(transaction_id: &'a str) -> Self {
        debug!("{}: {}", transaction_id, WorkflowStage::Received);
        Workflow {
            transaction_id,
            stage: WorkflowStage::Received,
        }
    }

    fn advance(&mut self, next: WorkflowStage) {
        debug!("{}: {} -> {}", self.transaction_id, self.stage, next);
        self.stage = next;
    }

    fn fail(&mut self, reason: &AssistantError) {
        error!("{}: failed at {}: {}", self.transaction_id, self.stage, reason);
        self.stage = WorkflowStage::Failed;
    }
}

/// Scoring side of the status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringStatus {
    pub primary_provider: String,
    pub available_providers: Vec<String>,
    pub learning_enabled: bool,
}

/// Data source side of the status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankingStatus {
    pub system_type: String,
    pub simulation_mode: bool,
}

/// Point-in-time view of the assistant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub scoring: ScoringStatus,
    pub banking: BankingStatus,
    pub alerts_processed: u64,
    pub learning_entries: usize,
}

/// Entry point for transaction analysis
pub struct AmlAssistant {
    config: Arc<Config>,
    bank: BankConnection,
    engine: FallbackOrchestrator,
    alert_counter: AtomicU64,
}

impl AmlAssistant {
    pub fn new(config: Config) -> Result<Self, AssistantError> {
        config.validate()?;

        let bank = BankSystemFactory::new().create(&config);
        let engine = FallbackOrchestrator::from_config(&config);

        Ok(Self::with_components(config, bank, engine))
    }

    pub fn with_components(config: Config, bank: BankConnection, engine: FallbackOrchestrator) -> Self {
        info!(
            "AML assistant ready (data source: {}, primary backend: {})",
            bank.system_type,
            engine.primary_provider()
        );

        AmlAssistant {
            config: Arc::new(config),
            bank,
            engine,
            alert_counter: AtomicU64::new(0),
        }
    }

    /// Analyse one transaction: fetch context, assess, raise an alert if needed
    pub async fn analyze_transaction(&self, transaction: &Transaction) -> Result<AnalysisResult, AssistantError> {
        let mut workflow = Workflow::start(&transaction.transaction_id);

        match self.run_workflow(transaction, &mut workflow).await {
            Ok(result) => {
                workflow.advance(WorkflowStage::Completed);
                Ok(result)
            }
            Err(e) => {
                workflow.fail(&e);
                Err(e)
            }
        }
    }

    async fn run_workflow(&self, transaction: &Transaction, workflow: &mut Workflow<'_>) -> Result<AnalysisResult, AssistantError> {
        validate_transaction(transaction)?;

        let bank = &self.bank.system;
        let (profile, history) = tokio::try_join!(
            bank.get_customer_profile(&transaction.customer_id),
            bank.get_transaction_history(&transaction.customer_id, self.config.banking.history_days),
        )?;
        workflow.advance(WorkflowStage::ContextFetched);

        let context = CustomerContext::new(profile, history);
        let assessment = self.engine.analyze(transaction, &context).await?;
        workflow.advance(WorkflowStage::Assessed);

        let alert_id = if assessment.risk_level.requires_alert() {
            Some(self.raise_alert(transaction, &assessment).await)
        } else {
            None
        };
        workflow.advance(WorkflowStage::AlertDecision);

        info!(
            "Transaction {} assessed {} ({:.2}) by {}{}",
            transaction.transaction_id,
            assessment.risk_level,
            assessment.risk_score,
            assessment.backend,
            if assessment.fallback_used { " (fallback)" } else { "" }
        );

        Ok(AnalysisResult {
            transaction_id: transaction.transaction_id.clone(),
            timestamp: Utc::now(),
            system_info: SystemInfo {
                bank_system: self.bank.system_type.to_string(),
                simulation_mode: self.bank.is_simulation(),
                analysis_method: assessment.analysis_method.clone(),
            },
            context: AnalysisContext {
                customer_risk_tier: context.profile.risk_tier,
                transaction_count: context.recent_transactions.len(),
                customer_since_days: context.profile.account_age_days,
            },
            risk_assessment: assessment,
            alert_id,
        })
    }

    // Submission problems are logged only; the alert id is still returned
    async fn raise_alert(&self, transaction: &Transaction, assessment: &RiskAssessment) -> String {
        let sequence = self.alert_counter.fetch_add(1, Ordering::SeqCst) + 1;

        let alert = Alert {
            alert_id: Alert::format_id(sequence),
            sequence,
            transaction_id: transaction.transaction_id.clone(),
            customer_id: transaction.customer_id.clone(),
            risk_level: assessment.risk_level,
            risk_score: assessment.risk_score,
            detected_patterns: assessment.detected_patterns.clone(),
            reasoning: alert_reasoning(assessment),
            timestamp: Utc::now(),
        };

        match self.bank.system.submit_alert(&alert).await {
            Ok(true) => info!("Alert {} submitted for {}", alert.alert_id, transaction.transaction_id),
            Ok(false) => warn!("Data source rejected alert {}", alert.alert_id),
            Err(e) => error!("Failed to submit alert {}: {}", alert.alert_id, e),
        }

        alert.alert_id
    }

    pub fn provide_feedback(&self, transaction_id: &str, feedback: Feedback) -> FeedbackOutcome {
        let outcome = self.engine.submit_feedback(transaction_id, feedback);
        match &outcome {
            FeedbackOutcome::NotFound => warn!("No learning entry for {}", transaction_id),
            FeedbackOutcome::AlreadyReviewed => warn!("Feedback for {} was already recorded", transaction_id),
            FeedbackOutcome::Applied { .. } => {}
        }
        outcome
    }

    pub fn get_system_status(&self) -> SystemStatus {
        SystemStatus {
            scoring: ScoringStatus {
                primary_provider: self.engine.primary_provider().to_string(),
                available_providers: self.engine.available_providers(),
                learning_enabled: self.engine.learning_enabled(),
            },
            banking: BankingStatus {
                system_type: self.bank.system_type.to_string(),
                simulation_mode: self.bank.is_simulation(),
            },
            alerts_processed: self.alerts_processed(),
            learning_entries: self.engine.learning().len(),
        }
    }

    /// Whether the data source answers its health check
    pub async fn check_health(&self) -> bool {
        match self.bank.system.check_system_health().await {
            Ok(healthy) => healthy,
            Err(e) => {
                error!("Data source health check failed: {}", e);
                false
            }
        }
    }

    pub fn alerts_processed(&self) -> u64 {
        self.alert_counter.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

fn validate_transaction(transaction: &Transaction) -> Result<(), AssistantError> {
    if transaction.transaction_id.trim().is_empty() {
        return Err(AssistantError::InvalidTransaction("missing transaction id".to_string()));
    }
    if transaction.customer_id.trim().is_empty() {
        return Err(AssistantError::InvalidTransaction(format!(
            "{} has no customer id",
            transaction.transaction_id
        )));
    }
    if transaction.amount.is_sign_negative() && !transaction.amount.is_zero() {
        return Err(AssistantError::InvalidTransaction(format!(
            "{} has a negative amount",
            transaction.transaction_id
        )));
    }
    Ok(())
}

// Leading risk factors, else detected patterns, else the bare level and score
fn alert_reasoning(assessment: &RiskAssessment) -> String {
    let reasons = if assessment.risk_factors.is_empty() {
        &assessment.detected_patterns
    } else {
        &assessment.risk_factors
    };

    if reasons.is_empty() {
        return format!(
            "High risk transaction detected: {} risk score {:.2}",
            assessment.risk_level, assessment.risk_score
        );
    }

    let reasons: Vec<&str> = reasons.iter().take(ALERT_REASON_FACTORS).map(String::as_str).collect();
    format!("High risk transaction detected: {}", reasons.join(", "))
}
