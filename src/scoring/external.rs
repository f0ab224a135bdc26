use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Serialize, Deserialize};

use super::fusion::RiskThresholds;
use super::{BackendRegistry, ScoringBackend, ScoringError, EXTERNAL_BACKEND_ID};
use crate::config::Config;
use crate::models::{CustomerContext, CustomerProfile, RiskAssessment, RiskLevel, Transaction};
use crate::utils::dedup_preserving_order;

pub const EXTERNAL_ANALYSIS_METHOD: &str = "external_service";

// Externally verified assessments start from a higher confidence than local ones
const DEFAULT_EXTERNAL_CONFIDENCE: f64 = 0.85;

/// Body sent to the remote scoring service
#[derive(Debug, Clone, Serialize)]
pub struct ScoringRequest {
    pub model: String,
    pub transaction: Transaction,
    pub customer: CustomerProfile,
    pub recent_transaction_count: usize,
}

/// Body returned by the remote scoring service
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringResponse {
    pub risk_score: f64,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    #[serde(default)]
    pub detected_patterns: Vec<String>,
    #[serde(default)]
    pub recommended_actions: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Transport to a remote scoring service
#[async_trait]
pub trait ScoringClient: Send + Sync {
    async fn score(&self, request: &ScoringRequest) -> Result<ScoringResponse, ScoringError>;
}

/// JSON over HTTP scoring client authenticated with a bearer credential
pub struct HttpScoringClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl HttpScoringClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self, ScoringError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("aml-assistant/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ScoringError::unavailable(EXTERNAL_BACKEND_ID, format!("Failed to build HTTP client: {}", e)))?;

        Ok(HttpScoringClient {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl ScoringClient for HttpScoringClient {
    async fn score(&self, request: &ScoringRequest) -> Result<ScoringResponse, ScoringError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ScoringError::BackendTimeout {
                        backend: EXTERNAL_BACKEND_ID.to_string(),
                        timeout: self.timeout,
                    }
                } else {
                    ScoringError::unavailable(EXTERNAL_BACKEND_ID, format!("Request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            return Err(ScoringError::unavailable(
                EXTERNAL_BACKEND_ID,
                format!("Scoring service returned {}", response.status()),
            ));
        }

        response
            .json::<ScoringResponse>()
            .await
            .map_err(|e| ScoringError::unavailable(EXTERNAL_BACKEND_ID, format!("Invalid response body: {}", e)))
    }
}

/// Backend that delegates scoring to a remote service
pub struct ExternalServiceBackend {
    client: Arc<dyn ScoringClient>,
    model: String,
    thresholds: RiskThresholds,
}

impl ExternalServiceBackend {
    pub fn new(client: Arc<dyn ScoringClient>, model: impl Into<String>, thresholds: RiskThresholds) -> Self {
        ExternalServiceBackend {
            client,
            model: model.into(),
            thresholds,
        }
    }
}

#[async_trait]
impl ScoringBackend for ExternalServiceBackend {
    fn id(&self) -> &str {
        EXTERNAL_BACKEND_ID
    }

    async fn assess(&self, transaction: &Transaction, context: &CustomerContext) -> Result<RiskAssessment, ScoringError> {
        let request = ScoringRequest {
            model: self.model.clone(),
            transaction: transaction.clone(),
            customer: context.profile.clone(),
            recent_transaction_count: context.recent_transactions.len(),
        };

        let response = self.client.score(&request).await?;

        if !response.risk_score.is_finite() || !(0.0..=100.0).contains(&response.risk_score) {
            return Err(ScoringError::unavailable(
                EXTERNAL_BACKEND_ID,
                format!("Risk score out of range: {}", response.risk_score),
            ));
        }

        let score_level = self.thresholds.level_for_score(response.risk_score);
        let mut risk_level = response
            .risk_level
            .map(|level| self.thresholds.reconcile(level, response.risk_score))
            .unwrap_or(score_level);
        if self.thresholds.forces_severe(&context.profile) {
            risk_level = RiskLevel::Severe;
        }

        debug!(
            "External service scored {} at {:.2} ({})",
            transaction.transaction_id, response.risk_score, risk_level
        );

        Ok(RiskAssessment {
            risk_level,
            risk_score: response.risk_score,
            risk_factors: dedup_preserving_order(response.risk_factors),
            detected_patterns: dedup_preserving_order(response.detected_patterns),
            recommended_actions: dedup_preserving_order(response.recommended_actions),
            confidence: response
                .confidence
                .unwrap_or(DEFAULT_EXTERNAL_CONFIDENCE)
                .clamp(0.0, 1.0),
            backend: EXTERNAL_BACKEND_ID.to_string(),
            fallback_used: false,
            analysis_method: EXTERNAL_ANALYSIS_METHOD.to_string(),
        })
    }
}

pub(super) fn from_config(config: &Config, _registry: &BackendRegistry) -> Option<Arc<dyn ScoringBackend>> {
    if !config.ai.has_valid_credential() {
        return None;
    }
    let api_key = config.ai.api_key.clone()?;

    match HttpScoringClient::new(config.ai.endpoint.clone(), api_key, config.ai.backend_timeout()) {
        Ok(client) => Some(Arc::new(ExternalServiceBackend::new(
            Arc::new(client),
            config.ai.model.clone(),
            RiskThresholds::from_config(&config.risk),
        ))),
        Err(e) => {
            warn!("External scoring backend not available: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Channel, KycStatus, RiskTier, TransactionType};
    use rust_decimal_macros::dec;

    struct CannedClient {
        response: Result<ScoringResponse, ScoringError>,
    }

    #[async_trait]
    impl ScoringClient for CannedClient {
        async fn score(&self, request: &ScoringRequest) -> Result<ScoringResponse, ScoringError> {
            assert_eq!(request.model, "gpt-4");
            self.response.clone()
        }
    }

    fn response(score: f64, level: Option<RiskLevel>) -> ScoringResponse {
        ScoringResponse {
            risk_score: score,
            risk_level: level,
            risk_factors: vec!["velocity".to_string(), "velocity".to_string()],
            detected_patterns: vec!["layering".to_string()],
            recommended_actions: Vec::new(),
            confidence: None,
        }
    }

    fn context(pep: bool) -> CustomerContext {
        CustomerContext::new(
            CustomerProfile {
                customer_id: "CUST002".to_string(),
                name: "Tech Startup Inc.".to_string(),
                business_type: "Technology Services".to_string(),
                risk_tier: RiskTier::LowRisk,
                kyc_status: KycStatus::Verified,
                pep_status: pep,
                sanctions_match: false,
                monthly_volume: dec!(50000),
                account_age_days: 180,
                account_balance: dec!(75000),
            },
            Vec::new(),
        )
    }

    fn backend(response: Result<ScoringResponse, ScoringError>) -> ExternalServiceBackend {
        ExternalServiceBackend::new(Arc::new(CannedClient { response }), "gpt-4", RiskThresholds::default())
    }

    fn transaction() -> Transaction {
        Transaction::new("TX1", "CUST002", dec!(2500), TransactionType::WireTransfer, Channel::Online)
    }

    #[tokio::test]
    async fn test_response_mapped_to_assessment() {
        let assessment = backend(Ok(response(42.0, None)))
            .assess(&transaction(), &context(false))
            .await
            .unwrap();

        assert_eq!(assessment.risk_level, RiskLevel::Medium);
        assert_eq!(assessment.risk_factors, vec!["velocity".to_string()]);
        assert_eq!(assessment.confidence, DEFAULT_EXTERNAL_CONFIDENCE);
        assert_eq!(assessment.backend, EXTERNAL_BACKEND_ID);
    }

    #[tokio::test]
    async fn test_reported_level_reconciled_with_score() {
        let assessment = backend(Ok(response(85.0, Some(RiskLevel::Low))))
            .assess(&transaction(), &context(false))
            .await
            .unwrap();
        assert_eq!(assessment.risk_level, RiskLevel::High);

        let assessment = backend(Ok(response(10.0, None)))
            .assess(&transaction(), &context(true))
            .await
            .unwrap();
        assert_eq!(assessment.risk_level, RiskLevel::Severe);
    }

    #[tokio::test]
    async fn test_out_of_range_score_is_unavailable() {
        let result = backend(Ok(response(140.0, None)))
            .assess(&transaction(), &context(false))
            .await;
        assert!(matches!(result, Err(ScoringError::BackendUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_client_error_propagated() {
        let result = backend(Err(ScoringError::unavailable(EXTERNAL_BACKEND_ID, "503")))
            .assess(&transaction(), &context(false))
            .await;
        assert_eq!(result, Err(ScoringError::unavailable(EXTERNAL_BACKEND_ID, "503")));
    }

    #[tokio::test]
    async fn test_http_timeout_reports_configured_duration() {
        // Accepts connections but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let timeout = Duration::from_millis(100);
        let client = HttpScoringClient::new(format!("http://{}/score", addr), "sk-test", timeout).unwrap();
        assert_eq!(client.timeout(), timeout);

        let request = ScoringRequest {
            model: "gpt-4".to_string(),
            transaction: transaction(),
            customer: context(false).profile,
            recent_transaction_count: 0,
        };
        let result = client.score(&request).await;
        assert!(matches!(
            result,
            Err(ScoringError::BackendTimeout { timeout: reported, .. }) if reported == timeout
        ));
    }

    #[test]
    fn test_not_offered_without_credential() {
        let config = Config::default();
        assert!(from_config(&config, &BackendRegistry::new()).is_none());
    }
}
