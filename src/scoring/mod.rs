pub mod calculator;
pub mod external;
pub mod fusion;
pub mod hybrid;
pub mod local;
pub mod patterns;
pub mod rules;

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use log::{debug, warn};
use thiserror::Error;

use crate::config::Config;
use crate::models::{CustomerContext, RiskAssessment, Transaction};

pub use external::{ExternalServiceBackend, HttpScoringClient, ScoringClient};
pub use fusion::{ResultFusion, RiskThresholds};
pub use hybrid::HybridBackend;
pub use local::LocalIntelligenceBackend;

pub const LOCAL_BACKEND_ID: &str = "local";
pub const EXTERNAL_BACKEND_ID: &str = "external";
pub const HYBRID_BACKEND_ID: &str = "hybrid";

/// Error types for scoring operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    #[error("Backend {backend} unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    #[error("Backend {backend} timed out after {timeout:?}")]
    BackendTimeout { backend: String, timeout: Duration },

    #[error("All scoring backends failed (attempted: {})", .attempted.join(", "))]
    AllBackendsFailed { attempted: Vec<String> },
}

impl ScoringError {
    pub fn unavailable(backend: &str, reason: impl Into<String>) -> Self {
        ScoringError::BackendUnavailable {
            backend: backend.to_string(),
            reason: reason.into(),
        }
    }
}

/// A risk scoring backend
#[async_trait]
pub trait ScoringBackend: Send + Sync {
    /// Stable, non-empty identifier used for routing and performance tracking
    fn id(&self) -> &str;

    /// Ids of every backend consulted by one `assess` call, this one included
    fn members(&self) -> Vec<String> {
        vec![self.id().to_string()]
    }

    async fn assess(&self, transaction: &Transaction, context: &CustomerContext) -> Result<RiskAssessment, ScoringError>;
}

/// Builds a backend from configuration, or `None` when it cannot be offered
pub type BackendConstructor = fn(&Config, &BackendRegistry) -> Option<Arc<dyn ScoringBackend>>;

// Registration order is the fallback sweep order
const BACKEND_CONSTRUCTORS: [(&str, BackendConstructor); 3] = [
    (EXTERNAL_BACKEND_ID, external::from_config),
    (LOCAL_BACKEND_ID, local::from_config),
    (HYBRID_BACKEND_ID, hybrid::from_config),
];

/// Available backends in registration order
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: Vec<Arc<dyn ScoringBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        BackendRegistry {
            backends: Vec::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut registry = BackendRegistry::new();

        for (id, constructor) in BACKEND_CONSTRUCTORS.iter() {
            match constructor(config, &registry) {
                Some(backend) => {
                    debug!("Registered scoring backend {}", id);
                    registry.register(backend);
                }
                None => debug!("Scoring backend {} not available", id),
            }
        }

        registry
    }

    /// Adds a backend; a backend with the same id keeps its position and is replaced
    pub fn register(&mut self, backend: Arc<dyn ScoringBackend>) {
        if backend.id().is_empty() {
            warn!("Refusing to register a scoring backend with an empty id");
            return;
        }

        match self.backends.iter().position(|b| b.id() == backend.id()) {
            Some(index) => self.backends[index] = backend,
            None => self.backends.push(backend),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ScoringBackend>> {
        self.backends.iter().find(|b| b.id() == id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.backends.iter().any(|b| b.id() == id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.id().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ScoringBackend>> {
        self.backends.iter()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::models::RiskLevel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub enum MockBehaviour {
        Succeed { score: f64, level: RiskLevel },
        Fail,
        Hang,
    }

    /// Backend with scripted behaviour that counts its calls
    pub struct MockBackend {
        id: String,
        behaviour: MockBehaviour,
        calls: AtomicUsize,
    }

    impl MockBackend {
        pub fn succeeding(id: &str, score: f64, level: RiskLevel) -> Arc<Self> {
            Arc::new(MockBackend {
                id: id.to_string(),
                behaviour: MockBehaviour::Succeed { score, level },
                calls: AtomicUsize::new(0),
            })
        }

        pub fn failing(id: &str) -> Arc<Self> {
            Arc::new(MockBackend {
                id: id.to_string(),
                behaviour: MockBehaviour::Fail,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn hanging(id: &str) -> Arc<Self> {
            Arc::new(MockBackend {
                id: id.to_string(),
                behaviour: MockBehaviour::Hang,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    pub fn as_backends(mocks: &[Arc<MockBackend>]) -> Vec<Arc<dyn ScoringBackend>> {
        mocks
            .iter()
            .map(|m| m.clone() as Arc<dyn ScoringBackend>)
            .collect()
    }

    #[async_trait]
    impl ScoringBackend for MockBackend {
        fn id(&self) -> &str {
            &self.id
        }

        async fn assess(&self, _transaction: &Transaction, _context: &CustomerContext) -> Result<RiskAssessment, ScoringError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            match &self.behaviour {
                MockBehaviour::Succeed { score, level } => Ok(RiskAssessment {
                    risk_level: *level,
                    risk_score: *score,
                    risk_factors: vec![format!("{}_factor", self.id)],
                    detected_patterns: Vec::new(),
                    recommended_actions: vec!["standard_monitoring".to_string()],
                    confidence: 0.9,
                    backend: self.id.clone(),
                    fallback_used: false,
                    analysis_method: "mock".to_string(),
                }),
                MockBehaviour::Fail => Err(ScoringError::unavailable(&self.id, "scripted failure")),
                MockBehaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(ScoringError::unavailable(&self.id, "woke up"))
                }
            }
        }
    }
}
