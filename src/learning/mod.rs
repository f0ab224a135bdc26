use std::collections::{HashMap, VecDeque};
use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::Mutex;
use serde::{Serialize, Deserialize};

use crate::config::LearningConfig;
use crate::models::{CustomerProfile, Feedback, RiskAssessment, Transaction};

/// One analysed transaction kept for later review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningEntry {
    pub timestamp: DateTime<Utc>,
    pub transaction: Transaction,
    pub customer: CustomerProfile,
    pub assessment: RiskAssessment,
    pub feedback: Option<Feedback>,
}

/// What happened to submitted feedback
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackOutcome {
    /// Attached to the latest entry for the transaction
    Applied { backend: String, performance: f64 },
    /// The latest entry for the transaction already carries feedback
    AlreadyReviewed,
    NotFound,
}

/// Bounded history of assessments plus per-backend performance
pub struct LearningStore {
    entries: Mutex<VecDeque<LearningEntry>>,
    performance: Mutex<HashMap<String, f64>>,
    capacity: usize,
    smoothing: f64,
    default_performance: f64,
    feedback_loop: bool,
}

impl LearningStore {
    pub fn new(capacity: usize) -> Self {
        Self::from_config(&LearningConfig {
            pattern_memory_size: capacity,
            ..LearningConfig::default()
        })
    }

    pub fn from_config(config: &LearningConfig) -> Self {
        LearningStore {
            entries: Mutex::new(VecDeque::with_capacity(config.pattern_memory_size.min(1024))),
            performance: Mutex::new(HashMap::new()),
            capacity: config.pattern_memory_size.max(1),
            smoothing: config.performance_smoothing.clamp(0.0, 1.0),
            default_performance: config.default_backend_performance.clamp(0.0, 1.0),
            feedback_loop: config.feedback_loop,
        }
    }

    /// Appends an entry, evicting the oldest when full
    pub fn record(&self, transaction: &Transaction, customer: &CustomerProfile, assessment: &RiskAssessment) {
        let entry = LearningEntry {
            timestamp: Utc::now(),
            transaction: transaction.clone(),
            customer: customer.clone(),
            assessment: assessment.clone(),
            feedback: None,
        };

        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
        debug!("Recorded {} for learning ({} entries)", transaction.transaction_id, entries.len());
    }

    /// Attaches reviewed feedback to the most recent entry for the transaction.
    ///
    /// Feedback is accepted once per entry. When the feedback loop is enabled the
    /// producing backend's performance moves toward the agreement between its
    /// level and the reviewed one.
    pub fn submit_feedback(&self, transaction_id: &str, feedback: Feedback) -> FeedbackOutcome {
        let (backend, assessed_level) = {
            let mut entries = self.entries.lock();
            match entries
                .iter_mut()
                .rev()
                .find(|e| e.transaction.transaction_id == transaction_id)
            {
                None => return FeedbackOutcome::NotFound,
                Some(entry) if entry.feedback.is_some() => return FeedbackOutcome::AlreadyReviewed,
                Some(entry) => {
                    let assessed = (entry.assessment.backend.clone(), entry.assessment.risk_level);
                    entry.feedback = Some(feedback.clone());
                    assessed
                }
            }
        };

        if !self.feedback_loop {
            let performance = self.backend_performance(&backend);
            return FeedbackOutcome::Applied { backend, performance };
        }

        // 1.0 when the levels agree, 0.0 when they are at opposite ends
        let distance = (assessed_level.rank() as f64 - feedback.risk_level.rank() as f64).abs();
        let agreement = 1.0 - distance / 3.0;

        let performance = {
            let mut performance = self.performance.lock();
            let current = performance.entry(backend.clone()).or_insert(self.default_performance);
            *current = (*current + self.smoothing * (agreement - *current)).clamp(0.0, 1.0);
            *current
        };

        info!(
            "Feedback for {} applied: {} assessed {}, reviewed {}, performance now {:.3}",
            transaction_id, backend, assessed_level, feedback.risk_level, performance
        );

        FeedbackOutcome::Applied { backend, performance }
    }

    pub fn backend_performance(&self, backend: &str) -> f64 {
        self.performance
            .lock()
            .get(backend)
            .copied()
            .unwrap_or(self.default_performance)
    }

    pub fn performance_snapshot(&self) -> HashMap<String, f64> {
        self.performance.lock().clone()
    }

    pub fn entries(&self) -> Vec<LearningEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for LearningStore {
    fn default() -> Self {
        Self::from_config(&LearningConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Channel, KycStatus, RiskLevel, RiskTier, TransactionType};
    use rust_decimal_macros::dec;

    fn customer() -> CustomerProfile {
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
        }
    }

    fn assessment(backend: &str, level: RiskLevel) -> RiskAssessment {
        RiskAssessment {
            risk_level: level,
            risk_score: 50.0,
            risk_factors: Vec::new(),
            detected_patterns: Vec::new(),
            recommended_actions: Vec::new(),
            confidence: 0.7,
            backend: backend.to_string(),
            fallback_used: false,
            analysis_method: "local_intelligence".to_string(),
        }
    }

    fn transaction(id: &str) -> Transaction {
        Transaction::new(id, "CUST001", dec!(100), TransactionType::CardPayment, Channel::Online)
    }

    #[test]
    fn test_capacity_evicts_oldest_first() {
        let store = LearningStore::new(3);
        for i in 0..4 {
            store.record(&transaction(&format!("TX{}", i)), &customer(), &assessment("local", RiskLevel::Low));
        }

        let ids: Vec<String> = store
            .entries()
            .into_iter()
            .map(|e| e.transaction.transaction_id)
            .collect();
        assert_eq!(ids, vec!["TX1", "TX2", "TX3"]);
        assert_eq!(store.len(), store.capacity());
    }

    #[test]
    fn test_feedback_attached_once() {
        let store = LearningStore::default();
        store.record(&transaction("TX1"), &customer(), &assessment("local", RiskLevel::Medium));

        let outcome = store.submit_feedback("TX1", Feedback::new(RiskLevel::Medium));
        assert!(matches!(
            outcome,
            FeedbackOutcome::Applied { ref backend, performance }
                if backend == "local" && (performance - 0.84).abs() < 1e-9
        ));

        let outcome = store.submit_feedback("TX1", Feedback::new(RiskLevel::High));
        assert_eq!(outcome, FeedbackOutcome::AlreadyReviewed);
        assert!((store.backend_performance("local") - 0.84).abs() < 1e-9);
    }

    #[test]
    fn test_feedback_targets_most_recent_entry() {
        let store = LearningStore::default();
        store.record(&transaction("TX1"), &customer(), &assessment("external", RiskLevel::Low));
        store.record(&transaction("TX1"), &customer(), &assessment("local", RiskLevel::Low));

        let outcome = store.submit_feedback("TX1", Feedback::new(RiskLevel::Severe).with_notes("confirmed SAR"));
        match outcome {
            FeedbackOutcome::Applied { backend, performance } => {
                assert_eq!(backend, "local");
                assert!((performance - 0.64).abs() < 1e-9);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let entries = store.entries();
        assert!(entries[0].feedback.is_none());
        assert!(entries[1].feedback.is_some());
        assert_eq!(store.backend_performance("external"), 0.8);
    }

    #[test]
    fn test_unknown_transaction_not_found() {
        let store = LearningStore::default();
        assert_eq!(store.submit_feedback("NOPE", Feedback::new(RiskLevel::Low)), FeedbackOutcome::NotFound);
    }

    #[test]
    fn test_feedback_loop_disabled_leaves_metrics() {
        let store = LearningStore::from_config(&LearningConfig {
            feedback_loop: false,
            ..LearningConfig::default()
        });
        store.record(&transaction("TX1"), &customer(), &assessment("local", RiskLevel::Low));

        store.submit_feedback("TX1", Feedback::new(RiskLevel::Severe));
        assert!(store.performance_snapshot().is_empty());
        assert!(store.entries()[0].feedback.is_some());
    }
}
