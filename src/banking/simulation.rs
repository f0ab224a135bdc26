use std::collections::HashMap;
use std::time::Duration;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use rust_decimal_macros::dec;
use serde::{Serialize, Deserialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{BankSystem, BankingError};
use crate::config::Config;
use crate::models::{
    Alert, Channel, CustomerId, CustomerProfile, KycStatus, RiskTier, Transaction, TransactionType,
};

// Case status of an alert held by the simulated bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Open,
    UnderInvestigation,
    Closed,
}

/// Alert as stored by the simulated case management system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedAlert {
    pub alert: Alert,
    pub case_reference: Uuid,
    pub submitted_at: DateTime<Utc>,
    pub status: AlertStatus,
}

/// In-memory core banking simulation for development and testing
pub struct SimulationSystem {
    customers: RwLock<HashMap<CustomerId, CustomerProfile>>,
    transactions: RwLock<Vec<Transaction>>,
    alerts: RwLock<Vec<SubmittedAlert>>,
    latency: Duration,
}

impl SimulationSystem {
    /// Simulation seeded with the sample customers and history
    pub fn new() -> Self {
        let now = Utc::now();
        let customers = sample_customers()
            .into_iter()
            .map(|c| (c.customer_id.clone(), c))
            .collect();

        info!("Simulation system initialized");

        SimulationSystem {
            customers: RwLock::new(customers),
            transactions: RwLock::new(sample_transactions(now)),
            alerts: RwLock::new(Vec::new()),
            latency: Duration::ZERO,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new().with_latency(Duration::from_millis(config.banking.simulated_latency_ms))
    }

    /// Simulate API round-trip delay on every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub async fn add_customer(&self, profile: CustomerProfile) {
        let mut customers = self.customers.write().await;
        customers.insert(profile.customer_id.clone(), profile);
    }

    pub async fn record_transaction(&self, transaction: Transaction) {
        let mut transactions = self.transactions.write().await;
        transactions.push(transaction);
    }

    pub async fn submitted_alerts(&self) -> Vec<SubmittedAlert> {
        let alerts = self.alerts.read().await;
        alerts.clone()
    }

    async fn simulate_delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl Default for SimulationSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BankSystem for SimulationSystem {
    async fn get_customer_profile(&self, customer_id: &str) -> Result<CustomerProfile, BankingError> {
        self.simulate_delay().await;

        let customers = self.customers.read().await;
        customers
            .get(customer_id)
            .cloned()
            .ok_or_else(|| BankingError::CustomerNotFound(customer_id.to_string()))
    }

    async fn get_transaction_history(&self, customer_id: &str, days: u32) -> Result<Vec<Transaction>, BankingError> {
        self.simulate_delay().await;

        let since = Utc::now() - chrono::Duration::days(i64::from(days));
        let transactions = self.transactions.read().await;

        let mut history: Vec<Transaction> = transactions
            .iter()
            .filter(|tx| tx.customer_id == customer_id && tx.timestamp >= since)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        debug!("Simulation returned {} transactions for {}", history.len(), customer_id);
        Ok(history)
    }

    async fn submit_alert(&self, alert: &Alert) -> Result<bool, BankingError> {
        let mut alerts = self.alerts.write().await;
        alerts.push(SubmittedAlert {
            alert: alert.clone(),
            case_reference: Uuid::new_v4(),
            submitted_at: Utc::now(),
            status: AlertStatus::Open,
        });

        info!("Alert submitted: {}", alert.alert_id);
        Ok(true)
    }

    async fn check_system_health(&self) -> Result<bool, BankingError> {
        Ok(true)
    }
}

fn sample_customers() -> Vec<CustomerProfile> {
    vec![
        CustomerProfile {
            customer_id: "CUST001".to_string(),
            name: "John's Fine Dining Restaurant".to_string(),
            business_type: "Restaurant & Hospitality".to_string(),
            risk_tier: RiskTier::MediumRisk,
            kyc_status: KycStatus::Verified,
            pep_status: false,
            sanctions_match: false,
            monthly_volume: dec!(75000.00),
            account_age_days: 420,
            account_balance: dec!(150000.00),
        },
        CustomerProfile {
            customer_id: "CUST002".to_string(),
            name: "Tech Startup Inc.".to_string(),
            business_type: "Technology Services".to_string(),
            risk_tier: RiskTier::LowRisk,
            kyc_status: KycStatus::Verified,
            pep_status: false,
            sanctions_match: false,
            monthly_volume: dec!(50000.00),
            account_age_days: 180,
            account_balance: dec!(75000.00),
        },
        CustomerProfile {
            customer_id: "CUST003".to_string(),
            name: "Global Trading LLC".to_string(),
            business_type: "International Trade".to_string(),
            risk_tier: RiskTier::HighRisk,
            kyc_status: KycStatus::EnhancedDueDiligence,
            pep_status: true,
            sanctions_match: false,
            monthly_volume: dec!(500000.00),
            account_age_days: 730,
            account_balance: dec!(1000000.00),
        },
    ]
}

// History is anchored to start-up time so the day window always covers it
fn sample_transactions(now: DateTime<Utc>) -> Vec<Transaction> {
    vec![
        Transaction::new("TX001", "CUST001", dec!(9500.00), TransactionType::CashDeposit, Channel::Branch)
            .with_counterparty("Business Account")
            .with_timestamp(now - chrono::Duration::days(2)),
        Transaction::new("TX002", "CUST001", dec!(12000.00), TransactionType::WireTransfer, Channel::Online)
            .with_counterparty("Supplier Corp")
            .with_timestamp(now - chrono::Duration::days(3)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskLevel;

    #[tokio::test]
    async fn test_sample_customers_available() {
        let system = SimulationSystem::new();

        let profile = system.get_customer_profile("CUST003").await.unwrap();
        assert_eq!(profile.risk_tier, RiskTier::HighRisk);
        assert!(profile.pep_status);

        let missing = system.get_customer_profile("CUST999").await;
        assert_eq!(missing, Err(BankingError::CustomerNotFound("CUST999".to_string())));
    }

    #[tokio::test]
    async fn test_history_is_filtered_and_most_recent_first() {
        let system = SimulationSystem::new();
        system
            .record_transaction(
                Transaction::new("TX_OLD", "CUST001", dec!(100), TransactionType::CardPayment, Channel::Online)
                    .with_timestamp(Utc::now() - chrono::Duration::days(120)),
            )
            .await;

        let history = system.get_transaction_history("CUST001", 30).await.unwrap();
        let ids: Vec<&str> = history.iter().map(|tx| tx.transaction_id.as_str()).collect();
        assert_eq!(ids, vec!["TX001", "TX002"]);

        let empty = system.get_transaction_history("CUST002", 30).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_alerts_are_stored_open() {
        let system = SimulationSystem::new();
        let alert = Alert {
            alert_id: Alert::format_id(1),
            sequence: 1,
            transaction_id: "TX100".to_string(),
            customer_id: "CUST003".to_string(),
            risk_level: RiskLevel::Severe,
            risk_score: 92.0,
            detected_patterns: vec!["large_cash".to_string()],
            reasoning: "High risk transaction detected: politically_exposed_person".to_string(),
            timestamp: Utc::now(),
        };

        assert!(system.submit_alert(&alert).await.unwrap());

        let stored = system.submitted_alerts().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].alert, alert);
        assert_eq!(stored[0].status, AlertStatus::Open);
    }
}
