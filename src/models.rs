use std::fmt;
use rust_decimal::Decimal;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

// Define core types
pub type TransactionId = String;
pub type CustomerId = String;
pub type BackendId = String;
pub type Amount = Decimal;

/// Type of a banking transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    CashDeposit,
    CashWithdrawal,
    WireTransfer,
    InternationalWire,
    AchTransfer,
    CardPayment,
    CheckDeposit,
    InternalTransfer,
}

impl TransactionType {
    pub fn is_cash(&self) -> bool {
        matches!(self, TransactionType::CashDeposit | TransactionType::CashWithdrawal)
    }

    pub fn is_wire(&self) -> bool {
        matches!(self, TransactionType::WireTransfer | TransactionType::InternationalWire)
    }
}

/// Channel the transaction was initiated through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Branch,
    Online,
    Mobile,
    Atm,
    Correspondent,
}

/// A transaction submitted for analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub customer_id: CustomerId,
    pub amount: Amount,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub channel: Channel,
    #[serde(default)]
    pub counterparty: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Transaction {
    pub fn new(
        transaction_id: impl Into<String>,
        customer_id: impl Into<String>,
        amount: Amount,
        transaction_type: TransactionType,
        channel: Channel,
    ) -> Self {
        Transaction {
            transaction_id: transaction_id.into(),
            customer_id: customer_id.into(),
            amount,
            currency: default_currency(),
            transaction_type,
            channel,
            counterparty: String::new(),
            description: String::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_counterparty(mut self, counterparty: impl Into<String>) -> Self {
        self.counterparty = counterparty.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

// Customer risk tier as held by the core banking system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    LowRisk,
    MediumRisk,
    HighRisk,
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RiskTier::LowRisk => "low_risk",
            RiskTier::MediumRisk => "medium_risk",
            RiskTier::HighRisk => "high_risk",
        };
        write!(f, "{}", name)
    }
}

// KYC verification status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    Verified,
    Pending,
    EnhancedDueDiligence,
    Expired,
    Unverified,
}

impl KycStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, KycStatus::Verified | KycStatus::EnhancedDueDiligence)
    }
}

/// Customer profile, owned by the data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub customer_id: CustomerId,
    pub name: String,
    pub business_type: String,
    pub risk_tier: RiskTier,
    pub kyc_status: KycStatus,
    pub pep_status: bool,
    pub sanctions_match: bool,
    pub monthly_volume: Amount,
    pub account_age_days: u32,
    pub account_balance: Amount,
}

/// Everything a scoring backend gets to see about the customer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerContext {
    pub profile: CustomerProfile,
    /// Most recent first
    pub recent_transactions: Vec<Transaction>,
}

impl CustomerContext {
    pub fn new(profile: CustomerProfile, recent_transactions: Vec<Transaction>) -> Self {
        CustomerContext {
            profile,
            recent_transactions,
        }
    }
}

/// Risk level of an assessment, totally ordered from low to severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Severe,
}

impl RiskLevel {
    pub fn requires_alert(&self) -> bool {
        *self >= RiskLevel::High
    }

    pub fn rank(&self) -> u8 {
        match self {
            RiskLevel::Low => 0,
            RiskLevel::Medium => 1,
            RiskLevel::High => 2,
            RiskLevel::Severe => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Severe => "severe",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of a scoring backend for one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    /// 0 to 100
    pub risk_score: f64,
    pub risk_factors: Vec<String>,
    pub detected_patterns: Vec<String>,
    pub recommended_actions: Vec<String>,
    /// 0.0 to 1.0
    pub confidence: f64,
    pub backend: BackendId,
    pub fallback_used: bool,
    pub analysis_method: String,
}

// Where the analysis ran
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub bank_system: String,
    pub simulation_mode: bool,
    pub analysis_method: String,
}

// Customer context summary attached to a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisContext {
    pub customer_risk_tier: RiskTier,
    pub transaction_count: usize,
    pub customer_since_days: u32,
}

/// The externally visible result of analysing one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub transaction_id: TransactionId,
    pub timestamp: DateTime<Utc>,
    pub risk_assessment: RiskAssessment,
    pub system_info: SystemInfo,
    pub context: AnalysisContext,
    pub alert_id: Option<String>,
}

/// Alert raised for a high or severe assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,
    pub sequence: u64,
    pub transaction_id: TransactionId,
    pub customer_id: CustomerId,
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    pub detected_patterns: Vec<String>,
    pub reasoning: String,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn format_id(sequence: u64) -> String {
        format!("ALERT_{:06}", sequence)
    }
}

/// Human-reviewed correction for an earlier assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub risk_level: RiskLevel,
    pub risk_score: Option<f64>,
    pub notes: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl Feedback {
    pub fn new(risk_level: RiskLevel) -> Self {
        Feedback {
            risk_level,
            risk_score: None,
            notes: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Severe);
        assert!(!RiskLevel::Medium.requires_alert());
        assert!(RiskLevel::High.requires_alert());
        assert!(RiskLevel::Severe.requires_alert());
    }

    #[test]
    fn test_transaction_json_uses_snake_case_names() {
        let json = r#"{
            "transaction_id": "TX100",
            "customer_id": "CUST001",
            "amount": "9500.00",
            "type": "cash_deposit",
            "channel": "branch"
        }"#;

        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.amount, dec!(9500.00));
        assert_eq!(tx.transaction_type, TransactionType::CashDeposit);
        assert_eq!(tx.channel, Channel::Branch);
        assert_eq!(tx.currency, "USD");
        assert!(tx.transaction_type.is_cash());
    }

    #[test]
    fn test_alert_id_format() {
        assert_eq!(Alert::format_id(1), "ALERT_000001");
        assert_eq!(Alert::format_id(1234567), "ALERT_1234567");
    }
}
