use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use log::{info, warn};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::utils::mask_secret;

pub const DEFAULT_CONFIG_PATH: &str = "config/aml_config.toml";

/// Error types for configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("Failed to access configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Which scoring provider is primary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderSelection {
    /// External service when a credential is present, local otherwise
    #[default]
    Auto,
    Local,
    #[serde(alias = "openai")]
    External,
    Hybrid,
}

impl ProviderSelection {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(ProviderSelection::Auto),
            "local" => Some(ProviderSelection::Local),
            "external" | "openai" => Some(ProviderSelection::External),
            "hybrid" => Some(ProviderSelection::Hybrid),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderSelection::Auto => "auto",
            ProviderSelection::Local => "local",
            ProviderSelection::External => "external",
            ProviderSelection::Hybrid => "hybrid",
        }
    }
}

/// Core banking system selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CoreSystem {
    #[default]
    Auto,
    Simulation,
    Temenos,
    Flexcube,
    Finacle,
    ApiCustom,
}

impl CoreSystem {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(CoreSystem::Auto),
            "simulation" => Some(CoreSystem::Simulation),
            "temenos" | "t24" => Some(CoreSystem::Temenos),
            "flexcube" => Some(CoreSystem::Flexcube),
            "finacle" => Some(CoreSystem::Finacle),
            "api_custom" | "custom" => Some(CoreSystem::ApiCustom),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CoreSystem::Auto => "auto",
            CoreSystem::Simulation => "simulation",
            CoreSystem::Temenos => "temenos",
            CoreSystem::Flexcube => "flexcube",
            CoreSystem::Finacle => "finacle",
            CoreSystem::ApiCustom => "api_custom",
        }
    }
}

impl fmt::Display for CoreSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scoring provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub provider: ProviderSelection,
    /// Never written back to disk
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub enable_learning: bool,
    pub confidence_threshold: f64,
    /// Seed confidence of the local composite backend
    pub local_base_confidence: f64,
    /// Per backend call
    pub backend_timeout_ms: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        AiConfig {
            provider: ProviderSelection::Auto,
            api_key: None,
            model: "gpt-4".to_string(),
            endpoint: "http://localhost:8088/v1/aml/score".to_string(),
            enable_learning: true,
            confidence_threshold: 0.7,
            local_base_confidence: 0.7,
            backend_timeout_ms: 2000,
        }
    }
}

impl AiConfig {
    pub fn has_valid_credential(&self) -> bool {
        self.api_key
            .as_deref()
            .map(is_well_formed_credential)
            .unwrap_or(false)
    }

    /// Provider name with `auto` resolved
    pub fn primary_provider(&self) -> ProviderSelection {
        match self.provider {
            ProviderSelection::Auto if self.has_valid_credential() => ProviderSelection::External,
            ProviderSelection::Auto => ProviderSelection::Local,
            other => other,
        }
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }
}

/// Credentials for the external scoring service look like `sk-<token>`
pub fn is_well_formed_credential(key: &str) -> bool {
    key.starts_with("sk-")
        && key.len() >= 20
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Core banking integration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BankingConfig {
    pub simulation_mode: bool,
    pub core_system: CoreSystem,
    /// Days of history fetched as analysis context
    pub history_days: u32,
    pub simulated_latency_ms: u64,
}

impl Default for BankingConfig {
    fn default() -> Self {
        BankingConfig {
            simulation_mode: true,
            core_system: CoreSystem::Auto,
            history_days: 30,
            simulated_latency_ms: 50,
        }
    }
}

/// Thresholds used by scoring and level mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Currency transaction report threshold
    pub ctr_threshold: Decimal,
    /// Lower edge of the structuring band
    pub suspicious_threshold: Decimal,
    pub medium_risk_score: f64,
    pub high_risk_score: f64,
    pub severe_risk_score: f64,
    pub severe_on_pep: bool,
    pub severe_on_sanctions: bool,
    /// Score added per detected pattern
    pub pattern_score_uplift: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            ctr_threshold: dec!(10000),
            suspicious_threshold: dec!(8000),
            medium_risk_score: 40.0,
            high_risk_score: 70.0,
            severe_risk_score: 90.0,
            severe_on_pep: true,
            severe_on_sanctions: true,
            pattern_score_uplift: 15.0,
        }
    }
}

/// Learning store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub pattern_memory_size: usize,
    pub feedback_loop: bool,
    /// Weight of the newest feedback in the moving average
    pub performance_smoothing: f64,
    pub default_backend_performance: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        LearningConfig {
            pattern_memory_size: 1000,
            feedback_loop: true,
            performance_smoothing: 0.2,
            default_backend_performance: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

/// Immutable snapshot of operational parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ai: AiConfig,
    pub banking: BankingConfig,
    pub risk: RiskConfig,
    pub learning: LearningConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        fs::write(path, contents).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// One-line description with the credential masked
    pub fn summary(&self) -> String {
        format!(
            "provider={}, api_key={}, core_system={}, simulation_mode={}",
            self.ai.primary_provider().as_str(),
            self.ai.api_key.as_deref().map(mask_secret).unwrap_or_else(|| "none".to_string()),
            self.banking.core_system,
            self.banking.simulation_mode,
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let risk = &self.risk;

        if risk.ctr_threshold <= Decimal::ZERO {
            return Err(invalid("risk.ctr_threshold must be positive"));
        }
        if risk.suspicious_threshold < Decimal::ZERO || risk.suspicious_threshold >= risk.ctr_threshold {
            return Err(invalid("risk.suspicious_threshold must lie in [0, ctr_threshold)"));
        }
        if !(0.0 < risk.medium_risk_score
            && risk.medium_risk_score < risk.high_risk_score
            && risk.high_risk_score <= risk.severe_risk_score
            && risk.severe_risk_score <= 100.0)
        {
            return Err(invalid(
                "risk scores must satisfy 0 < medium < high <= severe <= 100",
            ));
        }
        if risk.pattern_score_uplift < 0.0 {
            return Err(invalid("risk.pattern_score_uplift must not be negative"));
        }
        if !(0.0..=1.0).contains(&self.ai.local_base_confidence) {
            return Err(invalid("ai.local_base_confidence must lie in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.ai.confidence_threshold) {
            return Err(invalid("ai.confidence_threshold must lie in [0, 1]"));
        }
        if self.ai.backend_timeout_ms == 0 {
            return Err(invalid("ai.backend_timeout_ms must be positive"));
        }
        if self.learning.pattern_memory_size == 0 {
            return Err(invalid("learning.pattern_memory_size must be positive"));
        }
        if !(self.learning.performance_smoothing > 0.0 && self.learning.performance_smoothing <= 1.0) {
            return Err(invalid("learning.performance_smoothing must lie in (0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.learning.default_backend_performance) {
            return Err(invalid("learning.default_backend_performance must lie in [0, 1]"));
        }
        if self.ai.provider == ProviderSelection::External && !self.ai.has_valid_credential() {
            warn!("External scoring provider selected without a valid credential; requests will fall back");
        }

        Ok(())
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ConfigurationInvalid(message.to_string())
}

/// Load configuration from file and environment, then validate it
pub fn load_config() -> Result<Config, ConfigError> {
    let path = env::var("AML_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = if path.exists() {
        info!("Loading configuration from {}", path.display());
        Config::from_file(&path)?
    } else {
        info!("No configuration file at {}, using defaults", path.display());
        Config::default()
    };

    apply_env_overrides(&mut config, env::vars());
    config.validate()?;

    Ok(config)
}

/// Apply overrides from environment variables and detect the banking environment
pub fn apply_env_overrides<I>(config: &mut Config, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    let vars: HashMap<String, String> = vars.into_iter().collect();

    if let Some(provider) = vars.get("AML_PROVIDER") {
        match ProviderSelection::parse(provider) {
            Some(provider) => config.ai.provider = provider,
            None => warn!("Ignoring unknown AML_PROVIDER value: {}", provider),
        }
    }

    if let Some(key) = vars.get("AML_API_KEY").or_else(|| vars.get("OPENAI_API_KEY")) {
        if config.ai.api_key.is_none() {
            config.ai.api_key = Some(key.clone());
        }
    }

    if let Some(endpoint) = vars.get("AML_SCORING_ENDPOINT") {
        config.ai.endpoint = endpoint.clone();
    }

    if let Some(model) = vars.get("AML_MODEL") {
        config.ai.model = model.clone();
    }

    if let Some(enabled) = vars.get("AML_ENABLE_LEARNING") {
        if let Ok(enabled) = enabled.parse() {
            config.ai.enable_learning = enabled;
        }
    }

    if let Some(timeout) = vars.get("AML_BACKEND_TIMEOUT_MS") {
        if let Ok(timeout) = timeout.parse() {
            config.ai.backend_timeout_ms = timeout;
        }
    }

    if let Some(score) = vars.get("AML_HIGH_RISK_SCORE") {
        if let Ok(score) = score.parse() {
            config.risk.high_risk_score = score;
        }
    }

    if let Some(size) = vars.get("AML_MEMORY_SIZE") {
        if let Ok(size) = size.parse() {
            config.learning.pattern_memory_size = size;
        }
    }

    if let Some(level) = vars.get("LOG_LEVEL") {
        config.logging.level = level.clone();
    }

    if let Some(system) = vars.get("AML_CORE_SYSTEM") {
        match CoreSystem::parse(system) {
            Some(system) => config.banking.core_system = system,
            None => warn!("Ignoring unknown AML_CORE_SYSTEM value: {}", system),
        }
    }

    if let Some(simulation) = vars.get("AML_SIMULATION_MODE") {
        if let Ok(simulation) = simulation.parse() {
            config.banking.simulation_mode = simulation;
        }
    }

    if config.banking.core_system == CoreSystem::Auto {
        detect_banking_system(config, &vars);
    }
}

// Environment variables that reveal an installed core banking system
const BANKING_INDICATORS: [(&str, CoreSystem); 4] = [
    ("T24_HOME", CoreSystem::Temenos),
    ("FLEXCUBE_HOME", CoreSystem::Flexcube),
    ("FINACLE_PATH", CoreSystem::Finacle),
    ("BANKING_API_URL", CoreSystem::ApiCustom),
];

fn detect_banking_system(config: &mut Config, vars: &HashMap<String, String>) {
    let detected = BANKING_INDICATORS
        .iter()
        .find(|(indicator, _)| vars.get(*indicator).map(|v| !v.is_empty()).unwrap_or(false))
        .map(|(_, system)| *system);

    match detected {
        Some(system) => {
            info!("Detected core banking system: {}", system);
            config.banking.core_system = system;
            config.banking.simulation_mode = false;
        }
        None => {
            config.banking.core_system = CoreSystem::Simulation;
            config.banking.simulation_mode = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ai.provider, ProviderSelection::Auto);
        assert_eq!(config.risk.ctr_threshold, dec!(10000));
        assert_eq!(config.risk.high_risk_score, 70.0);
        assert_eq!(config.learning.pattern_memory_size, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_auto_provider_resolution() {
        let mut config = Config::default();
        assert_eq!(config.ai.primary_provider(), ProviderSelection::Local);

        config.ai.api_key = Some("not-a-key".to_string());
        assert_eq!(config.ai.primary_provider(), ProviderSelection::Local);

        config.ai.api_key = Some("sk-test0123456789abcdef".to_string());
        assert_eq!(config.ai.primary_provider(), ProviderSelection::External);

        config.ai.provider = ProviderSelection::Hybrid;
        assert_eq!(config.ai.primary_provider(), ProviderSelection::Hybrid);
    }

    #[test]
    fn test_credential_shape() {
        assert!(is_well_formed_credential("sk-abcdefghijklmnopqrstuvwxyz"));
        assert!(!is_well_formed_credential("sk-short"));
        assert!(!is_well_formed_credential("pk-abcdefghijklmnopqrstuvwxyz"));
        assert!(!is_well_formed_credential("sk-abcdefghij klmnopqrstuvwxyz"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [ai]
            provider = "openai"

            [risk]
            high_risk_score = 75.0
            "#,
        )
        .unwrap();

        assert_eq!(config.ai.provider, ProviderSelection::External);
        assert_eq!(config.risk.high_risk_score, 75.0);
        assert_eq!(config.risk.medium_risk_score, 40.0);
        assert_eq!(config.learning.pattern_memory_size, 1000);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let mut config = Config::default();
        config.risk.medium_risk_score = 80.0;
        assert!(matches!(config.validate(), Err(ConfigError::ConfigurationInvalid(_))));

        let mut config = Config::default();
        config.risk.suspicious_threshold = dec!(12000);
        assert!(matches!(config.validate(), Err(ConfigError::ConfigurationInvalid(_))));

        let mut config = Config::default();
        config.learning.pattern_memory_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ConfigurationInvalid(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        apply_env_overrides(
            &mut config,
            vars(&[
                ("AML_PROVIDER", "hybrid"),
                ("OPENAI_API_KEY", "sk-test0123456789abcdef"),
                ("AML_BACKEND_TIMEOUT_MS", "250"),
                ("AML_MEMORY_SIZE", "not-a-number"),
            ]),
        );

        assert_eq!(config.ai.provider, ProviderSelection::Hybrid);
        assert!(config.ai.has_valid_credential());
        assert_eq!(config.ai.backend_timeout(), Duration::from_millis(250));
        assert_eq!(config.learning.pattern_memory_size, 1000);
        assert_eq!(config.banking.core_system, CoreSystem::Simulation);
        assert!(config.banking.simulation_mode);
    }

    #[test]
    fn test_banking_auto_detection() {
        let mut config = Config::default();
        apply_env_overrides(&mut config, vars(&[("FLEXCUBE_HOME", "/opt/flexcube")]));
        assert_eq!(config.banking.core_system, CoreSystem::Flexcube);
        assert!(!config.banking.simulation_mode);

        // Explicit selection wins over detection
        let mut config = Config::default();
        config.banking.core_system = CoreSystem::Simulation;
        apply_env_overrides(&mut config, vars(&[("T24_HOME", "/opt/t24")]));
        assert_eq!(config.banking.core_system, CoreSystem::Simulation);
    }

    #[test]
    fn test_saved_config_does_not_contain_credential() {
        let mut config = Config::default();
        config.ai.api_key = Some("sk-test0123456789abcdef".to_string());

        let path = env::temp_dir().join(format!("aml_config_{}.toml", uuid::Uuid::new_v4()));
        config.save_to_file(&path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("sk-test"));

        let reloaded = Config::from_file(&path).unwrap();
        assert_eq!(reloaded.risk.ctr_threshold, config.risk.ctr_threshold);
        assert!(reloaded.ai.api_key.is_none());

        fs::remove_file(&path).unwrap();
    }
}
