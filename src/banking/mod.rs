pub mod simulation;

use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;
use log::{info, warn};
use thiserror::Error;

use crate::config::{Config, CoreSystem};
use crate::models::{Alert, CustomerProfile, Transaction};

pub use simulation::SimulationSystem;

/// Error types for data source operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BankingError {
    #[error("Data source unavailable: {0}")]
    DataSourceUnavailable(String),

    #[error("Customer not found: {0}")]
    CustomerNotFound(String),
}

/// Interface to a core banking system
#[async_trait]
pub trait BankSystem: Send + Sync {
    async fn get_customer_profile(&self, customer_id: &str) -> Result<CustomerProfile, BankingError>;

    /// Transactions of the last `days` days, most recent first
    async fn get_transaction_history(&self, customer_id: &str, days: u32) -> Result<Vec<Transaction>, BankingError>;

    async fn submit_alert(&self, alert: &Alert) -> Result<bool, BankingError>;

    async fn check_system_health(&self) -> Result<bool, BankingError>;
}

/// Constructor for a data source adapter
pub type BankSystemConstructor = fn(&Config) -> Arc<dyn BankSystem>;

fn simulation_system(config: &Config) -> Arc<dyn BankSystem> {
    Arc::new(SimulationSystem::from_config(config))
}

/// Data source chosen at startup
pub struct BankConnection {
    pub system: Arc<dyn BankSystem>,
    pub system_type: CoreSystem,
}

impl BankConnection {
    pub fn is_simulation(&self) -> bool {
        self.system_type == CoreSystem::Simulation
    }
}

/// Maps core system keys to adapter constructors
pub struct BankSystemFactory {
    constructors: HashMap<CoreSystem, BankSystemConstructor>,
}

impl BankSystemFactory {
    /// Factory with the simulation adapter registered
    pub fn new() -> Self {
        let mut factory = BankSystemFactory {
            constructors: HashMap::new(),
        };
        factory.register(CoreSystem::Simulation, simulation_system);
        factory
    }

    /// Register an adapter for a core system, replacing any previous one
    pub fn register(&mut self, system: CoreSystem, constructor: BankSystemConstructor) {
        self.constructors.insert(system, constructor);
    }

    pub fn is_registered(&self, system: CoreSystem) -> bool {
        self.constructors.contains_key(&system)
    }

    pub fn create(&self, config: &Config) -> BankConnection {
        let requested = match config.banking.core_system {
            CoreSystem::Auto | CoreSystem::Simulation => CoreSystem::Simulation,
            other if config.banking.simulation_mode => {
                info!("Simulation mode enabled, not connecting to core system {}", other);
                CoreSystem::Simulation
            }
            other => other,
        };

        let (system_type, constructor) = match self.constructors.get(&requested) {
            Some(constructor) => (requested, *constructor),
            None => {
                warn!(
                    "No adapter registered for core system {}, falling back to simulation",
                    requested
                );
                let constructor = self
                    .constructors
                    .get(&CoreSystem::Simulation)
                    .copied()
                    .unwrap_or(simulation_system as BankSystemConstructor);
                (CoreSystem::Simulation, constructor)
            }
        };

        if system_type == CoreSystem::Simulation {
            info!("Running in simulation mode - no real bank system connected");
        } else {
            info!("Connected to core banking system {}", system_type);
        }

        BankConnection {
            system: constructor(config),
            system_type,
        }
    }
}

impl Default for BankSystemFactory {
    fn default() -> Self {
        Self::new()
    }
}
