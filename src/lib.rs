// Anti-money-laundering transaction analysis
pub mod assistant;
pub mod banking;
pub mod config;
pub mod engine;
pub mod learning;
pub mod models;
pub mod scoring;
pub mod utils;

pub use assistant::{AmlAssistant, AssistantError, SystemStatus};
pub use config::Config;
