use std::fs;
use std::path::PathBuf;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use log::{info, warn};
use rust_decimal_macros::dec;
use serde::Deserialize;

use aml_assistant::config::{self, Config, DEFAULT_CONFIG_PATH};
use aml_assistant::models::{AnalysisResult, Channel, Transaction, TransactionType};
use aml_assistant::utils::{self, format_amount};
use aml_assistant::AmlAssistant;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyse the sample transactions against the simulated bank
    Demo,

    /// Print the system status as JSON
    Status,

    /// Analyse transactions from a JSON file (one object or an array)
    Analyze {
        file: PathBuf,
    },

    /// Write the default configuration file
    InitConfig {
        path: Option<PathBuf>,
    },
}

// A single transaction or a batch
#[derive(Deserialize)]
#[serde(untagged)]
enum TransactionInput {
    Many(Vec<Transaction>),
    One(Transaction),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let cli = Cli::parse();

    if let Command::InitConfig { path } = &cli.command {
        utils::logging::init_logger("info");
        let path = path.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Config::default().save_to_file(&path)?;
        info!("Default configuration written to {}", path.display());
        return Ok(());
    }

    let config = config::load_config()?;
    utils::logging::init_logger(&config.logging.level);
    info!("Configuration loaded: {}", config.summary());

    let assistant = AmlAssistant::new(config)?;

    match cli.command {
        Command::Demo => run_demo(&assistant).await?,
        Command::Status => {
            let status = assistant.get_system_status();
            println!("{}", serde_json::to_string_pretty(&status)?);
            if !assistant.check_health().await {
                warn!("Data source reported unhealthy");
            }
        }
        Command::Analyze { file } => {
            let contents = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let transactions = match serde_json::from_str::<TransactionInput>(&contents)
                .with_context(|| format!("Failed to parse transactions in {}", file.display()))?
            {
                TransactionInput::Many(transactions) => transactions,
                TransactionInput::One(transaction) => vec![transaction],
            };

            for transaction in &transactions {
                match assistant.analyze_transaction(transaction).await {
                    Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                    Err(e) => warn!("Analysis of {} failed: {}", transaction.transaction_id, e),
                }
            }
        }
        Command::InitConfig { .. } => {}
    }

    Ok(())
}

async fn run_demo(assistant: &AmlAssistant) -> Result<()> {
    let samples = vec![
        Transaction::new("TX_DEMO_001", "CUST002", dec!(2500.00), TransactionType::WireTransfer, Channel::Online)
            .with_counterparty("Cloud Hosting Ltd")
            .with_description("Monthly infrastructure invoice"),
        Transaction::new("TX_DEMO_002", "CUST003", dec!(15000.00), TransactionType::CashDeposit, Channel::Branch)
            .with_description("Cash deposit"),
        Transaction::new("TX_DEMO_003", "CUST001", dec!(9500.00), TransactionType::CashDeposit, Channel::Branch)
            .with_description("Daily takings"),
    ];

    for transaction in &samples {
        let result = assistant.analyze_transaction(transaction).await?;
        print_result(transaction, &result);
    }

    let status = assistant.get_system_status();
    println!(
        "\nAlerts raised: {}, learning entries: {}, primary backend: {}",
        status.alerts_processed, status.learning_entries, status.scoring.primary_provider
    );

    Ok(())
}

fn print_result(transaction: &Transaction, result: &AnalysisResult) {
    let assessment = &result.risk_assessment;

    println!("\n{} ({} {})", transaction.transaction_id, format_amount(transaction.amount, &transaction.currency), transaction.customer_id);
    println!("  level:      {} (score {:.2}, confidence {:.2})", assessment.risk_level, assessment.risk_score, assessment.confidence);
    println!("  backend:    {}{}", assessment.backend, if assessment.fallback_used { " (fallback)" } else { "" });
    if !assessment.detected_patterns.is_empty() {
        println!("  patterns:   {}", assessment.detected_patterns.join(", "));
    }
    if !assessment.risk_factors.is_empty() {
        println!("  factors:    {}", assessment.risk_factors.join(", "));
    }
    println!("  actions:    {}", assessment.recommended_actions.join(", "));
    if let Some(alert_id) = &result.alert_id {
        println!("  alert:      {}", alert_id);
    }
}
