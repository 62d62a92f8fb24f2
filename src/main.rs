use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

use rice_runner::batch::{BatchJob, BatchRunner};
use rice_runner::config::RunnerConfig;
use rice_runner::driver::webdriver::WebDriverFactory;
use rice_runner::driver::DriverFactory;
use rice_runner::email::{EmailVerifier, MailboxApiVerifier};
use rice_runner::engine::RunSummary;
use rice_runner::loader;
use rice_runner::progress::TracingProgress;
use rice_runner::protocol::RunReport;
use rice_runner::storage::{Persistence, SqliteStore};
use rice_runner::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};
use rice_runner::validation;

#[derive(Parser)]
#[command(name = "rice-runner")]
#[command(about = "Runs recorded browser UI test scenarios", long_about = None)]
#[command(version)]
struct Cli {
    /// SQLite database with scenarios, steps and results
    #[arg(long, global = true, env = "RICE_DATABASE")]
    db: Option<PathBuf>,

    /// WebDriver endpoint (chromedriver, geckodriver, Selenium Grid)
    #[arg(long, global = true, env = "RICE_WEBDRIVER_URL")]
    webdriver_url: Option<String>,

    /// Test mailbox API used by check_email steps
    #[arg(long, global = true, env = "RICE_MAILBOX_URL")]
    mailbox_url: Option<String>,

    /// Debug-level logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs one scenario
    Run {
        /// Scenario key
        #[arg(short, long)]
        scenario: String,

        /// User whose browser configuration is used
        #[arg(short, long, default_value = "default")]
        user: String,

        /// Path to the JSON report (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Runs several scenarios in parallel, one browser each
    Batch {
        /// Scenario keys; all stored scenarios if omitted
        #[arg(short, long)]
        scenario: Vec<String>,

        #[arg(short, long, default_value = "default")]
        user: String,

        /// Maximum browsers open at once
        #[arg(long, env = "RICE_MAX_PARALLEL")]
        max_parallel: Option<usize>,

        /// Path to the JSON report array (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Imports a JSON scenario bundle into the database
    Import {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Validates a JSON scenario bundle without importing it
    Validate {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Shows the last status of stored scenarios
    Status {
        #[arg(short, long)]
        scenario: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    if let Err(e) = init_telemetry(TelemetryConfig::from_env().with_log_level(level)) {
        eprintln!("⚠️  Telemetria indisponível: {:#}", e);
    }

    let outcome = dispatch(cli).await;
    shutdown_telemetry();

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            ExitCode::from(2)
        }
    }
}

/// `Ok(false)` quando algo rodou mas falhou (cenário, validação).
async fn dispatch(cli: Cli) -> Result<bool> {
    let mut config = RunnerConfig::from_env();
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    if let Some(url) = cli.webdriver_url {
        config.webdriver_url = url;
    }
    if let Some(url) = cli.mailbox_url.filter(|u| !u.trim().is_empty()) {
        config.mailbox_url = Some(url);
    }

    match cli.command {
        Commands::Run { scenario, user, output } => run_scenario(&config, &scenario, &user, output.as_deref()).await,
        Commands::Batch {
            scenario,
            user,
            max_parallel,
            output,
        } => {
            if let Some(n) = max_parallel {
                config.max_parallel = n;
            }
            run_batch(&config, scenario, &user, output.as_deref()).await
        }
        Commands::Import { file } => import_bundle(&config, &file),
        Commands::Validate { file } => validate_bundle(&file),
        Commands::Status { scenario } => show_status(&config, scenario.as_deref()),
    }
}

fn open_store(config: &RunnerConfig) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("Failed to open database {:?}", config.database_path))?;
    Ok(Arc::new(store))
}

fn email_verifier(config: &RunnerConfig) -> Option<Arc<dyn EmailVerifier>> {
    config
        .mailbox_url
        .as_ref()
        .map(|url| Arc::new(MailboxApiVerifier::new(url.as_str())) as Arc<dyn EmailVerifier>)
}

async fn run_scenario(config: &RunnerConfig, scenario: &str, user: &str, output: Option<&Path>) -> Result<bool> {
    let store = open_store(config)?;
    let runner = batch_runner(config, store, 1);

    // Browser que não abre vira cenário `failed` gravado, como no lote.
    let summary = runner.run_one(BatchJob::new(scenario, user)).await;

    print_summary(&summary);
    write_report(&summary.to_report(), output)?;
    Ok(summary.succeeded())
}

fn batch_runner(config: &RunnerConfig, store: Arc<SqliteStore>, max_parallel: usize) -> BatchRunner {
    let factory: Arc<dyn DriverFactory> = Arc::new(WebDriverFactory::new(
        config.webdriver_url.clone(),
        config.timeouts.page_load,
    ));
    let runner = BatchRunner::new(
        factory,
        store,
        Arc::new(TracingProgress),
        config.timeouts.clone(),
        max_parallel,
    );
    match email_verifier(config) {
        Some(email) => runner.with_email(email),
        None => runner,
    }
}

async fn run_batch(config: &RunnerConfig, scenarios: Vec<String>, user: &str, output: Option<&Path>) -> Result<bool> {
    let store = open_store(config)?;
    let keys = if scenarios.is_empty() {
        store.scenario_keys()?
    } else {
        scenarios
    };
    if keys.is_empty() {
        println!("📭 Nenhum cenário para executar");
        return Ok(true);
    }

    let batch = batch_runner(config, store, config.max_parallel);

    let jobs = keys.into_iter().map(|key| BatchJob::new(key, user)).collect();
    let summaries = batch.run(jobs).await;

    for summary in &summaries {
        print_summary(summary);
    }
    let reports: Vec<RunReport> = summaries.iter().map(RunSummary::to_report).collect();
    write_report(&reports, output)?;

    Ok(summaries.iter().all(RunSummary::succeeded))
}

fn import_bundle(config: &RunnerConfig, file: &Path) -> Result<bool> {
    let bundle = loader::load_bundle_from_file(file)?;
    if let Err(errors) = validation::validate_bundle(&bundle) {
        print_validation_errors(&errors);
        return Ok(false);
    }

    let store = open_store(config)?;
    store.import(&bundle)?;
    println!(
        "📥 Importados: {} cenário(s), {} template(s), {} usuário(s)",
        bundle.scenarios.len(),
        bundle.templates.len(),
        bundle.users.len()
    );
    Ok(true)
}

fn validate_bundle(file: &Path) -> Result<bool> {
    let bundle = loader::load_bundle_from_file(file)?;
    match validation::validate_bundle(&bundle) {
        Ok(()) => {
            println!("✅ Pacote válido: {} cenário(s)", bundle.scenarios.len());
            Ok(true)
        }
        Err(errors) => {
            print_validation_errors(&errors);
            Ok(false)
        }
    }
}

fn show_status(config: &RunnerConfig, scenario: Option<&str>) -> Result<bool> {
    let store = open_store(config)?;
    let keys = match scenario {
        Some(key) => vec![key.to_string()],
        None => store.scenario_keys()?,
    };

    for key in keys {
        let status = store.scenario_status(&key)?;
        let when = status
            .last_executed_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<24} {:<10} {}", key, status.status.as_str(), when);
    }
    Ok(true)
}

fn print_summary(summary: &RunSummary) {
    let icon = if summary.succeeded() { "✅" } else { "❌" };
    println!(
        "{} {} [{}] {}/{} steps",
        icon,
        summary.scenario_key,
        summary.status.as_str(),
        summary.steps.len(),
        summary.total_steps
    );
    if let Some(error) = &summary.error {
        println!("   {}", error);
    }
    for step in summary.steps.iter().filter(|s| s.is_failed()) {
        println!("   step {} ({}): {}", step.order, step.name, step.error.as_deref().unwrap_or("-"));
    }
}

fn print_validation_errors(errors: &[validation::ValidationError]) {
    eprintln!("❌ Pacote inválido ({} erro(s)):", errors.len());
    for error in errors {
        eprintln!("   [{}] {}", error.code(), error);
    }
}

fn write_report<T: serde::Serialize>(report: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Failed to write report {:?}", path))?;
            println!("📄 Report saved to: {:?}", path);
        }
        None => println!("\n--- Execution Report ---\n{}", json),
    }
    Ok(())
}
