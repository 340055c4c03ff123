//! EzyScribe E2E CLI - Main Entry Point
//!
//! Runs the dashboard regression scenarios against a WebDriver endpoint and
//! prints a summary. Exit codes: 0 when every scenario passed, 1 when any
//! failed or was cancelled, 2 when the suite could not run.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use ezyscribe_common::SuiteConfig;

mod commands;
mod output;

use commands::{config, list, run};

/// EzyScribe E2E - Dashboard Regression Suite
#[derive(Parser)]
#[command(name = "ezyscribe-e2e")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file
    #[arg(
        short,
        long,
        env = "EZYSCRIBE_CONFIG",
        default_value = "ezyscribe-e2e.toml",
        global = true
    )]
    config: PathBuf,

    /// Dashboard base URL (overrides config)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// WebDriver endpoint (overrides config)
    #[arg(long, global = true)]
    webdriver_url: Option<String>,

    /// Show the browser window
    #[arg(long, global = true)]
    headed: bool,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scenarios
    Run(run::RunArgs),

    /// List available scenarios
    List(list::ListArgs),

    /// Inspect or create the configuration
    #[command(subcommand)]
    Config(config::ConfigCommands),

    /// Show version information
    Version,
}

impl Cli {
    /// File values, then `EZYSCRIBE_*` variables, then flags
    fn load_config(&self) -> Result<SuiteConfig> {
        let mut config = SuiteConfig::from_file(&self.config)?;
        config.apply_overrides(|key| std::env::var(key).ok());

        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if let Some(url) = &self.webdriver_url {
            config.webdriver_url = url.clone();
        }
        if self.headed {
            config.browser.headless = false;
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_logging(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn execute(cli: Cli) -> Result<bool> {
    let format = cli.format;
    let config = cli.load_config();
    match cli.command {
        Commands::Run(args) => run::execute(args, config?, format).await,
        Commands::List(args) => list::execute(args, format).map(|_| true),
        Commands::Config(cmd) => config::execute(cmd, &cli.config, config, format),
        Commands::Version => {
            println!("EzyScribe E2E v{}", env!("CARGO_PKG_VERSION"));
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    match execute(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::from(2)
        }
    }
}
