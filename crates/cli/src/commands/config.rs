//! Config Commands

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use std::path::Path;

use ezyscribe_common::{Role, SuiteConfig};

use crate::output::{print_info, print_success, print_warning, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration (passwords redacted)
    Show,

    /// Validate the configuration and report missing credentials
    Check,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Copy of `config` safe to print
pub fn redacted(config: &SuiteConfig) -> SuiteConfig {
    let mut config = config.clone();
    for creds in [&mut config.roles.doctor, &mut config.roles.scribe] {
        if !creds.password.is_empty() {
            creds.password = "********".to_string();
        }
    }
    config
}

/// Render `config` in the requested format
pub fn render(config: &SuiteConfig, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(config)?,
        OutputFormat::Yaml => serde_yaml::to_string(config)?,
        OutputFormat::Table | OutputFormat::Plain => toml::to_string_pretty(config)?,
    })
}

pub fn execute(
    cmd: ConfigCommands,
    config_path: &Path,
    config: Result<SuiteConfig>,
    format: OutputFormat,
) -> Result<bool> {
    match cmd {
        ConfigCommands::Show => {
            let config = config?;
            println!("{}", render(&redacted(&config), format)?);
            Ok(true)
        }

        ConfigCommands::Check => {
            let config = config?;
            print_success(&format!("Configuration is valid ({})", config_path.display()));
            print_info(&format!("Dashboard: {}", config.base_url));
            print_info(&format!("WebDriver: {}", config.webdriver_url));

            let mut complete = true;
            for role in Role::ALL {
                if config.credentials(role).is_complete() {
                    print_success(&format!("Credentials for {} are set", role));
                } else {
                    complete = false;
                    print_warning(&format!(
                        "No credentials for {}; only login page checks can run",
                        role
                    ));
                }
            }
            Ok(complete)
        }

        ConfigCommands::Init { force } => {
            if config_path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    config_path.display()
                );
            }
            SuiteConfig::default()
                .save(config_path)
                .with_context(|| format!("writing {}", config_path.display()))?;
            print_success(&format!("Wrote {}", config_path.display()));
            Ok(true)
        }
    }
}
