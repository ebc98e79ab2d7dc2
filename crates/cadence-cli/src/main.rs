use cadence_core::error::CoreError;
use clap::Parser;
use owo_colors::{OwoColorize, Style};
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;
mod plan;
mod util;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("CADENCE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = config::Config::new().unwrap_or_default();
    let cli = cli::Cli::parse();

    let result = match cli.command {
        cli::Commands::Rule(command) => commands::rule::rule_command(command),
        cli::Commands::Forecast(command) => {
            commands::forecast::forecast_command(&config, command).await
        }
        cli::Commands::Edit(command) => commands::edit::edit_command(&config, command).await,
        cli::Commands::Delete(command) => commands::edit::delete_command(&config, command).await,
        cli::Commands::Mode(command) => commands::mode::mode_command(&config, command).await,
    };

    if let Err(e) = result {
        handle_error(e);
        std::process::exit(1);
    }
}

fn handle_error(err: anyhow::Error) {
    let error_style = Style::new().red().bold();

    if let Some(core_error) = err.downcast_ref::<CoreError>() {
        match core_error {
            CoreError::NotFound(s) => {
                eprintln!("{} {}", "Error:".style(error_style), s);
            }
            CoreError::MalformedRule(s) => {
                eprintln!("{} Malformed rule: {}", "Error:".style(error_style), s);
            }
            CoreError::LegacyConversion(s) => {
                eprintln!(
                    "{} Legacy config cannot be converted: {}",
                    "Error:".style(error_style),
                    s
                );
            }
            CoreError::InvalidOccurrence { date, reason, .. } => {
                eprintln!(
                    "{} {} is not a valid occurrence: {}",
                    "Error:".style(error_style),
                    date.to_string().yellow(),
                    reason
                );
            }
            CoreError::ConflictingMode { conflicting, .. } => {
                eprintln!(
                    "{} Mode change blocked by existing records: {}",
                    "Error:".style(error_style),
                    conflicting.yellow()
                );
                eprintln!("Clear them first with 'cadence mode clear-split' or 'cadence mode clear-recurring'.");
            }
            CoreError::PartialMutation { rolled_back, .. } if *rolled_back => {
                eprintln!(
                    "{} {} No changes were kept.",
                    "Error:".style(error_style),
                    core_error
                );
            }
            CoreError::InconsistentState { affected } => {
                eprintln!(
                    "{} A multi-step change failed and could not be rolled back.",
                    "Error:".style(error_style)
                );
                eprintln!("Check these records by hand:");
                for id in affected {
                    eprintln!("  {}", id.to_string().yellow());
                }
            }
            _ => eprintln!("{} {}", "Error:".style(error_style), err),
        }
    } else {
        eprintln!("{} {}", "Error:".style(error_style), err);
    }
}
