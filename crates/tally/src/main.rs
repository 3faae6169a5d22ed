// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tally - a personal finance assistant that routes each question to the
//! right language model.
//!
//! This is the binary entry point.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tally::commands;
use tally::shutdown::install_signal_handler;
use tally::App;
use tally_agent::TurnRequest;
use tally_config::{CostMode, TallyConfig};
use tally_core::{ConversationId, TallyError};
use tracing::error;

/// Tally - a personal finance assistant.
#[derive(Parser, Debug)]
#[command(name = "tally", version, about, long_about = None)]
struct Cli {
    /// Configuration file to load instead of the XDG lookup.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP gateway.
    Serve,
    /// Ask one question and stream the answer.
    Ask {
        message: String,
        /// Continue an existing conversation.
        #[arg(long)]
        conversation: Option<String>,
        /// Provider to try first.
        #[arg(long)]
        provider: Option<String>,
        /// Override the configured cost policy.
        #[arg(long)]
        cost_mode: Option<CostMode>,
    },
    /// Show how a message would be classified and routed.
    Classify {
        message: String,
        #[arg(long)]
        cost_mode: Option<CostMode>,
    },
    /// Show spend for a day (default today) and its month.
    Usage {
        /// Day to report, YYYY-MM-DD.
        #[arg(long)]
        date: Option<String>,
    },
    /// Validate the configuration and print a summary.
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match cli.config {
        Some(ref path) => tally_config::load_and_validate_path(path),
        None => tally_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            tally_config::render_errors(&errors);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.agent.log_level);

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: TallyConfig) -> Result<(), String> {
    let mut stdout = std::io::stdout();
    match command {
        Commands::Serve => serve(config).await,
        Commands::Ask {
            message,
            conversation,
            provider,
            cost_mode,
        } => {
            let app = App::start(config).await.map_err(|e| report(&e))?;
            let request = TurnRequest {
                conversation_id: conversation.map(ConversationId),
                message,
                preferred_provider: provider,
                cost_mode,
            };
            let mut stderr = std::io::stderr();
            let result = commands::run_ask(
                &app,
                request,
                install_signal_handler(),
                &mut stdout,
                &mut stderr,
            )
            .await;
            app.shutdown().await;
            result.map(|_| ()).map_err(|failed| failed.to_string())
        }
        Commands::Classify { message, cost_mode } => {
            commands::run_classify(&config, &message, cost_mode, &mut stdout)
                .map_err(|e| report(&e))
        }
        Commands::Usage { date } => {
            let app = App::with_providers(config, Default::default())
                .await
                .map_err(|e| report(&e))?;
            let result = commands::run_usage(&app.ledger, date.as_deref(), &mut stdout).await;
            app.shutdown().await;
            result.map_err(|e| report(&e))
        }
        Commands::CheckConfig => {
            commands::run_check_config(&config, &mut stdout).map_err(|e| report(&e))?;
            let _ = stdout.flush();
            Ok(())
        }
    }
}

#[cfg(feature = "gateway")]
async fn serve(config: TallyConfig) -> Result<(), String> {
    tally::serve::run_serve(config).await.map_err(|e| report(&e))
}

#[cfg(not(feature = "gateway"))]
async fn serve(_config: TallyConfig) -> Result<(), String> {
    Err("this build of tally was compiled without the `gateway` feature".into())
}

fn report(e: &TallyError) -> String {
    error!(code = e.code(), error = %e, "command failed");
    e.to_string()
}

/// Logs go to stderr so `tally ask` output can be piped.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tally={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn ask_parses_options() {
        let cli = Cli::try_parse_from([
            "tally",
            "ask",
            "What's my checking balance?",
            "--provider",
            "ollama",
            "--cost-mode",
            "cost_conscious",
        ])
        .unwrap();
        match cli.command {
            Commands::Ask {
                message,
                provider,
                cost_mode,
                ..
            } => {
                assert_eq!(message, "What's my checking balance?");
                assert_eq!(provider.as_deref(), Some("ollama"));
                assert_eq!(cost_mode, Some(CostMode::CostConscious));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = tally_config::load_and_validate_str("").expect("default config should be valid");
        assert_eq!(config.agent.name, "tally");
    }
}
