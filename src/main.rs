//! Skill evolution operator CLI.
//!
//! Inspects and manages stored evolution state. Command output is pretty
//! JSON on stdout; all logs go to stderr.

// Enable the coverage attribute when running with nightly for llvm-cov exclusions
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use skill_evolution::config::{validate_config, EvolutionConfig};
use skill_evolution::error::ConfigError;
use skill_evolution::evolution::cli::{help_text, CommandOutput, CommandRunner, EvolutionCommands};

fn load_config() -> Result<EvolutionConfig, ConfigError> {
    let config = match std::env::var("EVOLUTION_CONFIG") {
        Ok(path) if !path.trim().is_empty() => {
            EvolutionConfig::from_path(&path)?.with_env_overrides()
        }
        _ => EvolutionConfig::default().with_env_overrides(),
    };
    validate_config(&config)?;
    Ok(config)
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    // Logs to stderr only (stdout carries command output)
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("LOG_LEVEL")
                .unwrap_or_else(|_| "info".to_string())
                .parse()
                .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match EvolutionCommands::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{e}\n\n{}", help_text());
            std::process::exit(2);
        }
    };

    if command == EvolutionCommands::Help {
        print!("{}", help_text());
        return;
    }

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    tracing::debug!(
        data_dir = %config.storage.data_dir.display(),
        enabled = config.enabled,
        "Configuration loaded"
    );

    let runner = CommandRunner::new(config);
    match runner.run(command).await {
        Ok(CommandOutput::Help(text)) => print!("{text}"),
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                tracing::error!("Failed to encode output: {e}");
                std::process::exit(1);
            }
        },
        Err(e) => {
            tracing::error!("Command failed: {e}");
            std::process::exit(1);
        }
    }
}
