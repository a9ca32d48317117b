//! otactl - firmware OTA publishing CLI
//!
//! Stages a firmware image under a versioned name, uploads it to S3, signs it
//! with AWS Signer and publishes it to a thing or thing group as an AWS IoT
//! OTA update.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod commands;
mod completion;
mod error;
mod output;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ota_update::{ErrorCategory, OtaError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{UpdateArgs, VersionArgs};
use crate::error::CliError;

#[derive(Parser)]
#[command(name = "otactl")]
#[command(about = "Publish signed firmware images as AWS IoT OTA updates")]
#[command(version)]
#[command(long_about = "
otactl copies a firmware build to a versioned file name, uploads it to a
versioned S3 bucket, signs it with an AWS Signer profile and creates a stream
and an OTA update targeting a thing or thing group.

Use --json for machine-readable output suitable for scripting.
")]
struct Cli {
    /// Output format (human-readable or JSON)
    #[arg(
        long,
        global = true,
        help = "Output in JSON format for machine parsing"
    )]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stage, upload, sign and publish a firmware image
    Update(UpdateArgs),

    /// Resolve the firmware version and staged file name without AWS access
    Version(VersionArgs),

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completion for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("otactl={log_level},ota_update={log_level},ota_aws={log_level}").into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match execute_command(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.json {
                output::print_error_json(&e);
            } else {
                output::print_error_human(&e);
            }
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn execute_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Update(args) => commands::update::execute(args, cli.json).await,
        Commands::Version(args) => commands::version::execute(args, cli.json).await,
        Commands::Completion { shell } => {
            completion::generate_completion(*shell);
            Ok(())
        }
    }
}

/// Process exit code for a failed command
fn exit_code(error: &anyhow::Error) -> u8 {
    if let Some(e) = error.downcast_ref::<OtaError>() {
        return match e.category() {
            ErrorCategory::Input => 2,
            ErrorCategory::Filesystem => 3,
            ErrorCategory::Remote => 4,
            ErrorCategory::Signing => 5,
            ErrorCategory::Configuration => 6,
            ErrorCategory::Internal => 1,
        };
    }

    match error.downcast_ref::<CliError>() {
        Some(CliError::InvalidArgument(_)) => 2,
        _ => 1,
    }
}
