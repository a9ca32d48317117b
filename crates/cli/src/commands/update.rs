//! Full OTA publishing run
//!
//! Local input is resolved before any AWS call, so a bad version or missing
//! header fails without network access.

use anyhow::Result;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use ota_aws::AwsSession;
use ota_update::{ArtifactPlan, OtaPipeline, StageEvent};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::commands::UpdateArgs;
use crate::output;

/// Execute update command
pub async fn execute(args: &UpdateArgs, json: bool) -> Result<()> {
    let config = args.pipeline_config()?;
    let plan = ArtifactPlan::resolve(&args.source.source()).await?;
    debug!(version = %plan.version, object_key = %plan.object_key, "Resolved artifact plan");

    let session = AwsSession::load(
        &args.profile,
        args.region.as_deref(),
        args.account.as_deref(),
    )
    .await?;

    let pipeline = OtaPipeline::new(session.services(), session.account().clone(), config);
    let progress = if json {
        None
    } else {
        Some(spawn_progress(pipeline.subscribe_progress())?)
    };

    let result = pipeline.run(&plan).await;
    // Closes the progress channel so the spinner task finishes.
    drop(pipeline);
    if let Some(handle) = progress {
        handle.await?;
    }

    output::print_update_report(&result?, json)
}

fn spawn_progress(mut events: broadcast::Receiver<StageEvent>) -> Result<JoinHandle<()>> {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?;
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(100));

    Ok(tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(StageEvent::Started(stage)) => {
                    pb.set_message(format!("{}...", stage.description()));
                }
                Ok(StageEvent::Completed { stage, elapsed_ms }) => {
                    pb.println(format!(
                        "{} {} {}",
                        "✓".green(),
                        stage.description(),
                        format!("({elapsed_ms} ms)").dimmed()
                    ));
                }
                Ok(StageEvent::Failed { stage, .. }) => {
                    pb.println(format!("{} {}", "✗".red(), stage.description()));
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
        pb.finish_and_clear();
    }))
}
