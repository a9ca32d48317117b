//! Signing job poll loop

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{InStage, OtaError};
use crate::pipeline::Stage;
use crate::service::{CodeSigner, SigningStatus};

/// Default delay between status checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Default time allowed for a signing job
pub const DEFAULT_SIGNING_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll interval and timeout for signing jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningPollConfig {
    /// Delay between status checks
    pub interval: Duration,
    /// Time after which no further check is made
    pub timeout: Duration,
}

impl Default for SigningPollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_SIGNING_TIMEOUT,
        }
    }
}

/// Outcome of waiting on a signing job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningWait {
    /// Whether the job reached `Succeeded`
    pub completed: bool,
    /// Number of status checks made
    pub attempts: u32,
    /// Time spent waiting
    pub elapsed: Duration,
    /// Last status observed
    pub last_status: SigningStatus,
}

/// Poll a signing job until it succeeds or the timeout elapses.
///
/// A check is made whenever the elapsed time is within the timeout, so with
/// the defaults the job is checked at most seven times (0 s through 30 s).
/// `completed` is false when the window closes without success; deciding
/// whether that aborts the run is left to the caller.
///
/// # Errors
///
/// Returns [`OtaError::SigningFailed`] as soon as the service reports a
/// failed job, and [`OtaError::StageFailed`] if a status query fails.
pub async fn wait_for_signing_job(
    signer: &dyn CodeSigner,
    job_id: &str,
    config: &SigningPollConfig,
) -> Result<SigningWait, OtaError> {
    let start = Instant::now();
    let mut attempts: u32 = 0;
    let mut last_status = SigningStatus::InProgress;

    while start.elapsed() <= config.timeout {
        attempts = attempts.saturating_add(1);
        let state = signer.signing_job_status(job_id).await.in_stage(Stage::Sign)?;
        debug!(job_id, attempt = attempts, status = %state.status, "Polled signing job");

        match state.status {
            SigningStatus::Succeeded => {
                return Ok(SigningWait {
                    completed: true,
                    attempts,
                    elapsed: start.elapsed(),
                    last_status: SigningStatus::Succeeded,
                });
            }
            SigningStatus::Failed => {
                return Err(OtaError::SigningFailed {
                    job_id: job_id.to_string(),
                    reason: state
                        .reason
                        .unwrap_or_else(|| "no reason reported".to_string()),
                });
            }
            status => last_status = status,
        }

        tokio::time::sleep(config.interval).await;
    }

    warn!(
        job_id,
        attempts,
        timeout_secs = config.timeout.as_secs(),
        "Signing job did not complete in time"
    );
    Ok(SigningWait {
        completed: false,
        attempts,
        elapsed: start.elapsed(),
        last_status,
    })
}
