//! Error types for OTA pipeline operations

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::pipeline::Stage;

/// Boxed error carried by [`OtaError::StageFailed`].
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while publishing an OTA update
#[derive(Error, Debug)]
pub enum OtaError {
    /// Version string or version constant is not a valid integer triple
    #[error("Invalid firmware version: {0}")]
    InvalidVersion(String),

    /// Version header does not define a required constant
    #[error("Missing version constant: {0}")]
    MissingVersionConstant(String),

    /// Version header could not be read
    #[error("Failed to read version header {}", .path.display())]
    HeaderUnreadable {
        /// Header path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Header macro pattern failed to compile
    #[error("Header pattern error: {0}")]
    HeaderPattern(String),

    /// Artifact path cannot be turned into a versioned object name
    #[error("Invalid artifact path: {0}")]
    InvalidArtifactPath(String),

    /// Update id prefix contains characters the stream service rejects
    #[error("Invalid update id prefix: {0}")]
    InvalidUpdateIdPrefix(String),

    /// Build artifact could not be copied to its versioned name
    #[error("Failed to copy {} to {}", .from.display(), .to.display())]
    ArtifactCopy {
        /// Build artifact
        from: PathBuf,
        /// Versioned destination
        to: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Bucket listing has no current version for the object
    #[error("No object version found for s3://{bucket}/{key}")]
    ObjectVersionNotFound {
        /// Bucket name
        bucket: String,
        /// Object key
        key: String,
    },

    /// Signing service reported the job as failed
    #[error("Signing job {job_id} failed: {reason}")]
    SigningFailed {
        /// Signing job id
        job_id: String,
        /// Reason reported by the service
        reason: String,
    },

    /// Signing job did not succeed within the poll timeout
    #[error("Signing job {job_id} did not complete within {}s", .timeout.as_secs())]
    SigningTimeout {
        /// Signing job id
        job_id: String,
        /// Configured timeout
        timeout: Duration,
    },

    /// Remote call failed during a pipeline stage
    #[error("{stage} failed")]
    StageFailed {
        /// Stage that failed
        stage: Stage,
        /// Underlying service error
        #[source]
        source: BoxedSource,
    },

    /// Account, region or credential configuration problem
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Broad classification used for reporting and exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bad user input (version, paths, identifiers)
    Input,
    /// Local filesystem failure
    Filesystem,
    /// Remote service failure
    Remote,
    /// Signing failed or timed out
    Signing,
    /// Account or credential configuration
    Configuration,
    /// Fault inside the tool itself
    Internal,
}

impl OtaError {
    /// Get the error category for classification.
    pub fn category(&self) -> ErrorCategory {
        match self {
            OtaError::InvalidVersion(_)
            | OtaError::MissingVersionConstant(_)
            | OtaError::InvalidArtifactPath(_)
            | OtaError::InvalidUpdateIdPrefix(_) => ErrorCategory::Input,
            OtaError::HeaderUnreadable { .. }
            | OtaError::ArtifactCopy { .. } => ErrorCategory::Filesystem,
            OtaError::HeaderPattern(_) => ErrorCategory::Internal,
            OtaError::ObjectVersionNotFound { .. } | OtaError::StageFailed { .. } => {
                ErrorCategory::Remote
            }
            OtaError::SigningFailed { .. } | OtaError::SigningTimeout { .. } => {
                ErrorCategory::Signing
            }
            OtaError::Configuration(_) => ErrorCategory::Configuration,
        }
    }

    /// Stage the error is attributed to, if it came from a remote call.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            OtaError::StageFailed { stage, .. } => Some(*stage),
            OtaError::SigningFailed { .. } | OtaError::SigningTimeout { .. } => Some(Stage::Sign),
            OtaError::ArtifactCopy { .. } => Some(Stage::StageArtifact),
            _ => None,
        }
    }

    /// Create a configuration error with a message.
    pub fn configuration(msg: impl Into<String>) -> Self {
        OtaError::Configuration(msg.into())
    }

    /// Wrap a remote failure with the stage it occurred in.
    pub fn stage_failed(stage: Stage, source: anyhow::Error) -> Self {
        OtaError::StageFailed {
            stage,
            source: source.into(),
        }
    }
}

/// Attach a pipeline stage to a remote call result.
pub trait InStage<T> {
    /// Convert the error into [`OtaError::StageFailed`] for `stage`.
    fn in_stage(self, stage: Stage) -> Result<T, OtaError>;
}

impl<T> InStage<T> for anyhow::Result<T> {
    fn in_stage(self, stage: Stage) -> Result<T, OtaError> {
        self.map_err(|e| OtaError::stage_failed(stage, e))
    }
}
