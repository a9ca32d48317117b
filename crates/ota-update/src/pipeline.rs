//! Sequential OTA publishing pipeline
//!
//! Stages run strictly in order on the calling task. The first failure aborts
//! the run; nothing after it is attempted.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::artifact::{self, ArtifactPlan};
use crate::error::{InStage, OtaError};
use crate::service::{
    CodeSigner, DEFAULT_CERT_NAME, DEFAULT_PLATFORM_ID, DeviceManagement, OTA_FILE_VERSION,
    ObjectStore, OtaUpdateReceipt, OtaUpdateRequest, SigningJobRequest, SigningProfileRequest,
    StreamRequest,
};
use crate::signing::{SigningPollConfig, SigningWait, wait_for_signing_job};
use crate::target::{AccountContext, DEFAULT_UPDATE_ID_PREFIX, TargetKind, UpdateId};
use crate::version::FirmwareVersion;

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Copy the build file to its versioned name
    StageArtifact,
    /// Upload the versioned file
    Upload,
    /// Look up the uploaded object's version id
    ResolveObjectVersion,
    /// Find or create the signing profile
    EnsureProfile,
    /// Start the signing job and wait for it
    Sign,
    /// Look up the signed object's version id
    ResolveSignedVersion,
    /// Create the stream over the signed object
    CreateStream,
    /// Create the OTA update
    CreateOtaUpdate,
}

impl Stage {
    /// All stages in execution order
    pub const ALL: [Stage; 8] = [
        Stage::StageArtifact,
        Stage::Upload,
        Stage::ResolveObjectVersion,
        Stage::EnsureProfile,
        Stage::Sign,
        Stage::ResolveSignedVersion,
        Stage::CreateStream,
        Stage::CreateOtaUpdate,
    ];

    /// Human-readable stage name
    pub fn description(&self) -> &'static str {
        match self {
            Stage::StageArtifact => "Stage artifact",
            Stage::Upload => "Upload artifact",
            Stage::ResolveObjectVersion => "Resolve object version",
            Stage::EnsureProfile => "Ensure signing profile",
            Stage::Sign => "Sign firmware",
            Stage::ResolveSignedVersion => "Resolve signed object version",
            Stage::CreateStream => "Create stream",
            Stage::CreateOtaUpdate => "Create OTA update",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Progress notification published while the pipeline runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    /// Stage started
    Started(Stage),
    /// Stage finished
    Completed {
        /// Stage
        stage: Stage,
        /// Wall time in milliseconds
        elapsed_ms: u64,
    },
    /// Stage failed; the run stops here
    Failed {
        /// Stage
        stage: Stage,
        /// Error message
        error: String,
    },
}

/// Time spent in one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTiming {
    /// Stage
    pub stage: Stage,
    /// Wall time in milliseconds
    pub elapsed_ms: u64,
}

/// Settings for one publishing run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Bucket for unsigned and signed artifacts
    pub bucket: String,
    /// Signing profile name
    pub signing_profile: String,
    /// Signing certificate id (not ARN)
    pub certificate_id: String,
    /// IAM role name used for streams and OTA updates
    pub role: String,
    /// Target kind
    pub target_kind: TargetKind,
    /// Thing or group name
    pub target_name: String,
    /// File id within the stream
    pub file_id: u8,
    /// Signing platform id for new profiles
    pub platform_id: String,
    /// `certname` signing parameter for new profiles
    pub cert_name: String,
    /// Update id prefix
    pub update_id_prefix: String,
    /// Signing poll settings
    pub poll: SigningPollConfig,
}

impl PipelineConfig {
    /// Config with defaults for everything but the required identifiers.
    pub fn new(
        bucket: impl Into<String>,
        signing_profile: impl Into<String>,
        certificate_id: impl Into<String>,
        role: impl Into<String>,
        target_kind: TargetKind,
        target_name: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            signing_profile: signing_profile.into(),
            certificate_id: certificate_id.into(),
            role: role.into(),
            target_kind,
            target_name: target_name.into(),
            file_id: 0,
            platform_id: DEFAULT_PLATFORM_ID.to_string(),
            cert_name: DEFAULT_CERT_NAME.to_string(),
            update_id_prefix: DEFAULT_UPDATE_ID_PREFIX.to_string(),
            poll: SigningPollConfig::default(),
        }
    }
}

/// Remote services the pipeline drives
#[derive(Clone)]
pub struct Services {
    /// Object storage
    pub store: Arc<dyn ObjectStore>,
    /// Code signing
    pub signer: Arc<dyn CodeSigner>,
    /// Streams and OTA updates
    pub devices: Arc<dyn DeviceManagement>,
}

/// Summary of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtaUpdateReport {
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Firmware version
    pub version: FirmwareVersion,
    /// Bucket
    pub bucket: String,
    /// Unsigned object key, also the OTA file name
    pub object_key: String,
    /// Unsigned object version id
    pub object_version: String,
    /// Signing profile name
    pub signing_profile: String,
    /// ARN of the profile when this run created it
    pub created_profile_arn: Option<String>,
    /// Signing job id, also the signed object key
    pub signing_job_id: String,
    /// Status checks made while waiting for signing
    pub signing_attempts: u32,
    /// Signed object version id
    pub signed_object_version: String,
    /// Stream id
    pub stream_id: String,
    /// OTA update id
    pub ota_update_id: String,
    /// OTA update ARN
    pub ota_update_arn: Option<String>,
    /// OTA update status
    pub ota_update_status: Option<String>,
    /// Target ARN
    pub target_arn: String,
    /// Per-stage timings
    pub timings: Vec<StageTiming>,
}

/// Runs the publishing stages against a set of services
pub struct OtaPipeline {
    services: Services,
    account: AccountContext,
    config: PipelineConfig,
    progress_tx: broadcast::Sender<StageEvent>,
}

impl OtaPipeline {
    /// Create a pipeline
    pub fn new(services: Services, account: AccountContext, config: PipelineConfig) -> Self {
        let (progress_tx, _) = broadcast::channel(32);
        Self {
            services,
            account,
            config,
            progress_tx,
        }
    }

    /// Subscribe to stage progress events
    pub fn subscribe_progress(&self) -> broadcast::Receiver<StageEvent> {
        self.progress_tx.subscribe()
    }

    /// Pipeline settings
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stage, upload, sign and publish the planned artifact.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered. A signing job that does not
    /// succeed within the poll timeout is [`OtaError::SigningTimeout`] and no
    /// stream or OTA update is created.
    pub async fn run(&self, plan: &ArtifactPlan) -> Result<OtaUpdateReport, OtaError> {
        UpdateId::validate_prefix(&self.config.update_id_prefix)?;

        let started_at = Utc::now();
        let update_id = UpdateId::generate(&self.config.update_id_prefix, &plan.version);
        let role_arn = self.account.role_arn(&self.config.role);
        let target_arn = self
            .account
            .target_arn(self.config.target_kind, &self.config.target_name);
        let bucket = self.config.bucket.as_str();
        let mut timings = Vec::with_capacity(Stage::ALL.len());

        info!(
            version = %plan.version,
            update_id = %update_id,
            target = %target_arn,
            "Starting OTA publish"
        );

        let stage_start = self.begin(Stage::StageArtifact);
        let copied = artifact::stage(plan).await;
        let bytes = self.finish(Stage::StageArtifact, stage_start, &mut timings, copied)?;
        info!(bytes, path = %plan.staged_path.display(), "Artifact staged");

        let stage_start = self.begin(Stage::Upload);
        let uploaded = self
            .services
            .store
            .upload(bucket, &plan.object_key, &plan.staged_path)
            .await
            .in_stage(Stage::Upload);
        self.finish(Stage::Upload, stage_start, &mut timings, uploaded)?;

        let stage_start = self.begin(Stage::ResolveObjectVersion);
        let object_version = self.latest_version(Stage::ResolveObjectVersion, &plan.object_key).await;
        let object_version =
            self.finish(Stage::ResolveObjectVersion, stage_start, &mut timings, object_version)?;

        let stage_start = self.begin(Stage::EnsureProfile);
        let profile = self.ensure_signing_profile().await;
        let created_profile_arn =
            self.finish(Stage::EnsureProfile, stage_start, &mut timings, profile)?;

        let stage_start = self.begin(Stage::Sign);
        let signed = self.sign(plan, &object_version, &update_id).await;
        let (signing_job_id, wait) = self.finish(Stage::Sign, stage_start, &mut timings, signed)?;

        let stage_start = self.begin(Stage::ResolveSignedVersion);
        let signed_version = self.latest_version(Stage::ResolveSignedVersion, &signing_job_id).await;
        let signed_object_version =
            self.finish(Stage::ResolveSignedVersion, stage_start, &mut timings, signed_version)?;

        let stage_start = self.begin(Stage::CreateStream);
        let stream_request = StreamRequest {
            stream_id: update_id.to_string(),
            file_id: self.config.file_id,
            bucket: bucket.to_string(),
            key: signing_job_id.clone(),
            version: signed_object_version.clone(),
            role_arn: role_arn.clone(),
        };
        let stream = self
            .services
            .devices
            .create_stream(&stream_request)
            .await
            .in_stage(Stage::CreateStream);
        let stream_id = self.finish(Stage::CreateStream, stage_start, &mut timings, stream)?;

        let stage_start = self.begin(Stage::CreateOtaUpdate);
        let ota_request = OtaUpdateRequest {
            ota_update_id: update_id.to_string(),
            file_name: plan.object_key.clone(),
            file_version: OTA_FILE_VERSION.to_string(),
            stream_id: stream_id.clone(),
            file_id: self.config.file_id,
            signer_job_id: signing_job_id.clone(),
            targets: vec![target_arn.clone()],
            role_arn,
        };
        let receipt = self
            .services
            .devices
            .create_ota_update(&ota_request)
            .await
            .in_stage(Stage::CreateOtaUpdate);
        let receipt: OtaUpdateReceipt =
            self.finish(Stage::CreateOtaUpdate, stage_start, &mut timings, receipt)?;

        info!(
            ota_update_id = %receipt.ota_update_id,
            status = receipt.status.as_deref().unwrap_or("unknown"),
            "OTA update created"
        );

        Ok(OtaUpdateReport {
            started_at,
            version: plan.version,
            bucket: bucket.to_string(),
            object_key: plan.object_key.clone(),
            object_version,
            signing_profile: self.config.signing_profile.clone(),
            created_profile_arn,
            signing_job_id,
            signing_attempts: wait.attempts,
            signed_object_version,
            stream_id,
            ota_update_id: receipt.ota_update_id,
            ota_update_arn: receipt.ota_update_arn,
            ota_update_status: receipt.status,
            target_arn,
            timings,
        })
    }

    fn begin(&self, stage: Stage) -> Instant {
        info!(stage = %stage, "Stage started");
        self.publish(StageEvent::Started(stage));
        Instant::now()
    }

    fn finish<T>(
        &self,
        stage: Stage,
        started: Instant,
        timings: &mut Vec<StageTiming>,
        result: Result<T, OtaError>,
    ) -> Result<T, OtaError> {
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match result {
            Ok(value) => {
                timings.push(StageTiming { stage, elapsed_ms });
                self.publish(StageEvent::Completed { stage, elapsed_ms });
                Ok(value)
            }
            Err(e) => {
                error!(stage = %stage, error = %e, "Stage failed, aborting run");
                self.publish(StageEvent::Failed {
                    stage,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn publish(&self, event: StageEvent) {
        // No subscribers is fine.
        if self.progress_tx.send(event).is_err() {
            tracing::trace!("No progress subscribers");
        }
    }

    async fn latest_version(&self, stage: Stage, key: &str) -> Result<String, OtaError> {
        let bucket = &self.config.bucket;
        let version = self
            .services
            .store
            .latest_version(bucket, key)
            .await
            .in_stage(stage)?;
        version.ok_or_else(|| OtaError::ObjectVersionNotFound {
            bucket: bucket.clone(),
            key: key.to_string(),
        })
    }

    /// Returns the new profile's ARN if one had to be created.
    async fn ensure_signing_profile(&self) -> Result<Option<String>, OtaError> {
        let name = &self.config.signing_profile;
        info!(profile = %name, "Searching for signing profile");

        let exists = self
            .services
            .signer
            .signing_profile_exists(name)
            .await
            .in_stage(Stage::EnsureProfile)?;
        if exists {
            info!(profile = %name, "Found signing profile in account");
            return Ok(None);
        }

        let request = SigningProfileRequest {
            profile_name: name.clone(),
            certificate_arn: self.account.certificate_arn(&self.config.certificate_id),
            platform_id: self.config.platform_id.clone(),
            cert_name: self.config.cert_name.clone(),
        };
        let arn = self
            .services
            .signer
            .put_signing_profile(&request)
            .await
            .in_stage(Stage::EnsureProfile)?;
        info!(profile = %name, arn = %arn, "Created signing profile");
        Ok(Some(arn))
    }

    async fn sign(
        &self,
        plan: &ArtifactPlan,
        object_version: &str,
        update_id: &UpdateId,
    ) -> Result<(String, SigningWait), OtaError> {
        let request = SigningJobRequest {
            bucket: self.config.bucket.clone(),
            key: plan.object_key.clone(),
            version: object_version.to_string(),
            profile_name: self.config.signing_profile.clone(),
            client_request_token: update_id.to_string(),
        };
        let job_id = self
            .services
            .signer
            .start_signing_job(&request)
            .await
            .in_stage(Stage::Sign)?;
        info!(job_id = %job_id, "Waiting for signing job to complete");

        let wait =
            wait_for_signing_job(self.services.signer.as_ref(), &job_id, &self.config.poll).await?;
        if !wait.completed {
            warn!(job_id = %job_id, last_status = %wait.last_status, "Aborting: signing incomplete");
            return Err(OtaError::SigningTimeout {
                job_id,
                timeout: self.config.poll.timeout,
            });
        }
        Ok((job_id, wait))
    }
}
