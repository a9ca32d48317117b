//! Remote service seams driven by the pipeline
//!
//! Object storage, code signing and device management are external systems.
//! The pipeline talks to them only through these traits so the sequencing can
//! be exercised without a cloud account.

use std::fmt;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Platform the signing profile targets
pub const DEFAULT_PLATFORM_ID: &str = "AmazonFreeRTOS-Default";
/// Certificate path the device expects in the signing parameters
pub const DEFAULT_CERT_NAME: &str = "otasigner.crt";
/// File version recorded on every OTA update file
pub const OTA_FILE_VERSION: &str = "1";

/// Versioned object storage
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a local file to `bucket/key`.
    async fn upload(&self, bucket: &str, key: &str, path: &Path) -> Result<()>;

    /// Version id of the current object stored at `key`, if any.
    async fn latest_version(&self, bucket: &str, key: &str) -> Result<Option<String>>;
}

/// Code-signing service
#[async_trait::async_trait]
pub trait CodeSigner: Send + Sync {
    /// Whether a signing profile with this name exists.
    async fn signing_profile_exists(&self, name: &str) -> Result<bool>;

    /// Create a signing profile and return its ARN.
    async fn put_signing_profile(&self, request: &SigningProfileRequest) -> Result<String>;

    /// Submit a signing job and return its id.
    async fn start_signing_job(&self, request: &SigningJobRequest) -> Result<String>;

    /// Current state of a signing job.
    async fn signing_job_status(&self, job_id: &str) -> Result<SigningJobState>;
}

/// Device management service that owns streams and OTA update jobs
#[async_trait::async_trait]
pub trait DeviceManagement: Send + Sync {
    /// Create a stream and return its id.
    async fn create_stream(&self, request: &StreamRequest) -> Result<String>;

    /// Create an OTA update.
    async fn create_ota_update(&self, request: &OtaUpdateRequest) -> Result<OtaUpdateReceipt>;
}

/// Signing profile to create when none exists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningProfileRequest {
    /// Profile name
    pub profile_name: String,
    /// Signing certificate ARN
    pub certificate_arn: String,
    /// Signing platform id
    pub platform_id: String,
    /// `certname` signing parameter
    pub cert_name: String,
}

/// Signing job over an uploaded object version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningJobRequest {
    /// Bucket holding the unsigned object; signed output goes to the same bucket
    pub bucket: String,
    /// Unsigned object key
    pub key: String,
    /// Unsigned object version id
    pub version: String,
    /// Signing profile name
    pub profile_name: String,
    /// Idempotency token
    pub client_request_token: String,
}

/// Status reported for a signing job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigningStatus {
    /// Job is still running
    InProgress,
    /// Signed object has been written
    Succeeded,
    /// Job failed
    Failed,
    /// Status string this client does not know
    Unknown(String),
}

impl From<&str> for SigningStatus {
    fn from(status: &str) -> Self {
        match status {
            "InProgress" => SigningStatus::InProgress,
            "Succeeded" => SigningStatus::Succeeded,
            "Failed" => SigningStatus::Failed,
            other => SigningStatus::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for SigningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningStatus::InProgress => write!(f, "InProgress"),
            SigningStatus::Succeeded => write!(f, "Succeeded"),
            SigningStatus::Failed => write!(f, "Failed"),
            SigningStatus::Unknown(s) => write!(f, "{s}"),
        }
    }
}

/// Signing job status with the service's reason, if any
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningJobState {
    /// Job status
    pub status: SigningStatus,
    /// Status reason
    pub reason: Option<String>,
}

impl SigningJobState {
    /// State without a reason
    pub fn new(status: SigningStatus) -> Self {
        Self {
            status,
            reason: None,
        }
    }
}

/// Stream over the signed artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    /// Stream id
    pub stream_id: String,
    /// File id within the stream
    pub file_id: u8,
    /// Bucket holding the signed object
    pub bucket: String,
    /// Signed object key
    pub key: String,
    /// Signed object version id
    pub version: String,
    /// Role the stream service assumes to read the object
    pub role_arn: String,
}

/// OTA update over a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtaUpdateRequest {
    /// OTA update id
    pub ota_update_id: String,
    /// File name presented to the device
    pub file_name: String,
    /// File version
    pub file_version: String,
    /// Stream carrying the file
    pub stream_id: String,
    /// File id within the stream
    pub file_id: u8,
    /// Signing job that produced the signature
    pub signer_job_id: String,
    /// Target thing or group ARNs
    pub targets: Vec<String>,
    /// Role the OTA service assumes
    pub role_arn: String,
}

/// What the device management service returned for a new OTA update
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OtaUpdateReceipt {
    /// OTA update id
    pub ota_update_id: String,
    /// OTA update ARN
    pub ota_update_arn: Option<String>,
    /// OTA update status
    pub status: Option<String>,
    /// Backing job id, once created
    pub job_id: Option<String>,
}
