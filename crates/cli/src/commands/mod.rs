//! Command implementations for otactl CLI

pub mod update;
pub mod version;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};
use ota_update::service::{DEFAULT_CERT_NAME, DEFAULT_PLATFORM_ID};
use ota_update::target::DEFAULT_UPDATE_ID_PREFIX;
use ota_update::{ArtifactSource, PipelineConfig, SigningPollConfig, TargetKind};

use crate::error::CliError;

/// Where the firmware image and its version come from
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// File id within the OTA stream; 0 without --ota-version reads the
    /// version from the source tree header
    #[arg(long, alias = "fileId", env = "OTACTL_FILE_ID", default_value_t = 0)]
    pub file_id: u8,

    /// Root of the firmware source tree
    #[arg(
        long,
        alias = "codelocation",
        env = "OTACTL_CODE_LOCATION",
        default_value = "../code/amazon-freertos/"
    )]
    pub code_location: PathBuf,

    /// Update file used when not reading the source tree
    #[arg(
        long,
        alias = "filelocation",
        env = "OTACTL_FILE_LOCATION",
        default_value = "update.bin"
    )]
    pub file_location: PathBuf,

    /// Dotted firmware version (major.minor.build)
    #[arg(long, alias = "otaversion", env = "OTACTL_OTA_VERSION")]
    pub ota_version: Option<String>,
}

impl SourceArgs {
    /// Artifact source selected by these arguments
    pub fn source(&self) -> ArtifactSource {
        ArtifactSource::select(
            self.file_id,
            &self.code_location,
            &self.file_location,
            self.ota_version.as_deref(),
        )
    }
}

/// Kind of OTA target
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    /// A single thing
    Thing,
    /// A thing group
    Group,
}

impl From<DeviceType> for TargetKind {
    fn from(device_type: DeviceType) -> Self {
        match device_type {
            DeviceType::Thing => TargetKind::Thing,
            DeviceType::Group => TargetKind::Group,
        }
    }
}

/// Arguments for `otactl update`
#[derive(Args, Debug)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Named AWS profile for credentials and default region
    #[arg(long, env = "OTACTL_PROFILE")]
    pub profile: String,

    /// AWS region; defaults to the profile's region
    #[arg(long, env = "OTACTL_REGION")]
    pub region: Option<String>,

    /// AWS account id; defaults to the caller identity
    #[arg(long, env = "OTACTL_ACCOUNT")]
    pub account: Option<String>,

    /// Target a thing or a thing group
    #[arg(
        long,
        alias = "devicetype",
        env = "OTACTL_DEVICE_TYPE",
        value_enum,
        default_value_t = DeviceType::Thing
    )]
    pub device_type: DeviceType,

    /// Name of the thing or thing group
    #[arg(long, env = "OTACTL_NAME")]
    pub name: String,

    /// IAM role name assumed by the stream and OTA update
    #[arg(long, env = "OTACTL_ROLE")]
    pub role: String,

    /// Versioned S3 bucket for the firmware
    #[arg(long, alias = "s3bucket", env = "OTACTL_S3_BUCKET")]
    pub s3_bucket: String,

    /// Signing profile name, created if missing
    #[arg(long, alias = "otasigningprofile", env = "OTACTL_SIGNING_PROFILE")]
    pub signing_profile: String,

    /// ACM certificate id used by a newly created signing profile
    #[arg(
        long,
        alias = "signingcertificateid",
        env = "OTACTL_SIGNING_CERTIFICATE_ID"
    )]
    pub signing_certificate_id: String,

    /// Signing platform for a newly created profile
    #[arg(long, env = "OTACTL_PLATFORM_ID", default_value = DEFAULT_PLATFORM_ID)]
    pub platform_id: String,

    /// Certificate path on the device for a newly created profile
    #[arg(long, env = "OTACTL_CERT_NAME", default_value = DEFAULT_CERT_NAME)]
    pub cert_name: String,

    /// Prefix of the generated update and stream id
    #[arg(long, env = "OTACTL_UPDATE_ID_PREFIX", default_value = DEFAULT_UPDATE_ID_PREFIX)]
    pub update_id_prefix: String,

    /// Seconds between signing job status checks
    #[arg(
        long,
        env = "OTACTL_SIGN_POLL_INTERVAL",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub sign_poll_interval: u64,

    /// Seconds to wait for the signing job before aborting
    #[arg(
        long,
        env = "OTACTL_SIGN_TIMEOUT",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub sign_timeout: u64,
}

impl UpdateArgs {
    /// Pipeline settings from the command line.
    ///
    /// Required identifiers may arrive empty through the environment; those
    /// are rejected here.
    pub fn pipeline_config(&self) -> Result<PipelineConfig, CliError> {
        for (flag, value) in [
            ("--name", &self.name),
            ("--role", &self.role),
            ("--s3-bucket", &self.s3_bucket),
            ("--signing-profile", &self.signing_profile),
            ("--signing-certificate-id", &self.signing_certificate_id),
        ] {
            if value.trim().is_empty() {
                return Err(CliError::InvalidArgument(format!("{flag} must not be empty")));
            }
        }

        let mut config = PipelineConfig::new(
            &self.s3_bucket,
            &self.signing_profile,
            &self.signing_certificate_id,
            &self.role,
            self.device_type.into(),
            &self.name,
        );
        config.file_id = self.source.file_id;
        config.platform_id.clone_from(&self.platform_id);
        config.cert_name.clone_from(&self.cert_name);
        config.update_id_prefix.clone_from(&self.update_id_prefix);
        config.poll = SigningPollConfig {
            interval: Duration::from_secs(self.sign_poll_interval),
            timeout: Duration::from_secs(self.sign_timeout),
        };
        Ok(config)
    }
}

/// Arguments for `otactl version`
#[derive(Args, Debug)]
pub struct VersionArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Also copy the build file to its versioned name
    #[arg(long)]
    pub stage: bool,
}
