//! Account context, ARN construction and update identifiers

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::OtaError;
use crate::version::FirmwareVersion;

/// Default prefix for generated update ids
pub const DEFAULT_UPDATE_ID_PREFIX: &str = "esp";

/// Upper bound (inclusive) of the random update id component
pub const UPDATE_ID_SEED_MAX: u32 = 65_535;

/// Kind of OTA update target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// A single device
    #[default]
    Thing,
    /// A named collection of devices
    Group,
}

impl TargetKind {
    /// Resource type segment used in the target ARN
    pub fn arn_resource(&self) -> &'static str {
        match self {
            TargetKind::Thing => "thing",
            TargetKind::Group => "thinggroup",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Thing => write!(f, "thing"),
            TargetKind::Group => write!(f, "group"),
        }
    }
}

/// Account and region the update is published in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountContext {
    /// ARN partition (`aws`, `aws-cn`, `aws-us-gov`)
    pub partition: String,
    /// Region name
    pub region: String,
    /// Twelve digit account id
    pub account_id: String,
}

impl AccountContext {
    /// Create a context, deriving the partition from the region.
    pub fn new(region: impl Into<String>, account_id: impl Into<String>) -> Self {
        let region = region.into();
        Self {
            partition: partition_for_region(&region).to_string(),
            region,
            account_id: account_id.into(),
        }
    }

    /// ARN of the thing or thing group receiving the update
    pub fn target_arn(&self, kind: TargetKind, name: &str) -> String {
        format!(
            "arn:{}:iot:{}:{}:{}/{}",
            self.partition,
            self.region,
            self.account_id,
            kind.arn_resource(),
            name
        )
    }

    /// ARN of the IAM role the OTA services assume
    pub fn role_arn(&self, role: &str) -> String {
        format!("arn:{}:iam::{}:role/{}", self.partition, self.account_id, role)
    }

    /// ARN of the code-signing certificate
    pub fn certificate_arn(&self, certificate_id: &str) -> String {
        format!(
            "arn:{}:acm:{}:{}:certificate/{}",
            self.partition, self.region, self.account_id, certificate_id
        )
    }
}

fn partition_for_region(region: &str) -> &'static str {
    if region.starts_with("cn-") {
        "aws-cn"
    } else if region.starts_with("us-gov-") {
        "aws-us-gov"
    } else {
        "aws"
    }
}

/// Identifier shared by the signing request token, the stream and the OTA
/// update: `<prefix>-<n>-<major>-<minor>-<build>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdateId(String);

impl UpdateId {
    /// Generate an id with a random component in `1..=65535`.
    pub fn generate(prefix: &str, version: &FirmwareVersion) -> Self {
        let seed = rand::rng().random_range(1..=UPDATE_ID_SEED_MAX);
        Self::with_seed(prefix, seed, version)
    }

    /// Build an id from a fixed random component.
    pub fn with_seed(prefix: &str, seed: u32, version: &FirmwareVersion) -> Self {
        Self(format!("{prefix}-{seed}-{}", version.dashed()))
    }

    /// Check that a prefix only uses characters stream ids allow.
    ///
    /// # Errors
    ///
    /// Returns [`OtaError::InvalidUpdateIdPrefix`] for an empty prefix or one
    /// with characters outside `[A-Za-z0-9_-]`.
    pub fn validate_prefix(prefix: &str) -> Result<(), OtaError> {
        if prefix.is_empty() {
            return Err(OtaError::InvalidUpdateIdPrefix("prefix is empty".into()));
        }
        if let Some(c) = prefix
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(OtaError::InvalidUpdateIdPrefix(format!(
                "'{prefix}' contains '{c}'"
            )));
        }
        Ok(())
    }

    /// Borrow the id as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UpdateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
