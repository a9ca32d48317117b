//! Artifact source selection, versioned naming and staging

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::OtaError;
use crate::version::{FirmwareVersion, read_version_header};

/// Version header location relative to the source tree
pub const VERSION_HEADER_PATH: &str = "demos/include/aws_application_version.h";
/// Build output directory relative to the source tree
pub const BUILD_DIR: &str = "build";
/// Stem of the build artifact produced in the source tree
pub const BUILD_STEM: &str = "aws_demos";
/// Extension of every staged artifact
pub const ARTIFACT_EXTENSION: &str = "bin";

/// Where the firmware image and its version come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    /// Application image built in a firmware source tree; the version is read
    /// from the tree's version header
    SourceTree {
        /// Root of the firmware source tree
        code_location: PathBuf,
    },
    /// Arbitrary update file with an explicit version string
    UpdateFile {
        /// Path to the update file
        path: PathBuf,
        /// Dotted version string
        version: String,
    },
}

impl ArtifactSource {
    /// Pick the source the way the command line describes it.
    ///
    /// File id 0 without an explicit version uses the source tree header;
    /// anything else uses the update file, with `0.0.0` when no version is
    /// given. A blank version counts as no version.
    pub fn select(
        file_id: u8,
        code_location: &Path,
        file_location: &Path,
        ota_version: Option<&str>,
    ) -> Self {
        let ota_version = ota_version.map(str::trim).filter(|v| !v.is_empty());
        match (file_id, ota_version) {
            (0, None) => ArtifactSource::SourceTree {
                code_location: code_location.to_path_buf(),
            },
            (_, version) => ArtifactSource::UpdateFile {
                path: file_location.to_path_buf(),
                version: version.unwrap_or_default().to_string(),
            },
        }
    }
}

/// Versioned object name: `<stem>_<major>.<minor>.<build>.bin`
pub fn versioned_file_name(stem: &str, version: &FirmwareVersion) -> String {
    format!("{stem}_{version}.{ARTIFACT_EXTENSION}")
}

/// Resolved names for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPlan {
    /// Resolved firmware version
    pub version: FirmwareVersion,
    /// Build artifact to copy from
    pub build_file: PathBuf,
    /// Object key and OTA file name
    pub object_key: String,
    /// Local path of the versioned copy
    pub staged_path: PathBuf,
}

impl ArtifactPlan {
    /// Resolve the version and compute names without touching the build file.
    ///
    /// # Errors
    ///
    /// Returns version errors from the header or version string, and
    /// [`OtaError::InvalidArtifactPath`] if the update file has no usable stem.
    pub async fn resolve(source: &ArtifactSource) -> Result<Self, OtaError> {
        match source {
            ArtifactSource::SourceTree { code_location } => {
                let header = code_location.join(VERSION_HEADER_PATH);
                let constants = read_version_header(&header).await?;
                let version = FirmwareVersion::from_constants(&constants)?;

                let build_dir = code_location.join(BUILD_DIR);
                let object_key = versioned_file_name(BUILD_STEM, &version);
                Ok(Self {
                    version,
                    build_file: build_dir.join(format!("{BUILD_STEM}.{ARTIFACT_EXTENSION}")),
                    staged_path: build_dir.join(&object_key),
                    object_key,
                })
            }
            ArtifactSource::UpdateFile { path, version } => {
                let version = FirmwareVersion::parse(version)?;
                let stem = path.file_stem().and_then(|s| s.to_str()).ok_or_else(|| {
                    OtaError::InvalidArtifactPath(format!(
                        "{} has no file name",
                        path.display()
                    ))
                })?;

                let object_key = versioned_file_name(stem, &version);
                let staged_path = path
                    .parent()
                    .map_or_else(|| PathBuf::from(&object_key), |p| p.join(&object_key));
                Ok(Self {
                    version,
                    build_file: path.clone(),
                    object_key,
                    staged_path,
                })
            }
        }
    }
}

/// Copy the build file to its versioned name.
///
/// Returns the number of bytes copied.
///
/// # Errors
///
/// Returns [`OtaError::ArtifactCopy`] if the copy fails.
pub async fn stage(plan: &ArtifactPlan) -> Result<u64, OtaError> {
    info!(
        from = %plan.build_file.display(),
        to = %plan.staged_path.display(),
        "Staging firmware artifact"
    );

    tokio::fs::copy(&plan.build_file, &plan.staged_path)
        .await
        .map_err(|source| OtaError::ArtifactCopy {
            from: plan.build_file.clone(),
            to: plan.staged_path.clone(),
            source,
        })
}
