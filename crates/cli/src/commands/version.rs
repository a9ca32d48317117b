//! Offline version resolution
//!
//! Resolves the firmware version and versioned file name exactly as
//! `otactl update` would, without touching AWS. `--stage` also performs the
//! local copy.

use anyhow::Result;
use ota_update::{ArtifactPlan, ArtifactSource, stage};
use serde::Serialize;
use std::path::PathBuf;

use crate::commands::VersionArgs;
use crate::output;

/// Resolved version and file names
#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    /// Dotted version
    pub version: String,
    /// `header` or `argument`
    pub source: &'static str,
    /// File that would be copied
    pub build_file: PathBuf,
    /// Versioned object key
    pub object_key: String,
    /// Local path of the versioned copy
    pub staged_path: PathBuf,
    /// Bytes copied when staging was requested
    pub staged_bytes: Option<u64>,
}

/// Execute version command
pub async fn execute(args: &VersionArgs, json: bool) -> Result<()> {
    let source = args.source.source();
    let plan = ArtifactPlan::resolve(&source).await?;

    let staged_bytes = if args.stage {
        Some(stage(&plan).await?)
    } else {
        None
    };

    let info = VersionInfo {
        version: plan.version.to_string(),
        source: match source {
            ArtifactSource::SourceTree { .. } => "header",
            ArtifactSource::UpdateFile { .. } => "argument",
        },
        build_file: plan.build_file,
        object_key: plan.object_key,
        staged_path: plan.staged_path,
        staged_bytes,
    };

    output::print_version_info(&info, json)
}
