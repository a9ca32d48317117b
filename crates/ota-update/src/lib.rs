//! Firmware OTA publishing pipeline
//!
//! This crate turns a firmware build artifact into a live over-the-air update:
//! - Version resolution from a C version header or a dotted version string
//! - Versioned artifact naming and local staging
//! - Upload to versioned object storage
//! - Signing profile provisioning and code-signing with bounded polling
//! - Stream and OTA update job creation for a thing or thing group
//!
//! # Architecture
//!
//! - [`version`]: Firmware version triple and header macro extraction
//! - [`artifact`]: Artifact source selection, naming and staging
//! - [`target`]: Account context, ARN construction and update identifiers
//! - [`service`]: Async traits for the remote services the pipeline drives
//! - [`signing`]: Signing job poll loop
//! - [`pipeline`]: The sequential orchestrator
//! - [`error`]: Error types
//!
//! The remote services are reached only through the traits in [`service`];
//! concrete cloud clients live in a separate crate.
//!
//! # Failure handling
//!
//! Every step returns a `Result`. The first failure aborts the run and is
//! reported with the stage it happened in; no later stage is attempted.
//!
//! # Example
//!
//! ```ignore
//! use ota_update::prelude::*;
//!
//! # async fn example(services: Services, account: AccountContext) -> Result<(), OtaError> {
//! let source = ArtifactSource::select(0, "../code/amazon-freertos".as_ref(), "update.bin".as_ref(), None);
//! let plan = ArtifactPlan::resolve(&source).await?;
//!
//! let pipeline = OtaPipeline::new(services, account, PipelineConfig::new(
//!     "firmware-bucket", "ota-profile", "cert-id", "ota-role",
//!     TargetKind::Thing, "my-device",
//! ));
//! let report = pipeline.run(&plan).await?;
//! println!("Created OTA update {}", report.ota_update_id);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod artifact;
pub mod error;
pub mod pipeline;
pub mod prelude;
pub mod service;
pub mod signing;
pub mod target;
pub mod version;

pub use artifact::{ArtifactPlan, ArtifactSource, stage, versioned_file_name};
pub use error::{ErrorCategory, InStage, OtaError};
pub use pipeline::{
    OtaPipeline, OtaUpdateReport, PipelineConfig, Services, Stage, StageEvent, StageTiming,
};
pub use service::{
    CodeSigner, DeviceManagement, ObjectStore, OtaUpdateReceipt, OtaUpdateRequest,
    SigningJobRequest, SigningJobState, SigningProfileRequest, SigningStatus, StreamRequest,
};
pub use signing::{SigningPollConfig, SigningWait, wait_for_signing_job};
pub use target::{AccountContext, TargetKind, UpdateId};
pub use version::{FirmwareVersion, VersionConstants, parse_version_header, read_version_header};
