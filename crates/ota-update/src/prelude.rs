//! Convenience re-exports for common OTA pipeline types

pub use crate::artifact::{ArtifactPlan, ArtifactSource, stage, versioned_file_name};
pub use crate::error::{ErrorCategory, InStage, OtaError};
pub use crate::pipeline::{
    OtaPipeline, OtaUpdateReport, PipelineConfig, Services, Stage, StageEvent, StageTiming,
};
pub use crate::service::{
    CodeSigner, DeviceManagement, ObjectStore, OtaUpdateReceipt, OtaUpdateRequest,
    SigningJobRequest, SigningJobState, SigningProfileRequest, SigningStatus, StreamRequest,
};
pub use crate::signing::{SigningPollConfig, SigningWait, wait_for_signing_job};
pub use crate::target::{AccountContext, TargetKind, UpdateId};
pub use crate::version::{
    FirmwareVersion, VersionConstants, parse_version_header, read_version_header,
};
