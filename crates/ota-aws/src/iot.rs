//! AWS IoT streams and OTA updates

use anyhow::{Context, Result};
use aws_sdk_iot::Client;
use aws_sdk_iot::types::{
    CodeSigning, FileLocation, OtaUpdateFile, S3Location, Stream, StreamFile, TargetSelection,
};
use ota_update::service::{DeviceManagement, OtaUpdateReceipt, OtaUpdateRequest, StreamRequest};
use tracing::info;

/// Device management backed by AWS IoT
#[derive(Clone)]
pub struct IotClient {
    client: Client,
}

impl IotClient {
    /// Create an IoT client from shared AWS configuration
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    /// Wrap an existing client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

/// Stream file entry pointing at the signed object version
pub fn stream_file(request: &StreamRequest) -> StreamFile {
    StreamFile::builder()
        .file_id(i32::from(request.file_id))
        .s3_location(
            S3Location::builder()
                .bucket(&request.bucket)
                .key(&request.key)
                .version(&request.version)
                .build(),
        )
        .build()
}

/// OTA file entry delivered over the stream and verified by the signing job
pub fn ota_update_file(request: &OtaUpdateRequest) -> OtaUpdateFile {
    let stream = Stream::builder()
        .stream_id(&request.stream_id)
        .file_id(i32::from(request.file_id))
        .build();

    OtaUpdateFile::builder()
        .file_name(&request.file_name)
        .file_version(&request.file_version)
        .file_location(FileLocation::builder().stream(stream).build())
        .code_signing(
            CodeSigning::builder()
                .aws_signer_job_id(&request.signer_job_id)
                .build(),
        )
        .build()
}

#[async_trait::async_trait]
impl DeviceManagement for IotClient {
    async fn create_stream(&self, request: &StreamRequest) -> Result<String> {
        let output = self
            .client
            .create_stream()
            .stream_id(&request.stream_id)
            .files(stream_file(request))
            .role_arn(&request.role_arn)
            .send()
            .await
            .with_context(|| format!("Failed to create stream {}", request.stream_id))?;

        let stream_id = output
            .stream_id()
            .unwrap_or(request.stream_id.as_str())
            .to_string();
        info!(stream_id = %stream_id, arn = ?output.stream_arn(), "Created stream");
        Ok(stream_id)
    }

    async fn create_ota_update(&self, request: &OtaUpdateRequest) -> Result<OtaUpdateReceipt> {
        let output = self
            .client
            .create_ota_update()
            .ota_update_id(&request.ota_update_id)
            .target_selection(TargetSelection::Snapshot)
            .files(ota_update_file(request))
            .set_targets(Some(request.targets.clone()))
            .role_arn(&request.role_arn)
            .send()
            .await
            .with_context(|| format!("Failed to create OTA update {}", request.ota_update_id))?;

        let receipt = OtaUpdateReceipt {
            ota_update_id: output
                .ota_update_id()
                .unwrap_or(request.ota_update_id.as_str())
                .to_string(),
            ota_update_arn: output.ota_update_arn().map(str::to_string),
            status: output.ota_update_status().map(|s| s.as_str().to_string()),
            job_id: output.aws_iot_job_id().map(str::to_string),
        };
        info!(
            ota_update_id = %receipt.ota_update_id,
            status = ?receipt.status,
            "Created OTA update"
        );
        Ok(receipt)
    }
}
