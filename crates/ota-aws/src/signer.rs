//! AWS Signer profiles and signing jobs

use anyhow::{Context, Result};
use aws_sdk_signer::Client;
use aws_sdk_signer::types::{Destination, S3Destination, S3Source, SigningMaterial, Source};
use ota_update::service::{
    CodeSigner, SigningJobRequest, SigningJobState, SigningProfileRequest, SigningStatus,
};
use tracing::debug;

/// Signing parameter naming the certificate path on the device
pub const CERT_NAME_PARAMETER: &str = "certname";

/// Code signer backed by AWS Signer
#[derive(Clone)]
pub struct SignerClient {
    client: Client,
}

impl SignerClient {
    /// Create a signer client from shared AWS configuration
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

/// Signing source for one uploaded object version
pub fn signing_source(request: &SigningJobRequest) -> Result<Source> {
    let object = S3Source::builder()
        .bucket_name(&request.bucket)
        .key(&request.key)
        .version(&request.version)
        .build()
        .context("Invalid signing source")?;
    Ok(Source::builder().s3(object).build())
}

/// Signed output goes to the root of the source bucket
pub fn signing_destination(request: &SigningJobRequest) -> Destination {
    Destination::builder()
        .s3(S3Destination::builder().bucket_name(&request.bucket).build())
        .build()
}

#[async_trait::async_trait]
impl CodeSigner for SignerClient {
    async fn signing_profile_exists(&self, name: &str) -> Result<bool> {
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .client
                .list_signing_profiles()
                .set_next_token(next_token.take())
                .send()
                .await
                .context("Failed to list signing profiles")?;

            if output
                .profiles()
                .iter()
                .any(|p| p.profile_name() == Some(name))
            {
                return Ok(true);
            }

            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => return Ok(false),
            }
        }
    }

    async fn put_signing_profile(&self, request: &SigningProfileRequest) -> Result<String> {
        let material = SigningMaterial::builder()
            .certificate_arn(&request.certificate_arn)
            .build()
            .context("Invalid signing material")?;

        let output = self
            .client
            .put_signing_profile()
            .profile_name(&request.profile_name)
            .signing_material(material)
            .platform_id(&request.platform_id)
            .signing_parameters(CERT_NAME_PARAMETER, &request.cert_name)
            .send()
            .await
            .with_context(|| format!("Failed to create signing profile {}", request.profile_name))?;

        Ok(output.arn().unwrap_or_default().to_string())
    }

    async fn start_signing_job(&self, request: &SigningJobRequest) -> Result<String> {
        let output = self
            .client
            .start_signing_job()
            .source(signing_source(request)?)
            .destination(signing_destination(request))
            .profile_name(&request.profile_name)
            .client_request_token(&request.client_request_token)
            .send()
            .await
            .with_context(|| format!("Failed to start signing job for {}", request.key))?;

        output
            .job_id()
            .map(str::to_string)
            .context("Signing service returned no job id")
    }

    async fn signing_job_status(&self, job_id: &str) -> Result<SigningJobState> {
        let output = self
            .client
            .describe_signing_job()
            .job_id(job_id)
            .send()
            .await
            .with_context(|| format!("Failed to describe signing job {job_id}"))?;

        let status = output
            .status()
            .map_or(SigningStatus::InProgress, |s| SigningStatus::from(s.as_str()));
        debug!(job_id, status = %status, "Signing job status");

        Ok(SigningJobState {
            status,
            reason: output.status_reason().map(str::to_string),
        })
    }
}
