//! Shared AWS configuration, region and account resolution

use std::sync::Arc;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_sts::error::DisplayErrorContext;
use ota_update::{AccountContext, OtaError, Services};
use tracing::{debug, info};

use crate::{IotClient, S3ObjectStore, SignerClient};

/// Loaded AWS configuration plus the resolved region and account
#[derive(Clone)]
pub struct AwsSession {
    config: SdkConfig,
    account: AccountContext,
}

impl AwsSession {
    /// Load configuration for a named profile.
    ///
    /// An absent or empty region falls back to the profile's region; an
    /// absent or empty account is looked up with STS.
    pub async fn load(
        profile: &str,
        region: Option<&str>,
        account: Option<&str>,
    ) -> Result<Self, OtaError> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).profile_name(profile);
        if let Some(region) = non_empty(region) {
            loader = loader.region(Region::new(region.to_string()));
        }
        let config = loader.load().await;

        let region = config
            .region()
            .map(|r| r.as_ref().to_string())
            .ok_or_else(|| {
                OtaError::configuration(format!(
                    "No region given and profile '{profile}' does not define one"
                ))
            })?;

        let account_id = match non_empty(account) {
            Some(account) => account.to_string(),
            None => caller_account(&config).await?,
        };

        info!(profile, region = %region, account = %account_id, "Loaded AWS session");
        Ok(Self {
            account: AccountContext::new(region, account_id),
            config,
        })
    }

    /// Service clients for the publishing pipeline
    pub fn services(&self) -> Services {
        Services {
            store: Arc::new(S3ObjectStore::new(&self.config)),
            signer: Arc::new(SignerClient::new(&self.config)),
            devices: Arc::new(IotClient::new(&self.config)),
        }
    }

    /// Region and account the session resolved to
    pub fn account(&self) -> &AccountContext {
        &self.account
    }

    /// Underlying SDK configuration
    pub fn sdk_config(&self) -> &SdkConfig {
        &self.config
    }
}

async fn caller_account(config: &SdkConfig) -> Result<String, OtaError> {
    debug!("Resolving account id from caller identity");
    let output = aws_sdk_sts::Client::new(config)
        .get_caller_identity()
        .send()
        .await
        .map_err(|e| {
            OtaError::configuration(format!(
                "Failed to resolve account id: {}",
                DisplayErrorContext(&e)
            ))
        })?;

    output
        .account()
        .map(str::to_string)
        .ok_or_else(|| OtaError::configuration("Caller identity has no account id"))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
