//! Integration tests for the OTA publishing pipeline

use anyhow::Result;
use ota_update::prelude::*;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Mutex;

type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Mock object store: every key has version `ver-<key>` unless listed as missing
#[derive(Default)]
struct MockObjectStore {
    uploads: Mutex<Vec<(String, String, PathBuf)>>,
    missing: Mutex<HashSet<String>>,
    fail_upload: bool,
}

#[async_trait::async_trait]
impl ObjectStore for MockObjectStore {
    async fn upload(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        if self.fail_upload {
            anyhow::bail!("access denied");
        }
        self.uploads
            .lock()
            .await
            .push((bucket.to_string(), key.to_string(), path.to_path_buf()));
        Ok(())
    }

    async fn latest_version(&self, _bucket: &str, key: &str) -> Result<Option<String>> {
        if self.missing.lock().await.contains(key) {
            return Ok(None);
        }
        Ok(Some(format!("ver-{key}")))
    }
}

/// Mock signer with a scripted status sequence (last entry repeats)
struct MockSigner {
    profiles: Mutex<Vec<String>>,
    created: Mutex<Vec<SigningProfileRequest>>,
    jobs: Mutex<Vec<SigningJobRequest>>,
    statuses: Mutex<VecDeque<SigningStatus>>,
}

impl MockSigner {
    fn new(existing_profiles: &[&str], statuses: &[SigningStatus]) -> Self {
        Self {
            profiles: Mutex::new(existing_profiles.iter().map(ToString::to_string).collect()),
            created: Mutex::new(Vec::new()),
            jobs: Mutex::new(Vec::new()),
            statuses: Mutex::new(statuses.iter().cloned().collect()),
        }
    }

    fn succeeding() -> Self {
        Self::new(
            &["ota-profile"],
            &[SigningStatus::InProgress, SigningStatus::Succeeded],
        )
    }
}

#[async_trait::async_trait]
impl CodeSigner for MockSigner {
    async fn signing_profile_exists(&self, name: &str) -> Result<bool> {
        Ok(self.profiles.lock().await.iter().any(|p| p == name))
    }

    async fn put_signing_profile(&self, request: &SigningProfileRequest) -> Result<String> {
        self.profiles
            .lock()
            .await
            .push(request.profile_name.clone());
        self.created.lock().await.push(request.clone());
        Ok(format!(
            "arn:aws:signer:us-east-1:123456789012:/signing-profiles/{}",
            request.profile_name
        ))
    }

    async fn start_signing_job(&self, request: &SigningJobRequest) -> Result<String> {
        self.jobs.lock().await.push(request.clone());
        Ok("signing-job-42".to_string())
    }

    async fn signing_job_status(&self, _job_id: &str) -> Result<SigningJobState> {
        let mut statuses = self.statuses.lock().await;
        let status = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        let status = status.ok_or_else(|| anyhow::anyhow!("no status scripted"))?;
        Ok(SigningJobState {
            reason: (status == SigningStatus::Failed).then(|| "certificate expired".to_string()),
            status,
        })
    }
}

/// Mock device management service recording requests
#[derive(Default)]
struct MockDeviceManagement {
    streams: Mutex<Vec<StreamRequest>>,
    updates: Mutex<Vec<OtaUpdateRequest>>,
}

#[async_trait::async_trait]
impl DeviceManagement for MockDeviceManagement {
    async fn create_stream(&self, request: &StreamRequest) -> Result<String> {
        self.streams.lock().await.push(request.clone());
        Ok(request.stream_id.clone())
    }

    async fn create_ota_update(&self, request: &OtaUpdateRequest) -> Result<OtaUpdateReceipt> {
        self.updates.lock().await.push(request.clone());
        Ok(OtaUpdateReceipt {
            ota_update_id: request.ota_update_id.clone(),
            ota_update_arn: Some(format!(
                "arn:aws:iot:us-east-1:123456789012:otaupdate/{}",
                request.ota_update_id
            )),
            status: Some("CREATE_PENDING".to_string()),
            job_id: None,
        })
    }
}

struct Harness {
    store: Arc<MockObjectStore>,
    signer: Arc<MockSigner>,
    devices: Arc<MockDeviceManagement>,
    _dir: TempDir,
    plan: ArtifactPlan,
}

impl Harness {
    async fn new(store: MockObjectStore, signer: MockSigner) -> Result<Self> {
        let dir = TempDir::new()?;
        let build_file = dir.path().join("update.bin");
        tokio::fs::write(&build_file, b"firmware image").await?;

        let source = ArtifactSource::UpdateFile {
            path: build_file,
            version: "1.2.3".to_string(),
        };
        let plan = ArtifactPlan::resolve(&source).await?;

        Ok(Self {
            store: Arc::new(store),
            signer: Arc::new(signer),
            devices: Arc::new(MockDeviceManagement::default()),
            _dir: dir,
            plan,
        })
    }

    fn pipeline(&self, config: PipelineConfig) -> OtaPipeline {
        let services = Services {
            store: self.store.clone(),
            signer: self.signer.clone(),
            devices: self.devices.clone(),
        };
        OtaPipeline::new(
            services,
            AccountContext::new("us-east-1", "123456789012"),
            config,
        )
    }
}

fn config() -> PipelineConfig {
    PipelineConfig::new(
        "firmware-bucket",
        "ota-profile",
        "cert-1234",
        "ota-role",
        TargetKind::Thing,
        "esp32-devkit",
    )
}

#[tokio::test(start_paused = true)]
async fn test_full_pipeline_publishes_update() -> TestResult {
    let harness = Harness::new(MockObjectStore::default(), MockSigner::succeeding()).await?;
    let pipeline = harness.pipeline(config());

    let report = pipeline.run(&harness.plan).await?;

    // Staged copy exists next to the build file
    let staged = tokio::fs::read(&harness.plan.staged_path).await?;
    assert_eq!(staged, b"firmware image");

    let uploads = harness.store.uploads.lock().await.clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].0, "firmware-bucket");
    assert_eq!(uploads[0].1, "update_1.2.3.bin");
    assert_eq!(uploads[0].2, harness.plan.staged_path);

    let jobs = harness.signer.jobs.lock().await.clone();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].key, "update_1.2.3.bin");
    assert_eq!(jobs[0].version, "ver-update_1.2.3.bin");
    assert_eq!(jobs[0].profile_name, "ota-profile");
    assert_eq!(jobs[0].client_request_token, report.ota_update_id);

    let streams = harness.devices.streams.lock().await.clone();
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0].key, "signing-job-42");
    assert_eq!(streams[0].version, "ver-signing-job-42");
    assert_eq!(streams[0].stream_id, report.ota_update_id);
    assert_eq!(streams[0].role_arn, "arn:aws:iam::123456789012:role/ota-role");

    let updates = harness.devices.updates.lock().await.clone();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].file_name, "update_1.2.3.bin");
    assert_eq!(updates[0].file_version, "1");
    assert_eq!(updates[0].signer_job_id, "signing-job-42");
    assert_eq!(
        updates[0].targets,
        vec!["arn:aws:iot:us-east-1:123456789012:thing/esp32-devkit".to_string()]
    );

    assert!(report.ota_update_id.starts_with("esp-"));
    assert!(report.ota_update_id.ends_with("-1-2-3"));
    assert_eq!(report.version, FirmwareVersion::new(1, 2, 3));
    assert_eq!(report.signing_attempts, 2);
    assert_eq!(report.ota_update_status.as_deref(), Some("CREATE_PENDING"));
    assert!(report.created_profile_arn.is_none());
    assert_eq!(report.timings.len(), Stage::ALL.len());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_missing_profile_is_created() -> TestResult {
    let signer = MockSigner::new(&["other-profile"], &[SigningStatus::Succeeded]);
    let harness = Harness::new(MockObjectStore::default(), signer).await?;

    let report = harness.pipeline(config()).run(&harness.plan).await?;

    let created = harness.signer.created.lock().await.clone();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].profile_name, "ota-profile");
    assert_eq!(
        created[0].certificate_arn,
        "arn:aws:acm:us-east-1:123456789012:certificate/cert-1234"
    );
    assert_eq!(created[0].platform_id, "AmazonFreeRTOS-Default");
    assert_eq!(created[0].cert_name, "otasigner.crt");
    assert!(report.created_profile_arn.is_some());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_signing_timeout_aborts_before_stream() -> TestResult {
    let signer = MockSigner::new(&["ota-profile"], &[SigningStatus::InProgress]);
    let harness = Harness::new(MockObjectStore::default(), signer).await?;

    let result = harness.pipeline(config()).run(&harness.plan).await;

    assert!(matches!(
        result,
        Err(OtaError::SigningTimeout { ref job_id, .. }) if job_id == "signing-job-42"
    ));
    assert!(harness.devices.streams.lock().await.is_empty());
    assert!(harness.devices.updates.lock().await.is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_signing_failure_aborts() -> TestResult {
    let signer = MockSigner::new(&["ota-profile"], &[SigningStatus::Failed]);
    let harness = Harness::new(MockObjectStore::default(), signer).await?;

    let result = harness.pipeline(config()).run(&harness.plan).await;

    match result {
        Err(OtaError::SigningFailed { reason, .. }) => {
            assert_eq!(reason, "certificate expired");
        }
        other => return Err(format!("expected signing failure, got {other:?}").into()),
    }
    assert!(harness.devices.streams.lock().await.is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_upload_failure_stops_pipeline() -> TestResult {
    let store = MockObjectStore {
        fail_upload: true,
        ..MockObjectStore::default()
    };
    let harness = Harness::new(store, MockSigner::succeeding()).await?;

    let result = harness.pipeline(config()).run(&harness.plan).await;

    let err = result.err().ok_or("expected upload failure")?;
    assert_eq!(err.stage(), Some(Stage::Upload));
    assert_eq!(err.category(), ErrorCategory::Remote);
    assert!(harness.signer.jobs.lock().await.is_empty());
    assert!(harness.devices.updates.lock().await.is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_missing_object_version_stops_pipeline() -> TestResult {
    let store = MockObjectStore::default();
    store
        .missing
        .lock()
        .await
        .insert("update_1.2.3.bin".to_string());
    let harness = Harness::new(store, MockSigner::succeeding()).await?;

    let result = harness.pipeline(config()).run(&harness.plan).await;

    assert!(matches!(
        result,
        Err(OtaError::ObjectVersionNotFound { ref key, .. }) if key == "update_1.2.3.bin"
    ));
    assert!(harness.signer.jobs.lock().await.is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_missing_build_file_stops_before_upload() -> TestResult {
    let harness = Harness::new(MockObjectStore::default(), MockSigner::succeeding()).await?;
    tokio::fs::remove_file(&harness.plan.build_file).await?;

    let result = harness.pipeline(config()).run(&harness.plan).await;

    assert!(matches!(result, Err(OtaError::ArtifactCopy { .. })));
    assert!(harness.store.uploads.lock().await.is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_group_target_and_file_id() -> TestResult {
    let harness = Harness::new(MockObjectStore::default(), MockSigner::succeeding()).await?;
    let mut config = config();
    config.target_kind = TargetKind::Group;
    config.target_name = "fleet-a".to_string();
    config.file_id = 2;
    config.update_id_prefix = "fw".to_string();

    let report = harness.pipeline(config).run(&harness.plan).await?;

    assert_eq!(
        report.target_arn,
        "arn:aws:iot:us-east-1:123456789012:thinggroup/fleet-a"
    );
    assert!(report.ota_update_id.starts_with("fw-"));
    let streams = harness.devices.streams.lock().await.clone();
    assert_eq!(streams[0].file_id, 2);
    let updates = harness.devices.updates.lock().await.clone();
    assert_eq!(updates[0].file_id, 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_invalid_prefix_rejected_before_any_call() -> TestResult {
    let harness = Harness::new(MockObjectStore::default(), MockSigner::succeeding()).await?;
    let mut config = config();
    config.update_id_prefix = "bad prefix".to_string();

    let result = harness.pipeline(config).run(&harness.plan).await;

    assert!(matches!(result, Err(OtaError::InvalidUpdateIdPrefix(_))));
    assert!(!harness.plan.staged_path.exists());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_progress_events_in_stage_order() -> TestResult {
    let harness = Harness::new(MockObjectStore::default(), MockSigner::succeeding()).await?;
    let pipeline = harness.pipeline(config());
    let mut progress = pipeline.subscribe_progress();

    pipeline.run(&harness.plan).await?;

    let mut started = Vec::new();
    while let Ok(event) = progress.try_recv() {
        if let StageEvent::Started(stage) = event {
            started.push(stage);
        }
    }
    assert_eq!(started, Stage::ALL.to_vec());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_failed_stage_event_published() -> TestResult {
    let signer = MockSigner::new(&["ota-profile"], &[SigningStatus::InProgress]);
    let harness = Harness::new(MockObjectStore::default(), signer).await?;
    let pipeline = harness.pipeline(config());
    let mut progress = pipeline.subscribe_progress();

    let result = pipeline.run(&harness.plan).await;
    assert!(result.is_err());

    let mut events = Vec::new();
    while let Ok(event) = progress.try_recv() {
        events.push(event);
    }
    assert!(matches!(
        events.last(),
        Some(StageEvent::Failed {
            stage: Stage::Sign,
            ..
        })
    ));
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, StageEvent::Started(Stage::CreateStream)))
    );
    Ok(())
}

#[tokio::test]
async fn test_source_tree_plan_from_header() -> TestResult {
    let dir = TempDir::new()?;
    let include = dir.path().join("demos/include");
    tokio::fs::create_dir_all(&include).await?;
    tokio::fs::write(
        include.join("aws_application_version.h"),
        "#define APP_VERSION_MAJOR 0\n#define APP_VERSION_MINOR 9\n#define APP_VERSION_BUILD 2\n",
    )
    .await?;

    let source = ArtifactSource::select(0, dir.path(), Path::new("update.bin"), None);
    let plan = ArtifactPlan::resolve(&source).await?;

    assert_eq!(plan.version, FirmwareVersion::new(0, 9, 2));
    assert_eq!(plan.object_key, "aws_demos_0.9.2.bin");
    assert_eq!(plan.build_file, dir.path().join("build/aws_demos.bin"));
    assert_eq!(plan.staged_path, dir.path().join("build/aws_demos_0.9.2.bin"));
    Ok(())
}

#[tokio::test]
async fn test_source_tree_without_header_fails() -> TestResult {
    let dir = TempDir::new()?;
    let source = ArtifactSource::select(0, dir.path(), Path::new("update.bin"), None);

    let result = ArtifactPlan::resolve(&source).await;

    let err = result.err().ok_or("expected header error")?;
    assert!(matches!(err, OtaError::HeaderUnreadable { .. }));
    assert_eq!(err.category(), ErrorCategory::Filesystem);
    Ok(())
}
