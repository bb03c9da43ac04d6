mod common;

use std::error::Error;
use std::time::Duration;

use api::{
    ApiError, CancelJobRequest, CreateModelRequest, GenerateRequest, JobStatus, ServerMessage,
    StartTrainingRequest, StudioConfig, init_studio,
};
use assert_matches::assert_matches;
use common::{TEST_TIMEOUT, samples};
use serde_json::json;
use studio_core::{JobId, ModelConfig, StudioError};

fn training(epochs: u32) -> StartTrainingRequest {
    StartTrainingRequest {
        training_data: samples(),
        epochs: Some(epochs),
        ..StartTrainingRequest::default()
    }
}

#[tokio::test]
async fn seeds_a_model_on_empty_start() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let studio = common::studio(dir.path()).await?;

    let models = studio.list_models().await?.models;
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].kind, api::ModelKind::TextToVideo);

    let fetched = studio.get_model(&models[0].id.to_string()).await?;
    assert_eq!(fetched.model, models[0]);
    Ok(())
}

#[tokio::test]
async fn generate_without_models_is_not_found() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let studio = init_studio(StudioConfig {
        seed_model: false,
        ..common::config(dir.path())
    })
    .await?;

    let err = studio
        .generate(GenerateRequest {
            prompt: "a fox".into(),
            ..GenerateRequest::default()
        })
        .await
        .unwrap_err();
    assert_matches!(err, ApiError::NoModels);
    assert_eq!(err.status_code(), 404);
    Ok(())
}

#[tokio::test]
async fn training_runs_to_completion() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let studio = common::studio(dir.path()).await?;
    let model = studio.list_models().await?.models.remove(0);

    let started = studio
        .start_training(&model.id.to_string(), training(8))
        .await?;
    assert_eq!(started.status, "processing");
    assert_eq!(started.estimated_time, "1s");

    let json = serde_json::to_value(&started)?;
    assert!(json.get("jobId").is_some());
    assert!(json.get("estimatedTime").is_some());

    tokio::time::timeout(TEST_TIMEOUT, studio.scheduler().wait(started.job_id)).await??;

    let status = studio.training_status(&started.job_id.to_string()).await?;
    assert_eq!(status.status, "completed");
    assert_eq!(status.progress, 100.0);
    assert_eq!(status.estimated_time_remaining, "0s");
    assert!(status.message.starts_with("Trained 8 epochs"), "{}", status.message);

    let trained = studio.get_model(&model.id.to_string()).await?.model;
    assert!(trained.trained);
    assert_eq!(trained.metrics.map(|m| m.epochs), Some(8));
    Ok(())
}

#[tokio::test]
async fn training_accepts_a_model_type() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let studio = common::studio(dir.path()).await?;
    let model = studio.list_models().await?.models.remove(0);

    let started = studio.start_training("text-to-video", training(2)).await?;
    let job = studio.job_status(&started.job_id.to_string()).await?.job;
    assert_eq!(job.model_id, model.id);

    let err = studio.start_training("image-to-video", training(2)).await.unwrap_err();
    assert_matches!(err, ApiError::NoModels);
    Ok(())
}

#[tokio::test]
async fn training_rejects_bad_input() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let studio = common::studio(dir.path()).await?;
    let model = studio.list_models().await?.models.remove(0);

    let err = studio.start_training("banana", training(2)).await.unwrap_err();
    assert_matches!(err, ApiError::InvalidId { what: "model", .. });
    assert_eq!(err.status_code(), 400);

    let missing = studio_core::ModelId::new().to_string();
    let err = studio.start_training(&missing, training(2)).await.unwrap_err();
    assert_matches!(err, ApiError::Studio(StudioError::ModelNotFound(_)));
    assert_eq!(err.status_code(), 404);

    let err = studio
        .start_training(&model.id.to_string(), StartTrainingRequest::default())
        .await
        .unwrap_err();
    assert_matches!(err, ApiError::Studio(StudioError::InvalidConfig(_)));
    assert_eq!(err.status_code(), 400);

    assert!(studio.list_jobs().await?.jobs.is_empty());
    Ok(())
}

#[tokio::test]
async fn generate_returns_the_artifact() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let studio = common::studio(dir.path()).await?;
    let model = studio.list_models().await?.models.remove(0);

    let response = tokio::time::timeout(
        TEST_TIMEOUT,
        studio.generate(GenerateRequest {
            prompt: "a fox in the snow".into(),
            resolution: Some("1920x1080".into()),
            duration: Some(5.0),
            ..GenerateRequest::default()
        }),
    )
    .await??;

    let artifact = &response.artifact;
    assert_eq!((artifact.width, artifact.height), (1920, 1080));
    assert_eq!(artifact.duration, 5.0);
    assert_eq!(artifact.model_id, model.id);
    assert_eq!(artifact.prompt, "a fox in the snow");

    let json = serde_json::to_value(&response)?;
    assert!(json.get("processingTime").is_some());
    Ok(())
}

#[tokio::test]
async fn generate_rejects_invalid_resolution() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let studio = common::studio(dir.path()).await?;

    let err = studio
        .generate(GenerateRequest {
            prompt: "a fox".into(),
            resolution: Some("wide".into()),
            ..GenerateRequest::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
    Ok(())
}

#[tokio::test]
async fn model_lifecycle() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let studio = common::studio(dir.path()).await?;

    let err = studio
        .create_model(CreateModelRequest {
            kind: "text-to-smell".into(),
            config: ModelConfig::new(),
        })
        .await
        .unwrap_err();
    assert_matches!(err, ApiError::UnsupportedModelType(_));

    let request: CreateModelRequest =
        serde_json::from_value(json!({"type": "text-to-audio", "config": {"layers": 2}}))?;
    let created = studio.create_model(request).await?;
    assert!(created.success);
    let id = created.model.id.to_string();

    let saved = studio.save_model(&id).await?;
    assert!(saved.success);
    assert_eq!(saved.message, "Model saved successfully");
    assert!(saved.path.exists());

    let deleted = studio.delete_model(&id).await?;
    assert_eq!(deleted, api::ActionResponse::new(true, "Model unloaded"));
    assert!(!saved.path.exists());

    let again = studio.delete_model(&id).await?;
    assert_eq!(again, api::ActionResponse::new(false, "Model not found"));

    let err = studio.get_model(&id).await.unwrap_err();
    assert_eq!(err.status_code(), 404);
    assert_eq!(err.body().success, false);
    Ok(())
}

#[tokio::test]
async fn saved_models_survive_a_restart() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let first = common::studio(dir.path()).await?;
    let model = first.list_models().await?.models.remove(0);
    first.save_model(&model.id.to_string()).await?;
    first.shutdown()?;

    let second = common::studio(dir.path()).await?;
    let models = second.list_models().await?.models;
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].id, model.id);
    assert!(models[0].storage_path.is_some());
    Ok(())
}

#[tokio::test]
async fn autosave_persists_trained_models() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let studio = init_studio(StudioConfig {
        autosave: true,
        ..common::config(dir.path())
    })
    .await?;
    let model = studio.list_models().await?.models.remove(0);

    let started = studio.start_training(&model.id.to_string(), training(3)).await?;
    tokio::time::timeout(TEST_TIMEOUT, studio.scheduler().wait(started.job_id)).await??;

    // The autosave lands shortly after completion.
    let path = dir.path().join("models").join(format!("{}.json", model.id));
    tokio::time::timeout(TEST_TIMEOUT, async {
        while studio.get_model(&model.id.to_string()).await?.model.storage_path.is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok::<_, ApiError>(())
    })
    .await??;
    let saved: studio_core::Model = serde_json::from_slice(&std::fs::read(path)?)?;
    assert!(saved.trained);
    Ok(())
}

#[tokio::test]
async fn cancel_through_the_api() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let studio = init_studio(StudioConfig {
        epoch_delay: Duration::from_millis(50),
        ..common::config(dir.path())
    })
    .await?;
    let model = studio.list_models().await?.models.remove(0);

    let started = studio.start_training(&model.id.to_string(), training(100)).await?;
    let id = started.job_id.to_string();

    let response = studio
        .cancel_job(
            &id,
            CancelJobRequest {
                reason: Some("changed my mind".into()),
            },
        )
        .await?;
    assert!(response.success);

    let job = tokio::time::timeout(TEST_TIMEOUT, studio.scheduler().wait(started.job_id)).await??;
    assert_matches!(job.status, JobStatus::Cancelled { .. });

    let status = studio.training_status(&id).await?;
    assert_eq!(status.status, "cancelled");
    assert_eq!(status.message, "changed my mind");

    let err = studio.cancel_job(&id, CancelJobRequest::default()).await.unwrap_err();
    assert_matches!(err, ApiError::Studio(StudioError::JobFinished(_)));
    assert_eq!(err.status_code(), 400);
    Ok(())
}

#[tokio::test]
async fn unknown_jobs_are_not_found() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let studio = common::studio(dir.path()).await?;
    let missing = JobId::new().to_string();

    let err = studio.job_status(&missing).await.unwrap_err();
    assert_matches!(err, ApiError::Studio(StudioError::JobNotFound(_)));
    assert_eq!(studio.training_status(&missing).await.unwrap_err().status_code(), 404);

    let err = studio.job_status("???").await.unwrap_err();
    assert_matches!(err, ApiError::InvalidId { what: "job", .. });
    Ok(())
}

#[tokio::test]
async fn websocket_session_streams_job_updates() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let studio = init_studio(StudioConfig {
        epoch_delay: Duration::from_millis(50),
        ..common::config(dir.path())
    })
    .await?;
    let model = studio.list_models().await?.models.remove(0);
    let (mut session, mut rx) = studio.open_session();

    let started = studio.start_training(&model.id.to_string(), training(4)).await?;
    session.handle_text(&json!({"type": "subscribe", "jobId": started.job_id}).to_string());
    assert_eq!(
        rx.recv().await,
        Some(ServerMessage::Subscribed {
            job_id: started.job_id
        })
    );

    let collect = async {
        let mut progress = Vec::new();
        while let Some(message) = rx.recv().await {
            let ServerMessage::JobUpdate { job_id, data } = message else {
                continue;
            };
            assert_eq!(job_id, started.job_id);
            progress.push(data.progress);
            if data.is_terminal() {
                return Some((data, progress));
            }
        }
        None
    };
    let (job, progress) = tokio::time::timeout(TEST_TIMEOUT, collect)
        .await?
        .ok_or("session closed before the job finished")?;

    assert_eq!(job.status.as_str(), "completed");
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));

    drop(session);
    assert_eq!(
        studio.scheduler().broadcaster().subscriber_count(started.job_id),
        0
    );
    Ok(())
}
