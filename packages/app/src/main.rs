//! Demo binary: boots the studio and runs a few jobs while logging their
//! live updates.

use std::error::Error;

use api::{GenerateRequest, StartTrainingRequest, Studio, StudioConfig, init_studio};
use studio_core::{JobUpdate, UpdateCause};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = StudioConfig::from_env()?;
    let studio = init_studio(config).await?;

    let updates = studio.scheduler().broadcaster().subscribe_all();
    let logger = tokio::spawn(log_updates(updates));

    let result = run_demo(&studio).await;

    studio.shutdown()?;
    logger.abort();
    result
}

async fn run_demo(studio: &Studio) -> Result<(), Box<dyn Error>> {
    let model = studio
        .list_models()
        .await?
        .models
        .into_iter()
        .next()
        .ok_or("no model registered; set STUDIO_SEED_MODEL=true")?;
    let model_ref = model.id.to_string();

    let samples: Vec<String> = (0..10).map(|i| format!("sample-{i}.mp4")).collect();
    let first = studio
        .start_training(
            &model_ref,
            StartTrainingRequest {
                training_data: samples[..5].to_vec(),
                epochs: Some(5),
                ..StartTrainingRequest::default()
            },
        )
        .await?;
    let second = studio
        .start_training(
            &model_ref,
            StartTrainingRequest {
                training_data: samples[5..].to_vec(),
                epochs: Some(3),
                ..StartTrainingRequest::default()
            },
        )
        .await?;
    tracing::info!(
        first = %first.job_id,
        second = %second.job_id,
        estimated = %first.estimated_time,
        "Training jobs submitted"
    );

    let generated = studio
        .generate(GenerateRequest {
            prompt: "a lighthouse at dusk".into(),
            resolution: Some("1920x1080".into()),
            duration: Some(5.0),
            ..GenerateRequest::default()
        })
        .await?;
    tracing::info!(
        processing_ms = generated.processing_time,
        artifact = %serde_json::to_string(&generated.artifact)?,
        "Generation finished"
    );

    for job_id in [first.job_id, second.job_id] {
        studio.scheduler().wait(job_id).await?;
        let status = studio.training_status(&job_id.to_string()).await?;
        tracing::info!(
            job_id = %job_id,
            status = %status.status,
            message = %status.message,
            "Training finished"
        );
    }

    let jobs = studio.list_jobs().await?;
    println!("{}", serde_json::to_string_pretty(&jobs)?);
    Ok(())
}

async fn log_updates(mut rx: broadcast::Receiver<JobUpdate>) {
    loop {
        match rx.recv().await {
            Ok(update) => match &update.cause {
                UpdateCause::Progress(event) => {
                    tracing::info!(job_id = %update.job_id, "{}", event.description());
                }
                cause => {
                    tracing::info!(
                        job_id = %update.job_id,
                        status = update.job.status.as_str(),
                        cause = ?cause,
                        "Job update"
                    );
                }
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Update log fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
