//! Model registry actor and its typed handle.
//!
//! All reads and writes go through the actor's mailbox, so every caller sees
//! the latest committed state and concurrent jobs never race on the map.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ractor::{Actor, ActorProcessingErr, ActorRef};
use studio_core::{Model, ModelConfig, ModelId, ModelKind, StudioError, TrainingMetrics};

use crate::messages::RegistryMessage;
use crate::persistence::ModelStore;
use crate::request;

/// State for the registry actor.
#[derive(Default)]
pub struct RegistryState {
    models: HashMap<ModelId, Model>,
}

impl RegistryState {
    /// Runs inside the actor: an unload lands wholly before or after it.
    async fn save(&mut self, model_id: ModelId, dir: PathBuf) -> Result<PathBuf, StudioError> {
        let model = self
            .models
            .get_mut(&model_id)
            .ok_or(StudioError::ModelNotFound(model_id))?;
        let path = ModelStore::new(dir).save(model).await?;
        model.storage_path = Some(path.clone());
        tracing::info!(model_id = %model_id, path = ?path, "Model saved");
        Ok(path)
    }
}

/// Actor owning every registered model.
pub struct ModelRegistryActor;

impl Actor for ModelRegistryActor {
    type Msg = RegistryMessage;
    type State = RegistryState;
    type Arguments = ();

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        _args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting model registry");
        Ok(RegistryState::default())
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            RegistryMessage::Create {
                kind,
                config,
                reply,
            } => {
                let model = Model::new(kind, config);
                tracing::info!(
                    model_id = %model.id,
                    kind = %model.kind,
                    parameters = model.parameters,
                    "Model created"
                );
                state.models.insert(model.id, model.clone());
                let _ = reply.send(model);
            }

            RegistryMessage::Restore { model, reply } => {
                let model = *model;
                if state.models.contains_key(&model.id) {
                    let _ = reply.send(Err(StudioError::invalid_config(format!(
                        "model {} is already registered",
                        model.id
                    ))));
                    return Ok(());
                }
                tracing::info!(model_id = %model.id, kind = %model.kind, "Model restored");
                state.models.insert(model.id, model);
                let _ = reply.send(Ok(()));
            }

            RegistryMessage::Get { model_id, reply } => {
                let _ = reply.send(state.models.get(&model_id).cloned());
            }

            RegistryMessage::List { reply } => {
                let mut models: Vec<Model> = state.models.values().cloned().collect();
                models.sort_by_key(|m| (m.created_at, m.id));
                let _ = reply.send(models);
            }

            RegistryMessage::MarkTrained {
                model_id,
                metrics,
                reply,
            } => {
                let result = match state.models.get_mut(&model_id) {
                    Some(model) => {
                        model.mark_trained(metrics);
                        tracing::info!(
                            model_id = %model_id,
                            loss = metrics.loss,
                            accuracy = metrics.accuracy,
                            "Model marked trained"
                        );
                        Ok(model.clone())
                    }
                    None => Err(StudioError::ModelNotFound(model_id)),
                };
                let _ = reply.send(result);
            }

            RegistryMessage::Save {
                model_id,
                dir,
                reply,
            } => {
                let _ = reply.send(state.save(model_id, dir).await);
            }

            RegistryMessage::Unload { model_id, reply } => {
                let removed = state.models.remove(&model_id).is_some();
                if removed {
                    tracing::info!(model_id = %model_id, "Model unloaded");
                }
                let _ = reply.send(removed);
            }
        }

        Ok(())
    }
}

/// Cloneable handle to the registry actor.
#[derive(Clone)]
pub struct ModelRegistry {
    actor: ActorRef<RegistryMessage>,
}

impl ModelRegistry {
    pub fn new(actor: ActorRef<RegistryMessage>) -> Self {
        Self { actor }
    }

    pub fn actor(&self) -> &ActorRef<RegistryMessage> {
        &self.actor
    }

    /// Register a new untrained model.
    pub async fn create(&self, kind: ModelKind, config: ModelConfig) -> Result<Model, StudioError> {
        request(&self.actor, |reply| RegistryMessage::Create { kind, config, reply }).await
    }

    /// Get a model, or `ModelNotFound`.
    pub async fn get(&self, model_id: ModelId) -> Result<Model, StudioError> {
        request(&self.actor, |reply| RegistryMessage::Get { model_id, reply })
            .await?
            .ok_or(StudioError::ModelNotFound(model_id))
    }

    pub async fn list(&self) -> Result<Vec<Model>, StudioError> {
        request(&self.actor, |reply| RegistryMessage::List { reply }).await
    }

    /// Mark a model trained with the final metrics of its run.
    pub async fn mark_trained(
        &self,
        model_id: ModelId,
        metrics: TrainingMetrics,
    ) -> Result<Model, StudioError> {
        request(&self.actor, |reply| RegistryMessage::MarkTrained {
            model_id,
            metrics,
            reply,
        })
        .await?
    }

    /// Save a model's metadata under `dir` and record the file path.
    ///
    /// On a write failure the registered model is left untouched.
    pub async fn save(
        &self,
        model_id: ModelId,
        dir: impl AsRef<Path>,
    ) -> Result<PathBuf, StudioError> {
        let dir = dir.as_ref().to_path_buf();
        request(&self.actor, |reply| RegistryMessage::Save {
            model_id,
            dir,
            reply,
        })
        .await?
    }

    /// Remove a model; false when it was not registered.
    pub async fn unload(&self, model_id: ModelId) -> Result<bool, StudioError> {
        request(&self.actor, |reply| RegistryMessage::Unload { model_id, reply }).await
    }

    /// Restore every saved model found in `dir`.
    ///
    /// Unreadable files and ids that are already registered are skipped.
    pub async fn load_dir(&self, dir: impl AsRef<Path>) -> Result<usize, StudioError> {
        let store = ModelStore::new(dir);
        let mut restored = 0;

        for (path, loaded) in store.load_all().await? {
            let mut model = match loaded {
                Ok(model) => model,
                Err(e) => {
                    tracing::warn!(path = ?path, error = %e, "Skipping unreadable model file");
                    continue;
                }
            };
            model.storage_path = Some(path.clone());

            let model_id = model.id;
            match request(&self.actor, |reply| RegistryMessage::Restore {
                model: Box::new(model),
                reply,
            })
            .await?
            {
                Ok(()) => restored += 1,
                Err(e) => tracing::warn!(model_id = %model_id, error = %e, "Skipping model"),
            }
        }

        tracing::info!(count = restored, dir = ?store.dir(), "Restored saved models");
        Ok(restored)
    }
}

/// Start the model registry actor.
pub async fn start_model_registry()
-> Result<(ModelRegistry, tokio::task::JoinHandle<()>), ractor::SpawnErr> {
    let (actor, handle) = Actor::spawn(None, ModelRegistryActor, ()).await?;
    Ok((ModelRegistry::new(actor), handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn create_get_list_unload() -> Result<(), Box<dyn std::error::Error>> {
        let (registry, _handle) = start_model_registry().await?;

        let a = registry.create(ModelKind::TextToVideo, ModelConfig::new()).await?;
        let b = registry.create(ModelKind::ImageToVideo, ModelConfig::new()).await?;
        assert!(!a.trained);
        assert_ne!(a.id, b.id);

        assert_eq!(registry.get(a.id).await?, a);
        let ids: Vec<ModelId> = registry.list().await?.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);

        assert!(registry.unload(a.id).await?);
        assert!(!registry.unload(a.id).await?);
        assert_matches!(
            registry.get(a.id).await,
            Err(StudioError::ModelNotFound(id)) if id == a.id
        );
        Ok(())
    }

    #[tokio::test]
    async fn mark_trained_requires_model() -> Result<(), Box<dyn std::error::Error>> {
        let (registry, _handle) = start_model_registry().await?;
        let model = registry.create(ModelKind::TextToAudio, ModelConfig::new()).await?;
        let metrics = TrainingMetrics {
            loss: 0.2,
            accuracy: 0.9,
            epochs: 3,
        };

        let trained = registry.mark_trained(model.id, metrics).await?;
        assert!(trained.trained);
        assert_eq!(trained.metrics, Some(metrics));

        let missing = registry.mark_trained(ModelId::new(), metrics).await;
        assert_matches!(missing, Err(StudioError::ModelNotFound(_)));
        Ok(())
    }

    #[tokio::test]
    async fn save_and_reload() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let (registry, _handle) = start_model_registry().await?;
        let model = registry.create(ModelKind::TextToImage, ModelConfig::new()).await?;

        let path = registry.save(model.id, dir.path()).await?;
        assert!(path.exists());
        assert_eq!(registry.get(model.id).await?.storage_path, Some(path.clone()));

        let (fresh, _handle) = start_model_registry().await?;
        assert_eq!(fresh.load_dir(dir.path()).await?, 1);
        let restored = fresh.get(model.id).await?;
        assert_eq!(restored.kind, ModelKind::TextToImage);
        assert_eq!(restored.storage_path, Some(path));

        // Already registered ids are skipped.
        assert_eq!(fresh.load_dir(dir.path()).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn failed_save_leaves_model_untouched() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x")?;

        let (registry, _handle) = start_model_registry().await?;
        let model = registry.create(ModelKind::TextToVideo, ModelConfig::new()).await?;

        let result = registry.save(model.id, blocker.join("models")).await;
        assert_matches!(result, Err(StudioError::Io(_)));
        assert_eq!(registry.get(model.id).await?, model);
        Ok(())
    }

    #[tokio::test]
    async fn save_unknown_model() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let (registry, _handle) = start_model_registry().await?;
        let result = registry.save(ModelId::new(), dir.path()).await;
        assert_matches!(result, Err(StudioError::ModelNotFound(_)));
        Ok(())
    }

    #[tokio::test]
    async fn save_after_unload_writes_nothing() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let (registry, _handle) = start_model_registry().await?;
        let model = registry.create(ModelKind::TextToVideo, ModelConfig::new()).await?;

        // Queued back to back: the unload is applied before the save runs.
        let (unloaded, saved) = tokio::join!(
            registry.unload(model.id),
            registry.save(model.id, dir.path())
        );
        assert!(unloaded?);
        assert_matches!(saved, Err(StudioError::ModelNotFound(id)) if id == model.id);
        assert!(!ModelStore::new(dir.path()).path_for(model.id).exists());
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }
}
