//! File-based model persistence.

use std::path::{Path, PathBuf};

use studio_core::{Model, ModelId, StudioError};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// A model file and the outcome of reading it.
pub type LoadedModel = (PathBuf, Result<Model, PersistenceError>);

/// Stores model metadata as one `<model id>.json` file per model.
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file a model is saved to.
    pub fn path_for(&self, id: ModelId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Write a model, creating the directory if needed.
    ///
    /// The file is written next to its final name and renamed into place, so
    /// readers never observe a partial document.
    pub async fn save(&self, model: &Model) -> Result<PathBuf, PersistenceError> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(model.id);
        let temp_path = self.dir.join(format!("{}.json.tmp", model.id));
        let json = serde_json::to_vec_pretty(model)?;

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, &path).await?;

        tracing::debug!(model_id = %model.id, path = ?path, "Saved model");
        Ok(path)
    }

    /// Read a single model file.
    pub async fn load(&self, path: &Path) -> Result<Model, PersistenceError> {
        let bytes = fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Read every model file in the directory.
    ///
    /// A missing directory yields no models. Each entry carries its own
    /// result so one corrupt file does not hide the rest.
    pub async fn load_all(&self) -> Result<Vec<LoadedModel>, PersistenceError> {
        let mut models = Vec::new();
        if !fs::try_exists(&self.dir).await? {
            return Ok(models);
        }

        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                let loaded = self.load(&path).await;
                models.push((path, loaded));
            }
        }

        models.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(models)
    }

    /// Remove a saved model; a missing file is not an error.
    pub async fn delete(&self, id: ModelId) -> Result<(), PersistenceError> {
        let path = self.path_for(id);
        if fs::try_exists(&path).await? {
            fs::remove_file(&path).await?;
            tracing::debug!(model_id = %id, "Deleted model file");
        }
        Ok(())
    }
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<PersistenceError> for StudioError {
    fn from(err: PersistenceError) -> Self {
        StudioError::Io(err.to_string())
    }
}
