//! Model management: list, inspect, create, save, delete.

use std::path::PathBuf;

use actors::ModelStore;
use serde::{Deserialize, Serialize};
use studio_core::{Model, ModelConfig, ModelId, ModelKind};

use crate::{ApiError, Studio};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub models: Vec<Model>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    pub model: Model,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateModelRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: ModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateModelResponse {
    pub success: bool,
    pub model: Model,
}

/// Outcome of an operation that only reports success and a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

impl ActionResponse {
    pub fn new(success: bool, message: impl Into<String>) -> Self {
        Self {
            success,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveModelResponse {
    pub success: bool,
    pub message: String,
    pub path: PathBuf,
}

pub(crate) fn parse_model_id(value: &str) -> Result<ModelId, ApiError> {
    ModelId::parse(value).map_err(|_| ApiError::invalid_id("model", value))
}

impl Studio {
    /// `GET /models`
    pub async fn list_models(&self) -> Result<ModelList, ApiError> {
        let models = self.models().list().await?;
        Ok(ModelList { models })
    }

    /// `GET /models/:id`
    pub async fn get_model(&self, id: &str) -> Result<ModelResponse, ApiError> {
        let model = self.models().get(parse_model_id(id)?).await?;
        Ok(ModelResponse { model })
    }

    /// `POST /models`
    pub async fn create_model(
        &self,
        request: CreateModelRequest,
    ) -> Result<CreateModelResponse, ApiError> {
        let kind = ModelKind::parse(&request.kind)
            .ok_or_else(|| ApiError::UnsupportedModelType(request.kind.clone()))?;
        let model = self.models().create(kind, request.config).await?;
        Ok(CreateModelResponse {
            success: true,
            model,
        })
    }

    /// `POST /models/:id/save`, into the configured model directory.
    pub async fn save_model(&self, id: &str) -> Result<SaveModelResponse, ApiError> {
        let model_id = parse_model_id(id)?;
        let path = self
            .models()
            .save(model_id, &self.config().model_dir)
            .await?;
        Ok(SaveModelResponse {
            success: true,
            message: "Model saved successfully".into(),
            path,
        })
    }

    /// `DELETE /models/:id`
    ///
    /// Unloads the model and removes its saved file so it is not restored on
    /// the next start. An unknown id is reported in the body, not as an error.
    pub async fn delete_model(&self, id: &str) -> Result<ActionResponse, ApiError> {
        let model_id = parse_model_id(id)?;
        if !self.models().unload(model_id).await? {
            return Ok(ActionResponse::new(false, "Model not found"));
        }

        ModelStore::new(&self.config().model_dir)
            .delete(model_id)
            .await
            .map_err(studio_core::StudioError::from)?;
        tracing::info!(model_id = %model_id, "Deleted model");
        Ok(ActionResponse::new(true, "Model unloaded"))
    }

    /// Resolve a model reference: a model id, or a model type naming the
    /// oldest registered model of that type.
    pub(crate) async fn resolve_model(&self, model_ref: &str) -> Result<ModelId, ApiError> {
        if let Ok(id) = ModelId::parse(model_ref) {
            return Ok(id);
        }

        let kind = ModelKind::parse(model_ref)
            .ok_or_else(|| ApiError::invalid_id("model", model_ref))?;
        self.models()
            .list()
            .await?
            .into_iter()
            .find(|m| m.kind == kind)
            .map(|m| m.id)
            .ok_or(ApiError::NoModels)
    }
}
