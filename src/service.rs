//! Boundary to the external rendering service.
//!
//! The service does all pixel work (RAW decode, tone and colour math, GPU
//! compositing) plus folder indexing, metadata and recipe storage. This module
//! only describes its operations: the [`RenderService`] trait for in-process
//! implementations, and [`ServiceCall`]/[`ServiceReply`] values that travel
//! through a [`Dispatch`](crate::dispatch::Dispatch).

use std::fmt;

use openroom_recipe::EditRecipe;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of an asset known to the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One file inside an opened folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSummary {
    pub id: AssetId,
    pub file_name: String,
    /// Upper-case extension without the dot, e.g. `NEF`
    pub extension: String,
    pub path: String,
}

/// Result of opening a folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderIndex {
    pub id: String,
    pub path: String,
    pub assets: Vec<AssetSummary>,
}

/// Display-ready capture metadata. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Metadata {
    pub camera: Option<String>,
    pub lens: Option<String>,
    pub iso: Option<String>,
    pub shutter: Option<String>,
    pub aperture: Option<String>,
    pub focal: Option<String>,
    pub date: Option<String>,
}

/// A GPU the service can render on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuAdapter {
    pub name: String,
    pub backend: String,
    pub device_type: String,
}

/// Errors crossing the service boundary.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The service rejected or failed the request
    #[error("{0}")]
    Request(String),

    /// The dispatcher has no live workers to run the call
    #[error("Rendering service disconnected")]
    Disconnected,

    /// A reply did not carry the payload the call expects
    #[error("Unexpected reply to {call}")]
    UnexpectedReply {
        /// Name of the call that received the wrong payload
        call: &'static str,
    },

    /// Worker threads could not be started
    #[error("Failed to spawn service worker: {0}")]
    Spawn(#[from] std::io::Error),
}

impl ServiceError {
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request(message.into())
    }
}

/// In-process implementation of the rendering service.
///
/// Methods block; a [`ThreadDispatcher`](crate::dispatch::ThreadDispatcher)
/// runs them off the caller's thread.
pub trait RenderService: Send + Sync {
    fn get_thumbnail(&self, asset_id: &AssetId) -> Result<Vec<u8>, ServiceError>;

    /// Render `asset_id` with `recipe`, long edge at most `max_dimension`.
    /// Returns an encoded raster image.
    fn render_preview(
        &self,
        asset_id: &AssetId,
        recipe: Option<&EditRecipe>,
        max_dimension: Option<u32>,
    ) -> Result<Vec<u8>, ServiceError>;

    fn read_metadata(&self, asset_id: &AssetId) -> Result<Metadata, ServiceError>;

    fn detect_gpus(&self) -> Result<Vec<GpuAdapter>, ServiceError>;

    fn open_folder(&self, path: &str) -> Result<FolderIndex, ServiceError>;

    /// `Ok(None)` when the asset has no stored recipe.
    fn load_recipe(&self, asset_id: &AssetId) -> Result<Option<EditRecipe>, ServiceError>;

    fn save_recipe(&self, asset_id: &AssetId, recipe: &EditRecipe) -> Result<(), ServiceError>;
}

/// A request to the service, by name plus parameters.
///
/// Serializes to the invoke payload used by IPC hosts, e.g.
/// `{"cmd":"render_preview","assetId":"a1","recipe":{..},"maxDimension":800}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServiceCall {
    GetThumbnail {
        asset_id: AssetId,
    },
    RenderPreview {
        asset_id: AssetId,
        recipe: Option<EditRecipe>,
        max_dimension: Option<u32>,
    },
    ReadMetadata {
        asset_id: AssetId,
    },
    DetectGpus,
    OpenFolder {
        path: String,
    },
    LoadRecipe {
        asset_id: AssetId,
    },
    SaveRecipe {
        asset_id: AssetId,
        recipe: EditRecipe,
    },
}

impl ServiceCall {
    /// Command name as the service knows it.
    pub fn name(&self) -> &'static str {
        match self {
            ServiceCall::GetThumbnail { .. } => "get_thumbnail",
            ServiceCall::RenderPreview { .. } => "render_preview",
            ServiceCall::ReadMetadata { .. } => "read_metadata",
            ServiceCall::DetectGpus => "detect_gpus",
            ServiceCall::OpenFolder { .. } => "open_folder",
            ServiceCall::LoadRecipe { .. } => "load_recipe",
            ServiceCall::SaveRecipe { .. } => "save_recipe",
        }
    }

    /// Run this call against an in-process service.
    pub fn invoke<S: RenderService + ?Sized>(
        &self,
        service: &S,
    ) -> Result<ServiceReply, ServiceError> {
        match self {
            ServiceCall::GetThumbnail { asset_id } => {
                service.get_thumbnail(asset_id).map(ServiceReply::Image)
            }
            ServiceCall::RenderPreview {
                asset_id,
                recipe,
                max_dimension,
            } => service
                .render_preview(asset_id, recipe.as_ref(), *max_dimension)
                .map(ServiceReply::Image),
            ServiceCall::ReadMetadata { asset_id } => {
                service.read_metadata(asset_id).map(ServiceReply::Metadata)
            }
            ServiceCall::DetectGpus => service.detect_gpus().map(ServiceReply::Gpus),
            ServiceCall::OpenFolder { path } => service.open_folder(path).map(ServiceReply::Folder),
            ServiceCall::LoadRecipe { asset_id } => {
                service.load_recipe(asset_id).map(ServiceReply::Recipe)
            }
            ServiceCall::SaveRecipe { asset_id, recipe } => service
                .save_recipe(asset_id, recipe)
                .map(|()| ServiceReply::Saved),
        }
    }
}

/// Successful payload of a [`ServiceCall`].
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceReply {
    /// Encoded raster image (thumbnail or preview)
    Image(Vec<u8>),
    Metadata(Metadata),
    Gpus(Vec<GpuAdapter>),
    Folder(FolderIndex),
    Recipe(Option<EditRecipe>),
    Saved,
}

impl ServiceReply {
    pub fn into_image(self, call: &'static str) -> Result<Vec<u8>, ServiceError> {
        match self {
            ServiceReply::Image(bytes) => Ok(bytes),
            _ => Err(ServiceError::UnexpectedReply { call }),
        }
    }

    pub fn into_recipe(self, call: &'static str) -> Result<Option<EditRecipe>, ServiceError> {
        match self {
            ServiceReply::Recipe(recipe) => Ok(recipe),
            _ => Err(ServiceError::UnexpectedReply { call }),
        }
    }
}
