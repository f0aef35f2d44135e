//! Synthetic in-process render service.
//!
//! Stands in for the real service in the demo binary and integration tests.
//! Renders are flat gradients whose tint follows a few global sliders,
//! encoded as PNG at the requested size after a latency proportional to the
//! output size. Recipes are kept in memory.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use image::{ImageFormat, Rgb, RgbImage};
use openroom_recipe::EditRecipe;

use crate::geometry::{Size, compute_fit};
use crate::service::{
    AssetId, AssetSummary, FolderIndex, GpuAdapter, Metadata, RenderService, ServiceError,
};

/// Long edge used for thumbnails.
const THUMBNAIL_EDGE: u32 = 256;

/// One asset the synthetic service knows about.
#[derive(Debug, Clone)]
pub struct SyntheticAsset {
    pub id: AssetId,
    pub file_name: String,
    /// Natural pixel size of the "RAW" file
    pub natural: Size,
}

pub struct SyntheticService {
    assets: Vec<SyntheticAsset>,
    recipes: Mutex<HashMap<AssetId, EditRecipe>>,
    /// Simulated cost of rendering 480px on the long edge
    latency: Duration,
}

impl SyntheticService {
    pub fn new(assets: Vec<SyntheticAsset>, latency: Duration) -> Self {
        Self {
            assets,
            recipes: Mutex::new(HashMap::new()),
            latency,
        }
    }

    /// A single asset of the given natural size, id `synthetic-1`.
    pub fn single(natural: Size, latency: Duration) -> Self {
        Self::new(
            vec![SyntheticAsset {
                id: AssetId::from("synthetic-1"),
                file_name: "SYN_0001.DNG".to_string(),
                natural,
            }],
            latency,
        )
    }

    pub fn assets(&self) -> &[SyntheticAsset] {
        &self.assets
    }

    /// Store `recipe` as if it had been saved earlier.
    pub fn seed_recipe(&self, asset_id: AssetId, recipe: EditRecipe) {
        self.lock_recipes().insert(asset_id, recipe);
    }

    pub fn stored_recipe(&self, asset_id: &AssetId) -> Option<EditRecipe> {
        self.lock_recipes().get(asset_id).cloned()
    }

    fn lock_recipes(&self) -> std::sync::MutexGuard<'_, HashMap<AssetId, EditRecipe>> {
        match self.recipes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn asset(&self, asset_id: &AssetId) -> Result<&SyntheticAsset, ServiceError> {
        self.assets
            .iter()
            .find(|asset| &asset.id == asset_id)
            .ok_or_else(|| ServiceError::request(format!("Asset not found: {asset_id}")))
    }

    fn render(
        &self,
        asset: &SyntheticAsset,
        recipe: Option<&EditRecipe>,
        max_dimension: u32,
    ) -> Result<Vec<u8>, ServiceError> {
        let bounds = Size::new(max_dimension as f32, max_dimension as f32);
        let size = compute_fit(asset.natural, bounds)
            .filter(|size| size.long_edge() <= asset.natural.long_edge())
            .unwrap_or(asset.natural);
        let width = (size.width.round() as u32).max(1);
        let height = (size.height.round() as u32).max(1);

        let scale = width.max(height) as f32 / 480.0;
        thread::sleep(self.latency.mul_f32(scale.max(0.1)));

        let globals = recipe.map(|recipe| recipe.globals).unwrap_or_default();
        let lift = globals.exposure_ev * 40.0;
        let warm = globals.temp * 0.8;
        let image = RgbImage::from_fn(width, height, |x, y| {
            let base = 60.0 + 120.0 * (x as f32 / width as f32) + 40.0 * (y as f32 / height as f32);
            let channel = |offset: f32| (base + lift + offset).clamp(0.0, 255.0) as u8;
            Rgb([channel(warm), channel(0.0), channel(-warm)])
        });

        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, ImageFormat::Png)
            .map_err(|e| ServiceError::request(format!("Failed to encode preview: {e}")))?;
        Ok(out.into_inner())
    }
}

impl RenderService for SyntheticService {
    fn get_thumbnail(&self, asset_id: &AssetId) -> Result<Vec<u8>, ServiceError> {
        let asset = self.asset(asset_id)?;
        let recipe = self.stored_recipe(asset_id);
        self.render(asset, recipe.as_ref(), THUMBNAIL_EDGE)
    }

    fn render_preview(
        &self,
        asset_id: &AssetId,
        recipe: Option<&EditRecipe>,
        max_dimension: Option<u32>,
    ) -> Result<Vec<u8>, ServiceError> {
        let asset = self.asset(asset_id)?;
        let max_dimension = match max_dimension {
            Some(0) => return Err(ServiceError::request("maxDimension must be positive")),
            Some(dim) => dim,
            None => asset.natural.long_edge() as u32,
        };
        log::trace!("Synthetic render of {} at {}px", asset_id, max_dimension);
        self.render(asset, recipe, max_dimension)
    }

    fn read_metadata(&self, asset_id: &AssetId) -> Result<Metadata, ServiceError> {
        self.asset(asset_id)?;
        Ok(Metadata {
            camera: Some("Synthetic Camera".to_string()),
            iso: Some("ISO 100".to_string()),
            ..Metadata::default()
        })
    }

    fn detect_gpus(&self) -> Result<Vec<GpuAdapter>, ServiceError> {
        Ok(Vec::new())
    }

    fn open_folder(&self, path: &str) -> Result<FolderIndex, ServiceError> {
        let assets = self
            .assets
            .iter()
            .map(|asset| AssetSummary {
                id: asset.id.clone(),
                file_name: asset.file_name.clone(),
                extension: asset
                    .file_name
                    .rsplit_once('.')
                    .map(|(_, ext)| ext.to_uppercase())
                    .unwrap_or_default(),
                path: format!("{}/{}", path.trim_end_matches('/'), asset.file_name),
            })
            .collect();
        Ok(FolderIndex {
            id: "synthetic".to_string(),
            path: path.to_string(),
            assets,
        })
    }

    fn load_recipe(&self, asset_id: &AssetId) -> Result<Option<EditRecipe>, ServiceError> {
        self.asset(asset_id)?;
        Ok(self.stored_recipe(asset_id))
    }

    fn save_recipe(&self, asset_id: &AssetId, recipe: &EditRecipe) -> Result<(), ServiceError> {
        self.asset(asset_id)?;
        self.lock_recipes().insert(asset_id.clone(), recipe.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use image::ImageReader;

    use super::*;

    fn service() -> SyntheticService {
        SyntheticService::single(Size::new(6000.0, 4000.0), Duration::ZERO)
    }

    fn dimensions(bytes: &[u8]) -> (u32, u32) {
        ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .unwrap()
            .into_dimensions()
            .unwrap()
    }

    #[test]
    fn test_render_respects_max_dimension() {
        let service = service();
        let id = AssetId::from("synthetic-1");
        let bytes = service.render_preview(&id, None, Some(480)).unwrap();
        assert_eq!(dimensions(&bytes), (480, 320));
    }

    #[test]
    fn test_render_never_upscales() {
        let service = SyntheticService::single(Size::new(300.0, 200.0), Duration::ZERO);
        let id = AssetId::from("synthetic-1");
        let bytes = service.render_preview(&id, None, Some(1600)).unwrap();
        assert_eq!(dimensions(&bytes), (300, 200));
    }

    #[test]
    fn test_unknown_asset() {
        let service = service();
        let result = service.render_preview(&AssetId::from("nope"), None, Some(100));
        assert!(matches!(result, Err(ServiceError::Request(_))));
    }

    #[test]
    fn test_recipe_storage() {
        let service = service();
        let id = AssetId::from("synthetic-1");
        assert_eq!(service.load_recipe(&id).unwrap(), None);

        let mut recipe = EditRecipe::default();
        recipe.globals.vibrance = 12.0;
        service.save_recipe(&id, &recipe).unwrap();
        assert_eq!(service.load_recipe(&id).unwrap(), Some(recipe));
    }

    #[test]
    fn test_open_folder_lists_assets() {
        let folder = service().open_folder("/photos/").unwrap();
        assert_eq!(folder.assets.len(), 1);
        assert_eq!(folder.assets[0].extension, "DNG");
        assert_eq!(folder.assets[0].path, "/photos/SYN_0001.DNG");
    }
}
