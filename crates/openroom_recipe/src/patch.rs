//! Partial updates for recipe structures.
//!
//! A patch only carries the fields that change. Applying a patch leaves every
//! unset field at its previous value, which is how nested layer updates keep
//! the rest of a mask or adjustment block intact.

use crate::model::{
    AdjustmentLayer, GlobalAdjustments, LocalAdjustments, Mask, MaskType, NormalizedPoint,
    clamp_point,
};

/// Shallow partial update for [`GlobalAdjustments`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GlobalsPatch {
    pub exposure_ev: Option<f32>,
    pub contrast: Option<f32>,
    pub highlights: Option<f32>,
    pub shadows: Option<f32>,
    pub whites: Option<f32>,
    pub blacks: Option<f32>,
    pub temp: Option<f32>,
    pub tint: Option<f32>,
    pub vibrance: Option<f32>,
    pub saturation: Option<f32>,
}

impl GlobalsPatch {
    /// Merge into `globals`. No range clamping happens here.
    pub fn apply(&self, globals: &mut GlobalAdjustments) {
        merge(&mut globals.exposure_ev, self.exposure_ev);
        merge(&mut globals.contrast, self.contrast);
        merge(&mut globals.highlights, self.highlights);
        merge(&mut globals.shadows, self.shadows);
        merge(&mut globals.whites, self.whites);
        merge(&mut globals.blacks, self.blacks);
        merge(&mut globals.temp, self.temp);
        merge(&mut globals.tint, self.tint);
        merge(&mut globals.vibrance, self.vibrance);
        merge(&mut globals.saturation, self.saturation);
    }

    /// Check whether the patch sets no field at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Field-by-field update for a layer [`Mask`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MaskPatch {
    pub mask_type: Option<MaskType>,
    pub start: Option<NormalizedPoint>,
    pub end: Option<NormalizedPoint>,
    pub feather: Option<f32>,
    pub invert: Option<bool>,
}

impl MaskPatch {
    pub fn with_start(mut self, start: NormalizedPoint) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_end(mut self, end: NormalizedPoint) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_feather(mut self, feather: f32) -> Self {
        self.feather = Some(feather);
        self
    }

    pub fn with_invert(mut self, invert: bool) -> Self {
        self.invert = Some(invert);
        self
    }

    /// Merge into `mask`. Points and feather are clamped to [0, 1].
    pub fn apply(&self, mask: &mut Mask) {
        if let Some(mask_type) = self.mask_type {
            mask.mask_type = mask_type;
        }
        if let Some(start) = self.start {
            mask.start = clamp_point(start);
        }
        if let Some(end) = self.end {
            mask.end = clamp_point(end);
        }
        if let Some(feather) = self.feather {
            mask.feather = feather.clamp(0.0, 1.0);
        }
        if let Some(invert) = self.invert {
            mask.invert = invert;
        }
    }
}

/// Field-by-field update for [`LocalAdjustments`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AdjustmentsPatch {
    pub exposure_ev: Option<f32>,
    pub temp: Option<f32>,
    pub tint: Option<f32>,
    pub saturation: Option<f32>,
}

impl AdjustmentsPatch {
    pub fn apply(&self, adjustments: &mut LocalAdjustments) {
        merge(&mut adjustments.exposure_ev, self.exposure_ev);
        merge(&mut adjustments.temp, self.temp);
        merge(&mut adjustments.tint, self.tint);
        merge(&mut adjustments.saturation, self.saturation);
    }
}

/// Update for one [`AdjustmentLayer`].
///
/// `name`, `enabled` and `opacity` replace the old value; `mask` and
/// `adjustments` are merged field by field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayerPatch {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub opacity: Option<f32>,
    pub mask: Option<MaskPatch>,
    pub adjustments: Option<AdjustmentsPatch>,
}

impl LayerPatch {
    pub fn mask(mask: MaskPatch) -> Self {
        Self {
            mask: Some(mask),
            ..Self::default()
        }
    }

    pub fn adjustments(adjustments: AdjustmentsPatch) -> Self {
        Self {
            adjustments: Some(adjustments),
            ..Self::default()
        }
    }

    pub fn apply(&self, layer: &mut AdjustmentLayer) {
        if let Some(name) = &self.name {
            layer.name.clone_from(name);
        }
        if let Some(enabled) = self.enabled {
            layer.enabled = enabled;
        }
        if let Some(opacity) = self.opacity {
            layer.opacity = opacity.clamp(0.0, 1.0);
        }
        if let Some(mask) = &self.mask {
            mask.apply(&mut layer.mask);
        }
        if let Some(adjustments) = &self.adjustments {
            adjustments.apply(&mut layer.adjustments);
        }
    }
}

fn merge(target: &mut f32, value: Option<f32>) {
    if let Some(value) = value {
        *target = value;
    }
}
