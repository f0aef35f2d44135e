//! Preview geometry.
//!
//! Pure functions turning viewport size, natural image size, zoom, device
//! pixel ratio and interaction state into the long-edge pixel budget of the
//! next render request and the on-screen rectangle of the displayed image.

use serde::{Deserialize, Serialize};

/// Width/height pair in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero (or negative).
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn long_edge(&self) -> f32 {
        self.width.max(self.height)
    }

    pub fn scaled(&self, factor: f32) -> Size {
        Size::new(self.width * factor, self.height * factor)
    }
}

/// Axis-aligned rectangle in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// How the image is zoomed in the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ZoomMode {
    /// Fit the whole image inside the viewport
    #[default]
    Fit,
    /// Explicit zoom percentage
    Percent(f32),
}

impl ZoomMode {
    /// Scale factor applied to the fit size.
    ///
    /// 1 when fitting, otherwise `100 / max(percent, 1)`.
    pub fn scale(self) -> f32 {
        match self {
            ZoomMode::Fit => 1.0,
            ZoomMode::Percent(percent) => 100.0 / percent.max(1.0),
        }
    }
}

/// Scale `natural` to fit inside `viewport`, preserving aspect ratio.
///
/// Returns `None` if either size has a zero dimension.
pub fn compute_fit(natural: Size, viewport: Size) -> Option<Size> {
    if natural.is_empty() || viewport.is_empty() {
        return None;
    }
    let scale = (viewport.width / natural.width).min(viewport.height / natural.height);
    Some(natural.scaled(scale))
}

/// Rectangle the image occupies on screen, centred in the viewport.
pub fn placement(fit: Size, viewport: Size, zoom_scale: f32) -> Rect {
    let display = fit.scaled(zoom_scale);
    Rect {
        x: (viewport.width - display.width) / 2.0,
        y: (viewport.height - display.height) / 2.0,
        width: display.width,
        height: display.height,
    }
}

/// Policy constants for choosing render resolutions.
///
/// These are tuning knobs rather than invariants; they are loaded from the
/// preview configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionPolicy {
    /// Smallest long edge ever requested
    pub floor: u32,
    /// Hard cap while the user is interacting
    pub interaction_cap: u32,
    /// Fraction of the at-rest target used while interacting
    pub interaction_ratio: f32,
    /// Upper clamp as a multiple of the fit size's long edge
    pub max_over_resolution: f32,
    /// Target used at rest before layout has measured the image
    pub unmeasured_rest: u32,
    /// Target used while interacting before layout has measured the image
    pub unmeasured_interacting: u32,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self {
            floor: 480,
            interaction_cap: 960,
            interaction_ratio: 0.7,
            max_over_resolution: 5.0,
            unmeasured_rest: 1280,
            unmeasured_interacting: 720,
        }
    }
}

impl ResolutionPolicy {
    /// Long-edge pixel budget for the next render request.
    pub fn target_resolution(
        &self,
        fit: Option<Size>,
        zoom_scale: f32,
        device_pixel_ratio: f32,
        interacting: bool,
    ) -> u32 {
        let Some(fit) = fit.filter(|size| !size.is_empty()) else {
            return if interacting {
                self.unmeasured_interacting
            } else {
                self.unmeasured_rest
            };
        };

        let floor = self.floor as f32;
        let dpr = if device_pixel_ratio > 0.0 {
            device_pixel_ratio
        } else {
            1.0
        };
        let base = fit.long_edge();
        let physical = base * zoom_scale * dpr;
        let ceiling = (base * self.max_over_resolution).max(floor);
        let at_rest = physical.clamp(floor, ceiling);

        let target = if interacting {
            (at_rest * self.interaction_ratio)
                .min(self.interaction_cap as f32)
                .max(floor)
        } else {
            at_rest
        };
        target.round() as u32
    }
}

/// Inputs describing what the preview currently looks like on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub viewport: Size,
    /// Natural size of the displayed image, once known
    pub natural: Option<Size>,
    pub zoom: ZoomMode,
    pub device_pixel_ratio: f32,
    /// True while a slider or mask handle is being dragged
    pub interacting: bool,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            viewport: Size::default(),
            natural: None,
            zoom: ZoomMode::Fit,
            device_pixel_ratio: 1.0,
            interacting: false,
        }
    }
}

/// Everything derived from a [`ViewState`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedView {
    pub fit: Option<Size>,
    pub zoom_scale: f32,
    pub target_resolution: u32,
    pub placement: Option<Rect>,
}

impl ViewState {
    /// Run the full geometry pass under `policy`.
    pub fn resolve(&self, policy: &ResolutionPolicy) -> ResolvedView {
        let fit = self
            .natural
            .and_then(|natural| compute_fit(natural, self.viewport));
        let zoom_scale = self.zoom.scale();
        ResolvedView {
            fit,
            zoom_scale,
            target_resolution: policy.target_resolution(
                fit,
                zoom_scale,
                self.device_pixel_ratio,
                self.interacting,
            ),
            placement: fit.map(|fit| placement(fit, self.viewport, zoom_scale)),
        }
    }
}
