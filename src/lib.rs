//! openroom preview core
//!
//! Client-side orchestration for a live photo preview whose pixel work runs
//! in an external rendering service:
//! - [`geometry`]: viewport, zoom and pixel ratio to a render size and an
//!   on-screen placement.
//! - [`preview`]: debounced, progressive, generation-guarded render requests
//!   that end up as revocable [`DisplayHandle`]s.
//! - [`sync`]: loads and saves the recipe of the selected asset.
//!
//! The recipe model itself lives in the `openroom_recipe` crate and is
//! re-exported as [`recipe`].

pub mod config;
pub mod debounce;
pub mod dispatch;
pub mod geometry;
pub mod handles;
pub mod preview;
pub mod service;
pub mod sync;
pub mod synthetic;

pub use openroom_recipe as recipe;

pub use config::{ConfigError, LogLevel, PreviewConfig, TimingConfig};
pub use dispatch::{Completion, Dispatch, HostQueue, ThreadDispatcher, Ticket};
pub use geometry::{ResolutionPolicy, ResolvedView, Size, ViewState, ZoomMode};
pub use handles::{DisplayHandle, HandleError, HandleRegistry};
pub use preview::{Fidelity, Phase, PreviewController, PreviewKey, PreviewState, RenderOptions};
pub use service::{AssetId, RenderService, ServiceCall, ServiceError, ServiceReply};
pub use sync::{LoadError, RecipeSync};
