//! `openroom-preview`: drives the preview core through a scripted edit
//! session against the synthetic render service and logs what a view layer
//! would see.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use openroom::geometry::{Size, ViewState, ZoomMode};
use openroom::recipe::{GlobalsPatch, LayerPatch, MaskPatch, RecipeStore, builtin_presets};
use openroom::synthetic::SyntheticService;
use openroom::{
    AssetId, ConfigError, HandleRegistry, Phase, PreviewConfig, PreviewController, PreviewKey,
    RecipeSync, ServiceError, ThreadDispatcher,
};
use thiserror::Error;
use web_time::Instant;

/// Pause between simulated frames.
const FRAME: Duration = Duration::from_millis(16);

/// Give up waiting for renders after this long.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(
    name = "openroom-preview",
    version,
    about = "Run a scripted preview session against a synthetic render service"
)]
struct Cli {
    /// Viewport size in logical pixels, WxH.
    #[arg(long, default_value = "1200x800", value_parser = parse_size)]
    viewport: Size,

    /// Natural size of the synthetic image, WxH.
    #[arg(long, default_value = "6000x4000", value_parser = parse_size)]
    natural: Size,

    /// Device pixel ratio.
    #[arg(long, default_value_t = 1.0)]
    dpr: f32,

    /// Zoom in percent. Fit to window when omitted.
    #[arg(long)]
    zoom: Option<f32>,

    /// Number of slider steps while scrubbing.
    #[arg(long, default_value_t = 12)]
    steps: u32,

    /// Simulated latency of a 480px render, in milliseconds.
    #[arg(long, default_value_t = 40)]
    latency_ms: u64,

    /// Configuration file. Defaults to the platform config location.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn parse_size(value: &str) -> Result<Size, String> {
    let (width, height) = value
        .split_once(|c: char| c == 'x' || c == 'X')
        .ok_or_else(|| format!("expected WxH, got '{value}'"))?;
    let parse = |part: &str| {
        part.trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid dimension '{part}': {e}"))
    };
    Ok(Size::new(parse(width)? as f32, parse(height)? as f32))
}

#[derive(Error, Debug)]
enum DemoError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Synthetic service has no assets")]
    NoAssets,
}

/// One preview pane plus the recipe it edits.
struct Session {
    config: PreviewConfig,
    view: ViewState,
    asset: AssetId,
    store: RecipeStore,
    sync: RecipeSync<ThreadDispatcher>,
    controller: PreviewController<ThreadDispatcher>,
    registry: HandleRegistry,
}

impl Session {
    /// One UI frame: apply replies, rebuild the key, report changes.
    fn frame(&mut self) {
        let now = Instant::now();
        self.sync.tick(&mut self.store, now);

        if self.sync.is_loaded() {
            let resolved = self.view.resolve(&self.config.resolution);
            let options = self
                .config
                .render_options(resolved.target_resolution, self.view.interacting);
            let key = PreviewKey::new(self.asset.clone(), self.store.snapshot(), options);
            if self.controller.set_key(Some(key), now) {
                log::debug!(
                    "Key changed: generation {}, target {}px",
                    self.controller.generation(),
                    resolved.target_resolution
                );
            }
        }

        if self.controller.tick(now) {
            self.report();
        }
    }

    fn report(&self) {
        let state = self.controller.state();
        let display = match &state.display {
            Some(handle) => format!("{} ({}x{})", handle.uri(), handle.width(), handle.height()),
            None => "nothing".to_string(),
        };
        log::info!(
            "{:?}: showing {}{}{}",
            self.controller.phase(),
            display,
            if state.is_loading { ", loading" } else { "" },
            state
                .error
                .as_deref()
                .map(|e| format!(", error: {e}"))
                .unwrap_or_default()
        );
    }

    /// Run frames until the preview is settled and no save is waiting.
    fn settle(&mut self) -> bool {
        let started = Instant::now();
        loop {
            self.frame();
            let done = matches!(self.controller.phase(), Phase::Settled | Phase::Errored)
                && !self.sync.is_save_pending();
            if done {
                return true;
            }
            if started.elapsed() > SETTLE_TIMEOUT {
                log::warn!("Preview did not settle within {:?}", SETTLE_TIMEOUT);
                return false;
            }
            thread::sleep(FRAME);
        }
    }

    /// Run frames for a fixed wall-clock duration.
    fn run_for(&mut self, duration: Duration) {
        let until = Instant::now() + duration;
        while Instant::now() < until {
            self.frame();
            thread::sleep(FRAME);
        }
    }
}

fn load_config(cli: &Cli) -> Result<PreviewConfig, ConfigError> {
    match &cli.config {
        Some(path) => PreviewConfig::load_from_path(path),
        None => Ok(PreviewConfig::load_from_default_path().unwrap_or_default()),
    }
}

fn run(cli: Cli) -> Result<(), DemoError> {
    let config = load_config(&cli)?;
    env_logger::Builder::new()
        .filter_level(config.log_level.to_level_filter())
        .parse_default_env()
        .init();

    let service = Arc::new(SyntheticService::single(
        cli.natural,
        Duration::from_millis(cli.latency_ms),
    ));
    let asset = service
        .assets()
        .first()
        .map(|asset| asset.id.clone())
        .ok_or(DemoError::NoAssets)?;

    let view = ViewState {
        viewport: cli.viewport,
        natural: Some(cli.natural),
        zoom: cli.zoom.map_or(ZoomMode::Fit, ZoomMode::Percent),
        device_pixel_ratio: cli.dpr,
        interacting: false,
    };
    let resolved = view.resolve(&config.resolution);
    log::info!(
        "Fit {:?}, zoom scale {:.3}, placement {:?}, target {}px",
        resolved.fit,
        resolved.zoom_scale,
        resolved.placement,
        resolved.target_resolution
    );

    let registry = HandleRegistry::new();
    let mut store = RecipeStore::new();
    store.subscribe(|event| {
        log::debug!(
            "Recipe event {:?} (revision {}, {} layer(s))",
            event.cause,
            event.revision,
            event.recipe.layers.len()
        );
    });

    let mut session = Session {
        sync: RecipeSync::with_save_delay(
            ThreadDispatcher::spawn(Arc::clone(&service), 1)?,
            config.timing.save_debounce(),
        ),
        controller: PreviewController::new(
            ThreadDispatcher::spawn(Arc::clone(&service), config.worker_threads)?,
            registry.clone(),
        ),
        config,
        view,
        asset: asset.clone(),
        store,
        registry,
    };

    log::info!("Opening {}", asset);
    session.sync.select_asset(Some(asset.clone()), &mut session.store);
    session.settle();

    log::info!("Adding a gradient layer");
    let layer = session.store.add_layer();
    session.store.update_layer(
        &layer,
        &LayerPatch::mask(MaskPatch::default().with_feather(0.5)),
    );
    session.settle();

    log::info!("Scrubbing contrast over {} steps", cli.steps);
    session.store.begin_interaction();
    session.view.interacting = true;
    for step in 1..=cli.steps {
        session.store.update_globals(&GlobalsPatch {
            contrast: Some(step as f32 * 4.0),
            ..Default::default()
        });
        session.frame();
        thread::sleep(FRAME);
        session.frame();
        thread::sleep(FRAME);
    }
    session.store.end_interaction();
    session.view.interacting = false;
    session.settle();

    if let Some(preset) = builtin_presets().into_iter().find(|p| p.name == "Golden Hour") {
        log::info!("Applying preset '{}' at half strength", preset.name);
        session.store.apply_preset(&preset, 0.5);
        session.settle();
    }

    log::info!("Undo");
    session.store.undo();
    session.settle();

    session.sync.flush(&session.store);
    session.run_for(Duration::from_millis(200));
    match service.stored_recipe(&asset) {
        Some(recipe) => log::info!(
            "Stored recipe: contrast {:.1}, temp {:.1}, {} layer(s)",
            recipe.globals.contrast,
            recipe.globals.temp,
            recipe.layers.len()
        ),
        None => log::warn!("No recipe was stored"),
    }

    session.controller.teardown();
    log::info!(
        "Torn down, {} display handle(s) still live",
        session.registry.live_count()
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("openroom-preview: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
