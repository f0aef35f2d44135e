//! Render request controller.
//!
//! Turns a changing `(asset, recipe, render options)` key into a sequence of
//! displayed images:
//!
//! 1. A key change arms a debounce timer; later changes re-arm it, so only the
//!    last key inside the window is rendered.
//! 2. When the timer fires, one or two `render_preview` calls are issued. In
//!    progressive mode a fast floor-resolution pass runs next to the
//!    full-resolution pass; in skip-high mode only the floor pass runs.
//! 3. Every call is tagged with the key generation that issued it. Completions
//!    from an older generation are dropped, whether they succeeded or failed.
//! 4. Each accepted payload becomes a [`DisplayHandle`]; the handle it
//!    replaces is revoked, and teardown revokes whatever is left.
//!
//! The controller never blocks. The owner calls [`PreviewController::tick`]
//! from its frame or event loop with the current time.

use std::collections::HashMap;
use std::time::Duration;

use openroom_recipe::EditRecipe;
use web_time::Instant;

use crate::debounce::Debouncer;
use crate::dispatch::{Completion, Dispatch, Ticket};
use crate::handles::{DisplayHandle, HandleRegistry};
use crate::service::{AssetId, ServiceCall};

/// How the next render should be requested.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    /// Long edge wanted for the final image
    pub target_resolution: u32,
    /// Long edge of the quick first pass
    pub floor_resolution: u32,
    /// Issue a floor pass alongside the full pass
    pub progressive: bool,
    /// Only issue the floor pass (continuous scrubbing)
    pub skip_high: bool,
    /// Wait this long after the last key change before requesting
    pub debounce: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            target_resolution: 1280,
            floor_resolution: 480,
            progressive: true,
            skip_high: false,
            debounce: Duration::ZERO,
        }
    }
}

/// Everything that decides what the preview shows.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewKey {
    pub asset_id: AssetId,
    pub recipe: EditRecipe,
    pub options: RenderOptions,
}

impl PreviewKey {
    pub fn new(asset_id: AssetId, recipe: EditRecipe, options: RenderOptions) -> Self {
        Self {
            asset_id,
            recipe,
            options,
        }
    }
}

/// Quality level of one render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Fidelity {
    Floor,
    Full,
}

/// Lifecycle of the current key generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No key
    Idle,
    /// Waiting for the debounce timer
    Debouncing,
    /// At least one pass of the current generation is in flight
    Requesting,
    /// All passes finished without error
    Settled,
    /// All passes finished and at least one failed
    Errored,
}

/// What the view layer renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreviewState {
    /// Image to show; may belong to an older key until a newer one arrives
    pub display: Option<DisplayHandle>,
    pub is_loading: bool,
    pub error: Option<String>,
}

/// Passes to issue for `options`, lowest fidelity first.
pub fn plan_passes(options: &RenderOptions) -> Vec<(Fidelity, u32)> {
    let target = options.target_resolution;
    let floor = options.floor_resolution;
    if options.skip_high {
        vec![(Fidelity::Floor, target.min(floor))]
    } else if options.progressive && target > floor {
        vec![(Fidelity::Floor, floor), (Fidelity::Full, target)]
    } else {
        vec![(Fidelity::Full, target)]
    }
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    generation: u64,
    fidelity: Fidelity,
    resolution: u32,
}

/// Debounced, progressive, generation-guarded preview requests.
pub struct PreviewController<D: Dispatch> {
    dispatch: D,
    handles: HandleRegistry,
    key: Option<PreviewKey>,
    generation: u64,
    debounce: Debouncer,
    in_flight: HashMap<Ticket, InFlight>,
    /// Fidelity of the displayed image if it belongs to the current generation
    shown: Option<Fidelity>,
    /// Handles created here and not yet revoked
    live: Vec<DisplayHandle>,
    state: PreviewState,
    phase: Phase,
}

impl<D: Dispatch> PreviewController<D> {
    pub fn new(dispatch: D, handles: HandleRegistry) -> Self {
        Self {
            dispatch,
            handles,
            key: None,
            generation: 0,
            debounce: Debouncer::new(Duration::ZERO),
            in_flight: HashMap::new(),
            shown: None,
            live: Vec::new(),
            state: PreviewState::default(),
            phase: Phase::Idle,
        }
    }

    pub fn state(&self) -> &PreviewState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current key generation. Bumped by every key change and by teardown.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn key(&self) -> Option<&PreviewKey> {
        self.key.as_ref()
    }

    /// Number of calls still awaited, current generation or not.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Change what should be displayed.
    ///
    /// Returns false if `key` equals the current key. Any other change starts
    /// a new generation; completions of the previous one are discarded. With
    /// `None` the displayed image is released immediately.
    pub fn set_key(&mut self, key: Option<PreviewKey>, now: Instant) -> bool {
        if self.key == key {
            return false;
        }

        self.generation += 1;
        self.shown = None;
        if !self.in_flight.is_empty() {
            log::debug!(
                "Generation {} supersedes {} in-flight render(s)",
                self.generation,
                self.in_flight.len()
            );
        }

        match key {
            Some(key) => {
                self.debounce.schedule_after(now, key.options.debounce);
                self.key = Some(key);
                self.state.is_loading = false;
                self.phase = Phase::Debouncing;
            }
            None => {
                self.debounce.cancel();
                self.key = None;
                self.release_all();
                self.state = PreviewState::default();
                self.phase = Phase::Idle;
            }
        }
        true
    }

    /// Fire the debounce timer if due and apply finished calls.
    ///
    /// Returns true if [`state`](Self::state) or [`phase`](Self::phase) changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut changed = false;
        if self.debounce.fire(now) {
            changed |= self.issue();
        }
        while let Some(completion) = self.dispatch.poll() {
            changed |= self.complete(completion);
        }
        changed
    }

    /// Release every handle and forget the current key.
    ///
    /// Calls still in flight are ignored when they complete.
    pub fn teardown(&mut self) {
        self.generation += 1;
        self.key = None;
        self.debounce.cancel();
        self.in_flight.clear();
        self.shown = None;
        self.release_all();
        self.state = PreviewState::default();
        self.phase = Phase::Idle;
    }

    fn issue(&mut self) -> bool {
        let Some(key) = self.key.as_ref() else {
            return false;
        };

        for (fidelity, resolution) in plan_passes(&key.options) {
            let ticket = self.dispatch.submit(ServiceCall::RenderPreview {
                asset_id: key.asset_id.clone(),
                recipe: Some(key.recipe.clone()),
                max_dimension: Some(resolution),
            });
            log::debug!(
                "Requesting {:?} pass of {} at {}px (generation {})",
                fidelity,
                key.asset_id,
                resolution,
                self.generation
            );
            self.in_flight.insert(
                ticket,
                InFlight {
                    generation: self.generation,
                    fidelity,
                    resolution,
                },
            );
        }

        self.state.is_loading = true;
        self.state.error = None;
        self.phase = Phase::Requesting;
        true
    }

    fn complete(&mut self, completion: Completion) -> bool {
        let Some(request) = self.in_flight.remove(&completion.ticket) else {
            log::trace!("Ignoring completion for unknown {:?}", completion.ticket);
            return false;
        };
        if request.generation != self.generation {
            log::debug!(
                "Discarding superseded {:?} pass at {}px (generation {}, now {})",
                request.fidelity,
                request.resolution,
                request.generation,
                self.generation
            );
            return false;
        }

        match completion
            .result
            .and_then(|reply| reply.into_image("render_preview"))
        {
            Ok(bytes) => self.accept(request, bytes),
            Err(e) if self.outranked(request.fidelity) => {
                log::debug!(
                    "Ignoring failed {:?} pass, a better one is shown: {}",
                    request.fidelity,
                    e
                );
            }
            Err(e) => {
                log::warn!(
                    "{:?} render at {}px failed: {}",
                    request.fidelity,
                    request.resolution,
                    e
                );
                self.state.error = Some(e.to_string());
            }
        }
        self.settle();
        true
    }

    /// Whether a pass of `fidelity` for this generation can no longer change
    /// what is shown.
    fn outranked(&self, fidelity: Fidelity) -> bool {
        self.shown.is_some_and(|shown| shown > fidelity)
    }

    fn accept(&mut self, request: InFlight, bytes: Vec<u8>) {
        if self.outranked(request.fidelity) {
            log::debug!("Dropping {:?} pass that arrived after a better one", request.fidelity);
            return;
        }
        match self.handles.create(bytes) {
            Ok(handle) => self.show(handle, request.fidelity),
            Err(e) => {
                log::warn!("Unusable render payload: {}", e);
                self.state.error = Some(e.to_string());
            }
        }
    }

    /// Display `handle` and revoke every handle it supersedes.
    fn show(&mut self, handle: DisplayHandle, fidelity: Fidelity) {
        for old in self.live.drain(..) {
            self.handles.revoke(&old);
        }
        self.live.push(handle.clone());
        self.state.display = Some(handle);
        self.shown = Some(fidelity);
        if fidelity == Fidelity::Full {
            self.state.error = None;
        }
    }

    fn settle(&mut self) {
        let pending = self
            .in_flight
            .values()
            .any(|request| request.generation == self.generation);
        self.state.is_loading = pending;
        self.phase = if pending {
            Phase::Requesting
        } else if self.state.error.is_some() {
            Phase::Errored
        } else {
            Phase::Settled
        };
    }

    fn release_all(&mut self) {
        for handle in self.live.drain(..) {
            self.handles.revoke(&handle);
        }
        self.state.display = None;
    }
}

impl<D: Dispatch> Drop for PreviewController<D> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::HostQueue;
    use crate::service::{ServiceError, ServiceReply};

    struct Harness {
        host: HostQueue,
        registry: HandleRegistry,
        controller: PreviewController<HostQueue>,
        start: Instant,
    }

    impl Harness {
        fn new() -> Self {
            let host = HostQueue::new();
            let registry = HandleRegistry::new();
            let controller = PreviewController::new(host.clone(), registry.clone());
            Self {
                host,
                registry,
                controller,
                start: Instant::now(),
            }
        }

        fn at(&self, ms: u64) -> Instant {
            self.start + Duration::from_millis(ms)
        }

        /// Submitted render calls as (ticket, asset, max_dimension).
        fn take_renders(&self) -> Vec<(Ticket, String, u32)> {
            self.host
                .take_submitted()
                .into_iter()
                .map(|(ticket, call)| match call {
                    ServiceCall::RenderPreview {
                        asset_id,
                        max_dimension,
                        ..
                    } => (ticket, asset_id.to_string(), max_dimension.unwrap_or(0)),
                    other => panic!("unexpected call {other:?}"),
                })
                .collect()
        }

        fn succeed(&self, ticket: Ticket, marker: u8) {
            self.host
                .complete(ticket, Ok(ServiceReply::Image(vec![marker; 8])));
        }

        fn fail(&self, ticket: Ticket, message: &str) {
            self.host
                .complete(ticket, Err(ServiceError::request(message)));
        }

        fn displayed_marker(&self) -> Option<u8> {
            let handle = self.controller.state().display.as_ref()?;
            self.registry.bytes(handle).map(|bytes| bytes[0])
        }
    }

    fn options(debounce_ms: u64) -> RenderOptions {
        RenderOptions {
            target_resolution: 1600,
            floor_resolution: 480,
            progressive: true,
            skip_high: false,
            debounce: Duration::from_millis(debounce_ms),
        }
    }

    fn key(asset: &str, contrast: f32, options: RenderOptions) -> Option<PreviewKey> {
        let mut recipe = EditRecipe::default();
        recipe.globals.contrast = contrast;
        Some(PreviewKey::new(AssetId::from(asset), recipe, options))
    }

    #[test]
    fn test_plan_passes() {
        let progressive = options(0);
        assert_eq!(
            plan_passes(&progressive),
            vec![(Fidelity::Floor, 480), (Fidelity::Full, 1600)]
        );

        let small = RenderOptions {
            target_resolution: 400,
            ..progressive
        };
        assert_eq!(plan_passes(&small), vec![(Fidelity::Full, 400)]);

        let single = RenderOptions {
            progressive: false,
            ..progressive
        };
        assert_eq!(plan_passes(&single), vec![(Fidelity::Full, 1600)]);

        let scrub = RenderOptions {
            skip_high: true,
            ..progressive
        };
        assert_eq!(plan_passes(&scrub), vec![(Fidelity::Floor, 480)]);

        let scrub_small = RenderOptions {
            skip_high: true,
            target_resolution: 300,
            ..progressive
        };
        assert_eq!(plan_passes(&scrub_small), vec![(Fidelity::Floor, 300)]);
    }

    #[test]
    fn test_debounce_only_last_key_requested() {
        let mut h = Harness::new();
        h.controller.set_key(key("a", 1.0, options(100)), h.at(0));
        h.controller.set_key(key("a", 2.0, options(100)), h.at(40));
        h.controller.set_key(key("a", 3.0, options(100)), h.at(80));
        assert_eq!(h.controller.phase(), Phase::Debouncing);

        h.controller.tick(h.at(150));
        assert!(h.take_renders().is_empty());

        h.controller.tick(h.at(180));
        let host_calls = h.host.take_submitted();
        assert_eq!(host_calls.len(), 2);
        for (_, call) in host_calls {
            let ServiceCall::RenderPreview { recipe, .. } = call else {
                panic!("expected render call");
            };
            assert_eq!(recipe.unwrap().globals.contrast, 3.0);
        }
        assert!(h.controller.state().is_loading);
        assert_eq!(h.controller.phase(), Phase::Requesting);
    }

    #[test]
    fn test_progressive_floor_then_full() {
        let mut h = Harness::new();
        h.controller.set_key(key("a", 0.0, options(0)), h.at(0));
        h.controller.tick(h.at(0));
        let renders = h.take_renders();
        assert_eq!(renders.len(), 2);
        let (floor, full) = (renders[0].0, renders[1].0);
        assert_eq!(renders[0].2, 480);
        assert_eq!(renders[1].2, 1600);

        h.succeed(floor, 1);
        assert!(h.controller.tick(h.at(10)));
        assert_eq!(h.displayed_marker(), Some(1));
        assert!(h.controller.state().is_loading);

        h.succeed(full, 2);
        h.controller.tick(h.at(20));
        assert_eq!(h.displayed_marker(), Some(2));
        assert!(!h.controller.state().is_loading);
        assert_eq!(h.controller.phase(), Phase::Settled);
        assert_eq!(h.registry.live_count(), 1);
    }

    #[test]
    fn test_floor_after_full_is_dropped() {
        let mut h = Harness::new();
        h.controller.set_key(key("a", 0.0, options(0)), h.at(0));
        h.controller.tick(h.at(0));
        let renders = h.take_renders();

        h.succeed(renders[1].0, 2);
        h.succeed(renders[0].0, 1);
        h.controller.tick(h.at(10));

        assert_eq!(h.displayed_marker(), Some(2));
        assert_eq!(h.registry.live_count(), 1);
        assert_eq!(h.controller.phase(), Phase::Settled);
    }

    #[test]
    fn test_floor_failure_after_full_is_ignored() {
        let mut h = Harness::new();
        h.controller.set_key(key("a", 0.0, options(0)), h.at(0));
        h.controller.tick(h.at(0));
        let renders = h.take_renders();

        h.succeed(renders[1].0, 2);
        h.controller.tick(h.at(5));
        h.fail(renders[0].0, "floor boom");
        h.controller.tick(h.at(10));

        let state = h.controller.state();
        assert_eq!(h.displayed_marker(), Some(2));
        assert_eq!(state.error, None);
        assert!(!state.is_loading);
        assert_eq!(h.controller.phase(), Phase::Settled);
    }

    #[test]
    fn test_skip_high_issues_floor_only() {
        let mut h = Harness::new();
        let scrub = RenderOptions {
            skip_high: true,
            ..options(0)
        };
        h.controller.set_key(key("a", 0.0, scrub), h.at(0));
        h.controller.tick(h.at(0));

        let renders = h.take_renders();
        assert_eq!(renders.len(), 1);
        assert!(renders[0].2 <= 480);

        h.succeed(renders[0].0, 7);
        h.controller.tick(h.at(5));
        assert_eq!(h.displayed_marker(), Some(7));
        assert_eq!(h.controller.phase(), Phase::Settled);
    }

    #[test]
    fn test_superseded_results_are_discarded() {
        let mut h = Harness::new();
        h.controller.set_key(key("a", 0.0, options(0)), h.at(0));
        h.controller.tick(h.at(0));
        let old = h.take_renders();

        h.controller.set_key(key("b", 0.0, options(0)), h.at(5));
        h.controller.tick(h.at(5));
        let new = h.take_renders();
        assert!(new.iter().all(|(_, asset, _)| asset == "b"));

        // Old generation resolves late, one success and one failure
        h.succeed(old[0].0, 1);
        h.fail(old[1].0, "boom");
        assert!(!h.controller.tick(h.at(10)));
        assert_eq!(h.controller.state().display, None);
        assert_eq!(h.controller.state().error, None);
        assert_eq!(h.registry.live_count(), 0);

        h.succeed(new[1].0, 9);
        h.controller.tick(h.at(15));
        assert_eq!(h.displayed_marker(), Some(9));
    }

    #[test]
    fn test_previous_image_stays_until_replaced() {
        let mut h = Harness::new();
        let single = RenderOptions {
            progressive: false,
            ..options(50)
        };
        h.controller.set_key(key("a", 0.0, single), h.at(0));
        h.controller.tick(h.at(50));
        let first = h.take_renders();
        h.succeed(first[0].0, 1);
        h.controller.tick(h.at(60));
        let first_handle = h.controller.state().display.clone().unwrap();

        h.controller.set_key(key("a", 5.0, single), h.at(70));
        h.controller.tick(h.at(80));
        assert_eq!(h.controller.state().display.as_ref(), Some(&first_handle));
        assert!(h.registry.is_live(&first_handle));

        h.controller.tick(h.at(120));
        let second = h.take_renders();
        h.succeed(second[0].0, 2);
        h.controller.tick(h.at(130));
        assert_eq!(h.displayed_marker(), Some(2));
        assert!(!h.registry.is_live(&first_handle));
    }

    #[test]
    fn test_full_failure_keeps_floor_image() {
        let mut h = Harness::new();
        h.controller.set_key(key("a", 0.0, options(0)), h.at(0));
        h.controller.tick(h.at(0));
        let renders = h.take_renders();

        h.succeed(renders[0].0, 1);
        h.fail(renders[1].0, "GPU lost");
        h.controller.tick(h.at(10));

        let state = h.controller.state();
        assert_eq!(h.displayed_marker(), Some(1));
        assert_eq!(state.error.as_deref(), Some("GPU lost"));
        assert!(!state.is_loading);
        assert_eq!(h.controller.phase(), Phase::Errored);
    }

    #[test]
    fn test_failure_without_image() {
        let mut h = Harness::new();
        let single = RenderOptions {
            progressive: false,
            ..options(0)
        };
        h.controller.set_key(key("a", 0.0, single), h.at(0));
        h.controller.tick(h.at(0));
        let renders = h.take_renders();
        h.fail(renders[0].0, "Asset not found");
        h.controller.tick(h.at(5));

        let state = h.controller.state();
        assert_eq!(state.display, None);
        assert!(!state.is_loading);
        assert_eq!(state.error.as_deref(), Some("Asset not found"));
    }

    #[test]
    fn test_new_request_clears_error() {
        let mut h = Harness::new();
        let single = RenderOptions {
            progressive: false,
            ..options(0)
        };
        h.controller.set_key(key("a", 0.0, single), h.at(0));
        h.controller.tick(h.at(0));
        let renders = h.take_renders();
        h.fail(renders[0].0, "boom");
        h.controller.tick(h.at(1));
        assert!(h.controller.state().error.is_some());

        h.controller.set_key(key("a", 1.0, single), h.at(2));
        h.controller.tick(h.at(2));
        assert_eq!(h.controller.state().error, None);
        assert!(h.controller.state().is_loading);
    }

    #[test]
    fn test_same_key_is_not_a_new_generation() {
        let mut h = Harness::new();
        assert!(h.controller.set_key(key("a", 0.0, options(0)), h.at(0)));
        let generation = h.controller.generation();
        assert!(!h.controller.set_key(key("a", 0.0, options(0)), h.at(1)));
        assert_eq!(h.controller.generation(), generation);
    }

    #[test]
    fn test_clearing_key_releases_display() {
        let mut h = Harness::new();
        h.controller.set_key(key("a", 0.0, options(0)), h.at(0));
        h.controller.tick(h.at(0));
        let renders = h.take_renders();
        h.succeed(renders[0].0, 1);
        h.controller.tick(h.at(1));
        assert_eq!(h.registry.live_count(), 1);

        h.controller.set_key(None, h.at(2));
        assert_eq!(h.controller.state(), &PreviewState::default());
        assert_eq!(h.controller.phase(), Phase::Idle);
        assert_eq!(h.registry.live_count(), 0);

        // The full pass of the cleared key lands afterwards
        h.succeed(renders[1].0, 2);
        h.controller.tick(h.at(3));
        assert_eq!(h.registry.live_count(), 0);
    }

    #[test]
    fn test_teardown_revokes_everything() {
        let mut h = Harness::new();
        h.controller.set_key(key("a", 0.0, options(0)), h.at(0));
        h.controller.tick(h.at(0));
        let renders = h.take_renders();
        h.succeed(renders[0].0, 1);
        h.controller.tick(h.at(1));

        h.controller.teardown();
        assert_eq!(h.registry.live_count(), 0);
        assert_eq!(h.controller.in_flight_count(), 0);

        h.succeed(renders[1].0, 2);
        assert!(!h.controller.tick(h.at(2)));
        assert_eq!(h.registry.live_count(), 0);
    }

    #[test]
    fn test_drop_revokes_handles() {
        let h = Harness::new();
        let Harness {
            host,
            registry,
            mut controller,
            start,
        } = h;
        controller.set_key(key("a", 0.0, options(0)), start);
        controller.tick(start);
        for (ticket, _) in host.take_submitted() {
            host.complete(ticket, Ok(ServiceReply::Image(vec![1; 4])));
        }
        controller.tick(start);
        assert_eq!(registry.live_count(), 1);

        drop(controller);
        assert_eq!(registry.live_count(), 0);
    }
}
