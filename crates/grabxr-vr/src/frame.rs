//! Frame pacing and submission.
//!
//! Every iteration with a running session produces exactly one
//! wait/begin/end bracket. Input, interaction and rendering only happen
//! inside the bracket when the session is active and the runtime asked for
//! pixels; otherwise the frame ends with no layers.

use tracing::{debug, info, warn};

use crate::graphics::GraphicsDevice;
use crate::hand_tracking::HandTrackingSystem;
use crate::input::ActionInputSystem;
use crate::interaction::GrabInteractionEngine;
use crate::lifecycle::SessionLifecycle;
use crate::render::{SceneFrame, SceneRenderer};
use crate::runtime::XrRuntime;
use crate::swapchain::{ViewTarget, ViewTargets};
use crate::types::{Block, ProjectionLayer, ProjectionView, Time, View};
use crate::{BlendMode, XrError, XrResult};

/// Mutable simulation state advanced once per rendered frame.
pub struct World {
    pub blocks: Vec<Block>,
    pub input: ActionInputSystem,
    pub hand_tracking: HandTrackingSystem,
    pub grab: GrabInteractionEngine,
}

impl World {
    pub fn new(
        blocks: Vec<Block>,
        input: ActionInputSystem,
        hand_tracking: HandTrackingSystem,
    ) -> Self {
        Self {
            blocks,
            input,
            hand_tracking,
            grab: GrabInteractionEngine::new(),
        }
    }

    /// Sync input and hand joints at `display_time`, then run the grab state
    /// machine. Only an action-set sync failure is returned.
    pub fn advance(&mut self, display_time: Time) -> XrResult<()> {
        self.input.sync(display_time)?;
        self.hand_tracking.locate(display_time);
        self.grab.update(self.input.hands_mut(), &mut self.blocks);
        Ok(())
    }

    pub fn scene_frame(&self) -> SceneFrame<'_> {
        SceneFrame {
            blocks: &self.blocks,
            hands: self.input.hands(),
            grab: &self.grab,
            hand_tracking: &self.hand_tracking,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames: u64,
    pub rendered: u64,
    pub empty: u64,
    pub abandoned_syncs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A projection layer was submitted.
    Rendered { draws: usize },
    /// The frame was ended with zero layers.
    Empty,
}

/// Borrowed render resources for one frame.
pub struct RenderTargets<'a> {
    pub renderer: &'a SceneRenderer,
    pub views: &'a ViewTargets,
}

pub struct FrameScheduler {
    blend_mode: BlendMode,
    stats: FrameStats,
}

impl FrameScheduler {
    pub fn new(blend_mode: BlendMode) -> Self {
        Self {
            blend_mode,
            stats: FrameStats::default(),
        }
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Run one frame. Errors are only returned for the wait, begin and end
    /// calls themselves; anything failing inside the bracket ends the frame
    /// with no layers.
    pub fn run_frame<R, D>(
        &mut self,
        runtime: &mut R,
        device: &mut D,
        lifecycle: &SessionLifecycle,
        world: &mut World,
        targets: RenderTargets<'_>,
    ) -> XrResult<FrameOutcome>
    where
        R: XrRuntime + ?Sized,
        D: GraphicsDevice + ?Sized,
    {
        let frame_state = runtime.wait_frame()?;
        runtime.begin_frame()?;
        self.stats.frames += 1;

        let display_time = frame_state.predicted_display_time;
        let mut submitted = None;
        if lifecycle.is_active() && frame_state.should_render {
            match world.advance(display_time) {
                Ok(()) => {
                    submitted = self.render_layer(runtime, device, world, &targets, display_time);
                }
                Err(err) => {
                    warn!("input sync failed, frame abandoned: {err}");
                    self.stats.abandoned_syncs += 1;
                }
            }
        }

        let outcome = match &submitted {
            Some((_, draws)) => {
                self.stats.rendered += 1;
                FrameOutcome::Rendered { draws: *draws }
            }
            None => {
                self.stats.empty += 1;
                FrameOutcome::Empty
            }
        };
        runtime.end_frame(
            display_time,
            self.blend_mode,
            submitted.as_ref().map(|(layer, _)| layer),
        )?;
        Ok(outcome)
    }

    fn render_layer<R, D>(
        &self,
        runtime: &mut R,
        device: &mut D,
        world: &World,
        targets: &RenderTargets<'_>,
        display_time: Time,
    ) -> Option<(ProjectionLayer, usize)>
    where
        R: XrRuntime + ?Sized,
        D: GraphicsDevice + ?Sized,
    {
        let views = match runtime.locate_views(display_time) {
            Ok(views) => views,
            Err(err) => {
                warn!("view locate failed, submitting no layers: {err}");
                return None;
            }
        };

        let scene = world.scene_frame();
        let mut layer = ProjectionLayer {
            views: Vec::with_capacity(views.len()),
        };
        let mut draws = 0;
        for (index, view) in views.iter().enumerate() {
            let Some(target) = targets.views.view(index) else {
                warn!(index, "no swapchain for located view");
                return None;
            };
            match self.render_view(runtime, device, targets.renderer, target, index, view, &scene) {
                Ok(count) => draws += count,
                Err(err) => {
                    warn!(index, "view render failed, submitting no layers: {err}");
                    return None;
                }
            }
            layer.views.push(ProjectionView {
                view_index: index,
                pose: view.pose,
                fov: view.fov,
                width: target.width,
                height: target.height,
            });
        }
        debug!(views = layer.views.len(), draws, "layer rendered");
        Some((layer, draws))
    }

    #[allow(clippy::too_many_arguments)]
    fn render_view<R, D>(
        &self,
        runtime: &mut R,
        device: &mut D,
        renderer: &SceneRenderer,
        target: &ViewTarget,
        index: usize,
        view: &View,
        scene: &SceneFrame<'_>,
    ) -> XrResult<usize>
    where
        R: XrRuntime + ?Sized,
        D: GraphicsDevice + ?Sized,
    {
        let image_index = runtime.acquire_image(index)?;
        let drawn = runtime.wait_image(index).and_then(|()| {
            renderer.render_view(device, target, image_index, view, self.blend_mode, scene)
        });
        let released = runtime.release_image(index);
        let draws = drawn?;
        released.map_err(|err| XrError::runtime(format!("release of view {index} image: {err}")))?;
        Ok(draws)
    }

    pub fn log_summary(&self) {
        info!(
            frames = self.stats.frames,
            rendered = self.stats.rendered,
            empty = self.stats.empty,
            abandoned_syncs = self.stats.abandoned_syncs,
            "frame statistics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{RenderSettings, ShaderSources};
    use crate::testing::{FakeActions, RecordingDevice, RuntimeCall, ScriptedRuntime};
    use crate::types::{FrameState, SessionState};
    use glam::Vec3;

    struct Rig {
        runtime: ScriptedRuntime,
        device: RecordingDevice,
        lifecycle: SessionLifecycle,
        world: World,
        renderer: SceneRenderer,
        views: ViewTargets,
        actions: std::rc::Rc<std::cell::RefCell<crate::testing::ActionScript>>,
    }

    impl Rig {
        fn new(states: &[SessionState]) -> Self {
            let mut runtime = ScriptedRuntime::stereo();
            let mut device = RecordingDevice::new();
            let mut lifecycle = SessionLifecycle::new();
            for state in states {
                lifecycle.on_state_changed(*state, &mut runtime).unwrap();
            }
            let views = runtime.info.views.clone();
            let views = ViewTargets::create(&mut runtime, &mut device, &views).unwrap();
            let renderer = SceneRenderer::new(
                &mut device,
                ShaderSources {
                    vertex: b"vs",
                    fragment: b"fs",
                },
                views.format(),
                1,
                RenderSettings {
                    near_z: 0.05,
                    far_z: 100.0,
                    view_height_m: 1.5,
                },
            )
            .unwrap();
            let (actions, script) = FakeActions::new();
            let world = World::new(
                vec![Block::at(Vec3::new(0.0, 0.0, -0.5), 0.095, Vec3::ONE)],
                ActionInputSystem::new(Box::new(actions)),
                HandTrackingSystem::disabled(),
            );
            runtime.calls.clear();
            Self {
                runtime,
                device,
                lifecycle,
                world,
                renderer,
                views,
                actions: script,
            }
        }

        fn frame(&mut self, scheduler: &mut FrameScheduler) -> FrameOutcome {
            scheduler
                .run_frame(
                    &mut self.runtime,
                    &mut self.device,
                    &self.lifecycle,
                    &mut self.world,
                    RenderTargets {
                        renderer: &self.renderer,
                        views: &self.views,
                    },
                )
                .unwrap()
        }
    }

    const ACTIVE: &[SessionState] = &[SessionState::Ready, SessionState::Focused];

    #[test]
    fn test_rendered_frame_brackets_views() {
        let mut rig = Rig::new(ACTIVE);
        let mut scheduler = FrameScheduler::new(BlendMode::Opaque);

        let outcome = rig.frame(&mut scheduler);

        // 2 fixed props and 1 block per view
        assert_eq!(outcome, FrameOutcome::Rendered { draws: 6 });
        let time = rig.runtime.last_frame_time();
        assert_eq!(
            rig.runtime.calls,
            vec![
                RuntimeCall::WaitFrame,
                RuntimeCall::BeginFrame,
                RuntimeCall::LocateViews(time),
                RuntimeCall::AcquireImage(0),
                RuntimeCall::WaitImage(0),
                RuntimeCall::ReleaseImage(0),
                RuntimeCall::AcquireImage(1),
                RuntimeCall::WaitImage(1),
                RuntimeCall::ReleaseImage(1),
                RuntimeCall::EndFrame {
                    time,
                    blend_mode: BlendMode::Opaque,
                    views: 2,
                },
            ]
        );
        assert_eq!(rig.actions.borrow().located_at.len(), 0);
        assert_eq!(rig.actions.borrow().syncs, 1);
    }

    #[test]
    fn test_should_render_false_submits_empty_frame() {
        let mut rig = Rig::new(ACTIVE);
        rig.runtime.next_frame = Some(FrameState {
            predicted_display_time: Time::from_nanos(777),
            predicted_display_period_ns: 11_111_111,
            should_render: false,
        });
        let mut scheduler = FrameScheduler::new(BlendMode::Additive);

        assert_eq!(rig.frame(&mut scheduler), FrameOutcome::Empty);
        assert_eq!(
            rig.runtime.calls,
            vec![
                RuntimeCall::WaitFrame,
                RuntimeCall::BeginFrame,
                RuntimeCall::EndFrame {
                    time: Time::from_nanos(777),
                    blend_mode: BlendMode::Additive,
                    views: 0,
                },
            ]
        );
        assert_eq!(rig.actions.borrow().syncs, 0);
    }

    #[test]
    fn test_inactive_session_submits_empty_frame() {
        let mut rig = Rig::new(&[SessionState::Ready]);
        let mut scheduler = FrameScheduler::new(BlendMode::Opaque);
        assert_eq!(rig.frame(&mut scheduler), FrameOutcome::Empty);
        assert_eq!(scheduler.stats().empty, 1);
    }

    #[test]
    fn test_view_locate_failure_keeps_bracket() {
        let mut rig = Rig::new(ACTIVE);
        rig.runtime.fail_locate_views = true;
        let mut scheduler = FrameScheduler::new(BlendMode::Opaque);

        assert_eq!(rig.frame(&mut scheduler), FrameOutcome::Empty);
        assert!(matches!(
            rig.runtime.calls.last(),
            Some(RuntimeCall::EndFrame { views: 0, .. })
        ));
        assert_eq!(rig.device.draws(), 0);
    }

    #[test]
    fn test_action_sync_failure_abandons_frame() {
        let mut rig = Rig::new(ACTIVE);
        rig.actions.borrow_mut().fail_sync = true;
        let mut scheduler = FrameScheduler::new(BlendMode::Opaque);

        assert_eq!(rig.frame(&mut scheduler), FrameOutcome::Empty);
        let stats = scheduler.stats();
        assert_eq!(stats.abandoned_syncs, 1);
        assert_eq!(stats.frames, 1);
        assert!(!rig
            .runtime
            .calls
            .iter()
            .any(|c| matches!(c, RuntimeCall::LocateViews(_))));
    }

    #[test]
    fn test_wait_image_failure_still_releases() {
        let mut rig = Rig::new(ACTIVE);
        rig.runtime.fail_wait_image = true;
        let mut scheduler = FrameScheduler::new(BlendMode::Opaque);

        assert_eq!(rig.frame(&mut scheduler), FrameOutcome::Empty);
        assert!(rig.runtime.calls.contains(&RuntimeCall::ReleaseImage(0)));
        assert!(!rig.runtime.calls.contains(&RuntimeCall::AcquireImage(1)));
        assert!(matches!(
            rig.runtime.calls.last(),
            Some(RuntimeCall::EndFrame { views: 0, .. })
        ));
    }

    #[test]
    fn test_stats_accumulate() {
        let mut rig = Rig::new(ACTIVE);
        let mut scheduler = FrameScheduler::new(BlendMode::Opaque);
        rig.frame(&mut scheduler);
        rig.frame(&mut scheduler);
        rig.runtime.fail_locate_views = true;
        rig.frame(&mut scheduler);
        assert_eq!(
            scheduler.stats(),
            FrameStats {
                frames: 3,
                rendered: 2,
                empty: 1,
                abandoned_syncs: 0,
            }
        );
    }
}
