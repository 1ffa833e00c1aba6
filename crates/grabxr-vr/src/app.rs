//! Top-level loop tying the subsystems together.

use grabxr_common::AppConfig;
use tracing::{error, info, warn};

use crate::events::EventPump;
use crate::frame::{FrameScheduler, RenderTargets, World};
use crate::graphics::GraphicsDevice;
use crate::hand_tracking::HandTrackingSystem;
use crate::input::ActionInputSystem;
use crate::lifecycle::SessionLifecycle;
use crate::platform::{SystemEventQueue, SystemEventSender};
use crate::render::{RenderSettings, SceneRenderer, ShaderSources};
use crate::runtime::{select_blend_mode, ActionSource, JointSource, XrRuntime};
use crate::scene;
use crate::swapchain::ViewTargets;
use crate::{BlendMode, XrError, XrResult};

/// Loop passes allowed between an exit request and EXITING, about three
/// seconds at 90 Hz.
pub const EXIT_ITERATION_BUDGET: u32 = 270;

/// Everything a backend hands over once the runtime session and graphics
/// device exist.
pub struct Connection<R, D> {
    pub runtime: R,
    pub device: D,
    pub actions: Box<dyn ActionSource>,
    /// `None` when the runtime has no hand-tracking support.
    pub joints: Option<Box<dyn JointSource>>,
    pub shaders: ShaderSources<'static>,
}

pub struct Application<R: XrRuntime, D: GraphicsDevice> {
    // Field order is drop order: action and joint sources hold runtime
    // handles and go before the runtime, which goes before the device.
    world: World,
    runtime: R,
    device: D,
    lifecycle: SessionLifecycle,
    events: EventPump,
    platform: SystemEventQueue,
    scheduler: FrameScheduler,
    renderer: Option<SceneRenderer>,
    targets: ViewTargets,
    exit_budget: Option<u32>,
}

impl<R: XrRuntime, D: GraphicsDevice> Application<R, D> {
    /// Negotiate the blend mode and create swapchains, scene resources and
    /// the block grid. Every error here is a setup failure.
    pub fn new(connection: Connection<R, D>, config: &AppConfig) -> XrResult<Self> {
        let Connection {
            mut runtime,
            mut device,
            actions,
            joints,
            shaders,
        } = connection;

        if device.backend() != config.graphics_backend {
            return Err(XrError::Unavailable(format!(
                "device is {} but {} was requested",
                device.backend(),
                config.graphics_backend
            )));
        }

        let info = runtime.system_info().clone();
        info!(
            runtime = %info.runtime_name,
            version = %info.runtime_version,
            system = %info.system_name,
            hand_tracking = info.hand_tracking_supported,
            joints = info.hand_joint_count,
            "xr system"
        );

        let blend_mode = select_blend_mode(&config.blend_modes, &info.blend_modes)
            .ok_or_else(|| XrError::setup("runtime reports no environment blend modes"))?;
        info!(?blend_mode, "environment blend mode selected");

        let mut targets = ViewTargets::create(&mut runtime, &mut device, &info.views)?;

        let blocks = scene::block_grid(&config.blocks);
        let settings = RenderSettings {
            near_z: config.near_z,
            far_z: config.far_z,
            view_height_m: config.view_height_m,
        };
        let renderer = match SceneRenderer::new(
            &mut device,
            shaders,
            targets.format(),
            blocks.len(),
            settings,
        ) {
            Ok(renderer) => renderer,
            Err(err) => {
                targets.destroy(&mut runtime, &mut device);
                return Err(err);
            }
        };

        let joints = match joints {
            Some(joints) if config.hand_tracking && info.hand_tracking_supported => Some(joints),
            Some(_) if !config.hand_tracking => {
                info!("hand tracking disabled by configuration");
                None
            }
            _ => None,
        };

        let world = World::new(
            blocks,
            ActionInputSystem::new(actions),
            HandTrackingSystem::new(joints),
        );

        Ok(Self {
            runtime,
            device,
            lifecycle: SessionLifecycle::new(),
            events: EventPump::new(),
            platform: SystemEventQueue::new(),
            scheduler: FrameScheduler::new(blend_mode),
            world,
            renderer: Some(renderer),
            targets,
            exit_budget: None,
        })
    }

    /// Handle for delivering host events from other threads.
    pub fn system_events(&self) -> SystemEventSender {
        self.platform.sender()
    }

    pub fn lifecycle(&self) -> &SessionLifecycle {
        &self.lifecycle
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn events(&self) -> &EventPump {
        &self.events
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.scheduler.blend_mode()
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// One pass of the main loop: host events, runtime events, then a frame
    /// if the session is running.
    pub fn iterate(&mut self) -> XrResult<()> {
        if self.platform.drain(&mut self.lifecycle) {
            self.begin_exit();
        }
        self.events.pump(&mut self.runtime, &mut self.lifecycle)?;
        self.spend_exit_budget();
        if !self.lifecycle.application_running() {
            return Ok(());
        }
        if !self.lifecycle.is_running() {
            std::thread::sleep(self.platform.idle_wait());
            return Ok(());
        }

        let Some(renderer) = self.renderer.as_ref() else {
            return Err(XrError::graphics("scene resources already released"));
        };
        self.scheduler.run_frame(
            &mut self.runtime,
            &mut self.device,
            &self.lifecycle,
            &mut self.world,
            RenderTargets {
                renderer,
                views: &self.targets,
            },
        )?;
        Ok(())
    }

    /// Loop until the runtime or the host ends the application.
    pub fn run(&mut self) -> XrResult<()> {
        info!("entering main loop");
        let result = loop {
            if !self.lifecycle.application_running() {
                break Ok(());
            }
            if let Err(err) = self.iterate() {
                error!("main loop stopped: {err}");
                break Err(err);
            }
        };
        self.shutdown();
        result
    }

    /// Hand the exit to the runtime; frames keep flowing while it walks the
    /// session down.
    fn begin_exit(&mut self) {
        match self.runtime.request_exit() {
            Ok(()) => self.exit_budget = Some(EXIT_ITERATION_BUDGET),
            Err(err) => {
                warn!("runtime refused the exit request: {err}");
                self.lifecycle.force_exit();
            }
        }
    }

    fn spend_exit_budget(&mut self) {
        let Some(left) = self.exit_budget else {
            return;
        };
        if !self.lifecycle.exit_requested() {
            self.exit_budget = None;
        } else if left == 0 {
            warn!("runtime did not reach EXITING after {EXIT_ITERATION_BUDGET} passes");
            self.lifecycle.force_exit();
        } else {
            self.exit_budget = Some(left - 1);
        }
    }

    /// Report frame statistics. A session the runtime never stopped is left
    /// to instance teardown; ending it outside STOPPING is invalid.
    pub fn shutdown(&mut self) {
        if self.lifecycle.is_running() {
            warn!(
                state = self.lifecycle.state().as_str(),
                "session still running at shutdown"
            );
        }
        self.scheduler.log_summary();
    }
}

impl<R: XrRuntime, D: GraphicsDevice> Drop for Application<R, D> {
    fn drop(&mut self) {
        if let Some(renderer) = self.renderer.take() {
            renderer.destroy(&mut self.device);
        }
        self.targets.destroy(&mut self.runtime, &mut self.device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeActions, FakeJoints, RecordingDevice, RuntimeCall, ScriptedRuntime};
    use crate::types::{RuntimeEvent, SessionState, Time};
    use crate::GraphicsBackend;

    fn connection(runtime: ScriptedRuntime) -> Connection<ScriptedRuntime, RecordingDevice> {
        let (actions, _) = FakeActions::new();
        let (joints, _) = FakeJoints::new();
        Connection {
            runtime,
            device: RecordingDevice::new(),
            actions: Box::new(actions),
            joints: Some(Box::new(joints)),
            shaders: ShaderSources {
                vertex: b"vs",
                fragment: b"fs",
            },
        }
    }

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.blocks.colour_seed = Some(1);
        config
    }

    fn state(state: SessionState) -> RuntimeEvent {
        RuntimeEvent::SessionStateChanged {
            state,
            time: Time::from_nanos(0),
        }
    }

    #[test]
    fn test_setup_negotiates_and_builds_scene() {
        let app = Application::new(connection(ScriptedRuntime::stereo()), &config()).unwrap();
        assert_eq!(app.blend_mode(), BlendMode::Opaque);
        assert_eq!(app.world().blocks.len(), 64);
        assert!(app.world().hand_tracking.is_active());
    }

    #[test]
    fn test_wrong_backend_is_unavailable() {
        let mut config = config();
        config.graphics_backend = GraphicsBackend::Vulkan;
        let err = Application::new(connection(ScriptedRuntime::stereo()), &config)
            .err()
            .unwrap();
        assert!(matches!(err, XrError::Unavailable(_)));
        assert!(err.is_fatal_setup());
    }

    #[test]
    fn test_mismatched_views_fail_setup() {
        let mut runtime = ScriptedRuntime::stereo();
        runtime.info.views[1].recommended_width += 16;
        let err = Application::new(connection(runtime), &config()).err().unwrap();
        assert!(matches!(err, XrError::ViewSizeMismatch { .. }));
    }

    #[test]
    fn test_hand_tracking_can_be_disabled() {
        let mut config = config();
        config.hand_tracking = false;
        let app = Application::new(connection(ScriptedRuntime::stereo()), &config).unwrap();
        assert!(!app.world().hand_tracking.is_active());
    }

    #[test]
    fn test_run_until_exiting() {
        let mut runtime = ScriptedRuntime::stereo();
        runtime.push_events([
            state(SessionState::Idle),
            state(SessionState::Ready),
            state(SessionState::Synchronized),
            state(SessionState::Visible),
            state(SessionState::Focused),
        ]);
        runtime.stop_after_frames = Some(3);
        let mut app = Application::new(connection(runtime), &config()).unwrap();

        app.run().unwrap();

        let stats = app.scheduler().stats();
        assert_eq!(stats.frames, 3);
        assert_eq!(stats.rendered, 3);
        assert!(!app.lifecycle().application_running());
        assert_eq!(app.runtime().sessions_begun, 1);
        assert_eq!(app.runtime().sessions_ended, 1);
        assert_eq!(app.lifecycle().state(), SessionState::Exiting);
    }

    #[test]
    fn test_destroy_request_walks_session_down() {
        let mut runtime = ScriptedRuntime::stereo();
        runtime.push_events([state(SessionState::Ready), state(SessionState::Focused)]);
        let mut app = Application::new(connection(runtime), &config()).unwrap();

        app.iterate().unwrap();
        assert!(app.lifecycle().can_render());
        app.system_events()
            .send(crate::platform::SystemEvent::DestroyRequested);
        app.run().unwrap();

        let calls = &app.runtime().calls;
        let exit = calls
            .iter()
            .position(|c| *c == RuntimeCall::RequestExit)
            .unwrap();
        let end = calls
            .iter()
            .position(|c| *c == RuntimeCall::EndSession)
            .unwrap();
        assert!(exit < end);
        assert_eq!(app.runtime().sessions_ended, 1);
        assert_eq!(app.lifecycle().state(), SessionState::Exiting);
        assert!(!app.lifecycle().is_running());
    }

    #[test]
    fn test_unanswered_exit_request_gives_up() {
        let mut runtime = ScriptedRuntime::stereo();
        runtime.push_events([state(SessionState::Ready), state(SessionState::Focused)]);
        runtime.ignore_exit_requests = true;
        let mut app = Application::new(connection(runtime), &config()).unwrap();
        app.iterate().unwrap();
        app.system_events()
            .send(crate::platform::SystemEvent::DestroyRequested);

        app.run().unwrap();

        assert!(!app.lifecycle().application_running());
        assert!(app.lifecycle().is_running());
        assert_eq!(app.runtime().sessions_ended, 0);
        assert_eq!(
            app.scheduler().stats().frames,
            1 + u64::from(EXIT_ITERATION_BUDGET)
        );
    }

    #[test]
    fn test_refused_exit_request_stops_without_ending() {
        let mut runtime = ScriptedRuntime::stereo();
        runtime.push_events([state(SessionState::Ready), state(SessionState::Focused)]);
        runtime.fail_request_exit = true;
        let mut app = Application::new(connection(runtime), &config()).unwrap();
        app.iterate().unwrap();
        app.system_events()
            .send(crate::platform::SystemEvent::DestroyRequested);

        app.run().unwrap();

        assert!(!app.lifecycle().application_running());
        assert_eq!(app.runtime().sessions_ended, 0);
        assert_eq!(app.scheduler().stats().frames, 1);
    }

    #[test]
    fn test_destroy_while_idle_exits_without_runtime_call() {
        let mut runtime = ScriptedRuntime::stereo();
        runtime.push_events([state(SessionState::Idle)]);
        let mut app = Application::new(connection(runtime), &config()).unwrap();
        app.iterate().unwrap();
        app.system_events()
            .send(crate::platform::SystemEvent::DestroyRequested);

        app.run().unwrap();

        assert!(!app.runtime().calls.contains(&RuntimeCall::RequestExit));
        assert_eq!(app.scheduler().stats().frames, 0);
    }

    #[test]
    fn test_drop_releases_resources() {
        let app = Application::new(connection(ScriptedRuntime::stereo()), &config()).unwrap();
        let live = app.device().live_handle();
        let destroyed = app.runtime().swapchains_destroyed.clone();
        assert!(!live.borrow().is_empty());

        drop(app);

        assert!(live.borrow().is_empty());
        assert!(destroyed.get());
    }
}
