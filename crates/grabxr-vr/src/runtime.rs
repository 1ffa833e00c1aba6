//! Boundary to the XR runtime.
//!
//! The core never names a runtime API directly. The session, action and
//! hand-joint entry points are split into three traits so each subsystem only
//! receives what it uses; `grabxr-vr-openxr` implements all of them on top of
//! one OpenXR session.

use crate::types::{
    ActionState, FrameState, Hand, HandJoints, HapticPulse, NativeImage, ProjectionLayer,
    RuntimeEvent, SpaceLocation, Time, View, ViewConfig,
};
use crate::{BlendMode, XrResult};

/// What system discovery reported at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemInfo {
    pub runtime_name: String,
    pub runtime_version: String,
    pub system_name: String,
    pub hand_tracking_supported: bool,
    pub hand_joint_count: usize,
    /// Recommended render target per view of the stereo configuration.
    pub views: Vec<ViewConfig>,
    /// Runtime-supported blend modes, runtime preference first.
    pub blend_modes: Vec<BlendMode>,
}

/// Begin/end of the runtime session, driven by the lifecycle state machine.
pub trait SessionControl {
    fn begin_session(&mut self) -> XrResult<()>;
    fn end_session(&mut self) -> XrResult<()>;
}

pub trait XrRuntime: SessionControl {
    fn system_info(&self) -> &SystemInfo;

    /// Ask the runtime to end the session. The runtime answers with state
    /// events down to EXITING; the session itself is ended on STOPPING.
    fn request_exit(&mut self) -> XrResult<()>;

    /// Next queued event, or `None` once the queue is empty. Never blocks.
    fn poll_event(&mut self) -> XrResult<Option<RuntimeEvent>>;

    /// Interaction profile currently bound for a hand, if any.
    fn current_interaction_profile(&self, hand: Hand) -> XrResult<Option<String>>;

    fn swapchain_formats(&self) -> XrResult<Vec<i64>>;

    /// Create one swapchain per view and return the images of each.
    fn create_swapchains(
        &mut self,
        format: i64,
        config: &ViewConfig,
        view_count: usize,
    ) -> XrResult<Vec<Vec<NativeImage>>>;

    fn destroy_swapchains(&mut self);

    /// Block until the runtime hands out the next frame slot.
    fn wait_frame(&mut self) -> XrResult<FrameState>;
    fn begin_frame(&mut self) -> XrResult<()>;
    fn end_frame(
        &mut self,
        display_time: Time,
        blend_mode: BlendMode,
        layer: Option<&ProjectionLayer>,
    ) -> XrResult<()>;

    fn locate_views(&mut self, display_time: Time) -> XrResult<Vec<View>>;

    fn acquire_image(&mut self, view: usize) -> XrResult<u32>;
    /// Waits with an infinite timeout.
    fn wait_image(&mut self, view: usize) -> XrResult<()>;
    fn release_image(&mut self, view: usize) -> XrResult<()>;
}

/// Bound action set: grab (float), grip (pose) and buzz (haptic) per hand.
pub trait ActionSource {
    /// Sync the single active action set.
    fn sync(&mut self) -> XrResult<()>;
    /// Whether the grip pose action is active for this hand.
    fn grip_active(&self, hand: Hand) -> XrResult<bool>;
    /// Locate the grip action space against the reference space.
    fn locate_grip(&self, hand: Hand, time: Time) -> XrResult<SpaceLocation>;
    fn grab_state(&self, hand: Hand) -> XrResult<ActionState<f32>>;
    fn apply_haptic(&mut self, hand: Hand, pulse: HapticPulse) -> XrResult<()>;
}

/// Hand-joint locator backed by the hand-tracking extension.
pub trait JointSource {
    fn has_tracker(&self, hand: Hand) -> bool;
    /// Locate all joints against the reference space with the unobstructed
    /// motion-range policy.
    fn locate_joints(&self, hand: Hand, time: Time) -> XrResult<HandJoints>;
}

/// First application-preferred mode the runtime supports, otherwise the
/// runtime's own first choice.
pub fn select_blend_mode(preferred: &[BlendMode], supported: &[BlendMode]) -> Option<BlendMode> {
    preferred
        .iter()
        .copied()
        .find(|mode| supported.contains(mode))
        .or_else(|| supported.first().copied())
}
