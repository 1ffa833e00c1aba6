use std::ops::{Index, IndexMut};

use glam::Vec3;

use crate::math::{Fov, Pose};

/// Runtime timestamp in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Time(i64);

impl Time {
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    pub const ALL: [Hand; 2] = [Hand::Left, Hand::Right];

    pub const fn index(self) -> usize {
        match self {
            Hand::Left => 0,
            Hand::Right => 1,
        }
    }

    pub const fn other(self) -> Hand {
        match self {
            Hand::Left => Hand::Right,
            Hand::Right => Hand::Left,
        }
    }

    /// Top-level user path used as the action subaction path.
    pub const fn user_path(self) -> &'static str {
        match self {
            Hand::Left => "/user/hand/left",
            Hand::Right => "/user/hand/right",
        }
    }
}

/// One value per hand, indexed by [`Hand`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PerHand<T>([T; 2]);

impl<T> PerHand<T> {
    pub fn new(left: T, right: T) -> Self {
        Self([left, right])
    }

    pub fn iter(&self) -> impl Iterator<Item = (Hand, &T)> {
        Hand::ALL.into_iter().zip(self.0.iter())
    }
}

impl<T> Index<Hand> for PerHand<T> {
    type Output = T;

    fn index(&self, hand: Hand) -> &T {
        &self.0[hand.index()]
    }
}

impl<T> IndexMut<Hand> for PerHand<T> {
    fn index_mut(&mut self, hand: Hand) -> &mut T {
        &mut self.0[hand.index()]
    }
}

/// Session states as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Unknown,
    Idle,
    Ready,
    Synchronized,
    Visible,
    Focused,
    Stopping,
    LossPending,
    Exiting,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Idle => "idle",
            Self::Ready => "ready",
            Self::Synchronized => "synchronized",
            Self::Visible => "visible",
            Self::Focused => "focused",
            Self::Stopping => "stopping",
            Self::LossPending => "loss-pending",
            Self::Exiting => "exiting",
        }
    }

    /// States in which the compositor is consuming frames.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Synchronized | Self::Visible | Self::Focused)
    }
}

/// Event drained from the runtime's queue.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    EventsLost { count: u32 },
    InstanceLossPending { loss_time: Time },
    InteractionProfileChanged,
    ReferenceSpaceChangePending { change_time: Time },
    SessionStateChanged { state: SessionState, time: Time },
    /// Anything the application does not handle.
    Other,
}

/// Result of waiting for the next frame slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameState {
    pub predicted_display_time: Time,
    pub predicted_display_period_ns: i64,
    pub should_render: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ActionState<T> {
    pub current_state: T,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpaceLocation {
    pub pose: Pose,
    pub position_valid: bool,
    pub orientation_valid: bool,
}

impl SpaceLocation {
    pub fn is_fully_valid(&self) -> bool {
        self.position_valid && self.orientation_valid
    }
}

/// Joints in the default hand-tracking joint set.
pub const HAND_JOINT_COUNT: usize = 26;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointLocation {
    pub pose: Pose,
    pub radius: f32,
    pub position_valid: bool,
    pub orientation_valid: bool,
}

pub type HandJoints = [JointLocation; HAND_JOINT_COUNT];

/// Haptic pulse. Duration is always the runtime minimum and frequency the
/// runtime default.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HapticPulse {
    pub amplitude: f32,
}

/// Recommended render target for one view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewConfig {
    pub recommended_width: u32,
    pub recommended_height: u32,
    pub recommended_sample_count: u32,
}

/// Eye pose and field of view located for one display time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct View {
    pub pose: Pose,
    pub fov: Fov,
}

/// Backend-native swapchain image (a GL texture name, a VkImage handle...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeImage(pub u64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionView {
    pub view_index: usize,
    pub pose: Pose,
    pub fov: Fov,
    pub width: u32,
    pub height: u32,
}

/// Stereo projection layer handed to the compositor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProjectionLayer {
    pub views: Vec<ProjectionView>,
}

/// Per-hand controller input, rewritten by every input sync.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HandInputState {
    /// Last fully valid grip location; kept when a locate comes back invalid.
    pub grip_pose: Pose,
    /// Grip pose action is active this frame.
    pub grip_active: bool,
    pub grab: ActionState<f32>,
    /// Current vibration strength, halved on every sync.
    pub haptic_amplitude: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block {
    pub pose: Pose,
    pub scale: Vec3,
    pub colour: Vec3,
}

impl Block {
    pub fn at(position: Vec3, size: f32, colour: Vec3) -> Self {
        Self {
            pose: Pose::from_position(position),
            scale: Vec3::splat(size),
            colour,
        }
    }
}
