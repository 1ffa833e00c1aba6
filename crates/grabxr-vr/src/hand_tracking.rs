use tracing::warn;

use crate::runtime::JointSource;
use crate::types::{Hand, HandJoints, PerHand, Time, HAND_JOINT_COUNT};

/// Joint poses for both hands. Inactive when the runtime has no
/// hand-tracking support or it was disabled at startup.
pub struct HandTrackingSystem {
    source: Option<Box<dyn JointSource>>,
    joints: PerHand<HandJoints>,
    located: PerHand<bool>,
}

impl HandTrackingSystem {
    pub fn new(source: Option<Box<dyn JointSource>>) -> Self {
        Self {
            source,
            joints: PerHand::new(
                [Default::default(); HAND_JOINT_COUNT],
                [Default::default(); HAND_JOINT_COUNT],
            ),
            located: PerHand::default(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn is_active(&self) -> bool {
        self.source.is_some()
    }

    pub fn joints(&self, hand: Hand) -> &HandJoints {
        &self.joints[hand]
    }

    /// Whether a locate has ever succeeded for this hand.
    pub fn has_located(&self, hand: Hand) -> bool {
        self.located[hand]
    }

    /// Overwrite each tracked hand's joints with locations at `display_time`.
    /// A failed locate keeps the previous array.
    pub fn locate(&mut self, display_time: Time) {
        let Some(source) = self.source.as_ref() else {
            return;
        };
        for hand in Hand::ALL {
            if !source.has_tracker(hand) {
                continue;
            }
            match source.locate_joints(hand, display_time) {
                Ok(joints) => {
                    self.joints[hand] = joints;
                    self.located[hand] = true;
                }
                Err(err) => warn!(hand = hand.user_path(), "hand joints locate failed: {err}"),
            }
        }
    }
}
