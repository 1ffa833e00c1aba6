use tracing::{debug, warn};

use crate::runtime::ActionSource;
use crate::types::{Hand, HandInputState, HapticPulse, PerHand, Time};
use crate::{XrError, XrResult};

/// Amplitudes below this are sent as silence.
pub const HAPTIC_CUTOFF: f32 = 0.01;

/// Next haptic amplitude after one sync: halved, then flushed to zero once it
/// drops under [`HAPTIC_CUTOFF`].
pub fn decay_haptic(amplitude: f32) -> f32 {
    let next = amplitude * 0.5;
    if next < HAPTIC_CUTOFF {
        0.0
    } else {
        next
    }
}

/// Per-frame controller input for both hands.
pub struct ActionInputSystem {
    source: Box<dyn ActionSource>,
    hands: PerHand<HandInputState>,
}

impl ActionInputSystem {
    pub fn new(source: Box<dyn ActionSource>) -> Self {
        Self {
            source,
            hands: PerHand::default(),
        }
    }

    pub fn hand(&self, hand: Hand) -> &HandInputState {
        &self.hands[hand]
    }

    pub fn hands(&self) -> &PerHand<HandInputState> {
        &self.hands
    }

    pub fn hands_mut(&mut self) -> &mut PerHand<HandInputState> {
        &mut self.hands
    }

    /// Sync the action set at `display_time` and refresh both hands.
    ///
    /// A failed action-set sync is returned as [`XrError::ActionSync`] and
    /// leaves every hand untouched. Failures of individual queries keep the
    /// previous value.
    pub fn sync(&mut self, display_time: Time) -> XrResult<()> {
        self.source
            .sync()
            .map_err(|err| XrError::ActionSync(err.to_string()))?;

        for hand in Hand::ALL {
            self.refresh_grip(hand, display_time);
        }
        for hand in Hand::ALL {
            self.refresh_grab_and_haptics(hand);
        }
        Ok(())
    }

    fn refresh_grip(&mut self, hand: Hand, display_time: Time) {
        let state = &mut self.hands[hand];
        match self.source.grip_active(hand) {
            Ok(active) => state.grip_active = active,
            Err(err) => warn!(hand = hand.user_path(), "grip state query failed: {err}"),
        }
        if !state.grip_active {
            return;
        }
        match self.source.locate_grip(hand, display_time) {
            Ok(location) if location.is_fully_valid() => state.grip_pose = location.pose,
            Ok(_) => debug!(hand = hand.user_path(), "grip pose not tracked, holding last"),
            Err(err) => warn!(hand = hand.user_path(), "grip locate failed: {err}"),
        }
    }

    fn refresh_grab_and_haptics(&mut self, hand: Hand) {
        let state = &mut self.hands[hand];
        match self.source.grab_state(hand) {
            Ok(grab) => state.grab = grab,
            Err(err) => warn!(hand = hand.user_path(), "grab state query failed: {err}"),
        }

        state.haptic_amplitude = decay_haptic(state.haptic_amplitude);
        let pulse = HapticPulse {
            amplitude: state.haptic_amplitude,
        };
        if let Err(err) = self.source.apply_haptic(hand, pulse) {
            warn!(hand = hand.user_path(), "haptic feedback failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Pose;
    use crate::testing::FakeActions;
    use crate::types::{ActionState, SpaceLocation};
    use glam::Vec3;

    fn tracked(position: Vec3) -> SpaceLocation {
        SpaceLocation {
            pose: Pose::from_position(position),
            position_valid: true,
            orientation_valid: true,
        }
    }

    #[test]
    fn test_haptic_decay_sequence() {
        let mut amplitude = 1.0;
        let mut seen = Vec::new();
        for _ in 0..8 {
            amplitude = decay_haptic(amplitude);
            seen.push(amplitude);
        }
        assert_eq!(
            seen,
            vec![0.5, 0.25, 0.125, 0.0625, 0.03125, 0.015625, 0.0, 0.0]
        );
    }

    #[test]
    fn test_sync_updates_pose_and_grab() {
        let (actions, script) = FakeActions::new();
        {
            let mut s = script.borrow_mut();
            s.grip[Hand::Left] = Some(tracked(Vec3::new(0.1, 0.2, 0.3)));
            s.grab[Hand::Left] = ActionState {
                current_state: 0.8,
                is_active: true,
            };
        }
        let mut input = ActionInputSystem::new(Box::new(actions));

        input.sync(Time::from_nanos(10)).unwrap();

        let left = input.hand(Hand::Left);
        assert!(left.grip_active);
        assert_eq!(left.grip_pose.position, Vec3::new(0.1, 0.2, 0.3));
        assert_eq!(left.grab.current_state, 0.8);
        assert!(!input.hand(Hand::Right).grip_active);
        assert_eq!(script.borrow().located_at, vec![Time::from_nanos(10)]);
    }

    #[test]
    fn test_invalid_locate_keeps_previous_pose() {
        let (actions, script) = FakeActions::new();
        script.borrow_mut().grip[Hand::Right] = Some(tracked(Vec3::new(1.0, 1.0, 1.0)));
        let mut input = ActionInputSystem::new(Box::new(actions));
        input.sync(Time::from_nanos(1)).unwrap();

        script.borrow_mut().grip[Hand::Right] = Some(SpaceLocation {
            pose: Pose::from_position(Vec3::new(9.0, 9.0, 9.0)),
            position_valid: true,
            orientation_valid: false,
        });
        input.sync(Time::from_nanos(2)).unwrap();

        assert_eq!(
            input.hand(Hand::Right).grip_pose.position,
            Vec3::new(1.0, 1.0, 1.0)
        );
    }

    #[test]
    fn test_haptic_issued_every_sync_including_zero() {
        let (actions, script) = FakeActions::new();
        let mut input = ActionInputSystem::new(Box::new(actions));
        input.hands_mut()[Hand::Left].haptic_amplitude = 1.0;

        input.sync(Time::from_nanos(1)).unwrap();
        input.sync(Time::from_nanos(2)).unwrap();

        let pulses = &script.borrow().haptics;
        assert_eq!(pulses.len(), 4);
        assert_eq!(pulses[0], (Hand::Left, 0.5));
        assert_eq!(pulses[1], (Hand::Right, 0.0));
        assert_eq!(pulses[2], (Hand::Left, 0.25));
        assert_eq!(pulses[3], (Hand::Right, 0.0));
    }

    #[test]
    fn test_sync_failure_leaves_state_untouched() {
        let (actions, script) = FakeActions::new();
        let mut input = ActionInputSystem::new(Box::new(actions));
        input.hands_mut()[Hand::Left].haptic_amplitude = 1.0;
        script.borrow_mut().fail_sync = true;

        let err = input.sync(Time::from_nanos(1)).unwrap_err();

        assert!(matches!(err, XrError::ActionSync(_)));
        assert_eq!(input.hand(Hand::Left).haptic_amplitude, 1.0);
        assert!(script.borrow().haptics.is_empty());
    }
}
