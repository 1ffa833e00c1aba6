use openxr as xr;

use grabxr_vr::runtime::ActionSource;
use grabxr_vr::types::{ActionState, Hand, HapticPulse, SpaceLocation, Time};
use grabxr_vr::{PerHand, XrError, XrResult};

use crate::common::{local_space, location_validity, to_pose, to_xr_time};

const SIMPLE_CONTROLLER: &str = "/interaction_profiles/khr/simple_controller";
const TOUCH_CONTROLLER: &str = "/interaction_profiles/oculus/touch_controller";

/// Profiles the application suggests bindings for, in suggestion order.
pub const INTERACTION_PROFILES: [&str; 2] = [SIMPLE_CONTROLLER, TOUCH_CONTROLLER];

/// Component paths bound per profile for the grab, grip and buzz actions.
pub fn binding_components(profile: &str) -> Option<[&'static str; 3]> {
    match profile {
        SIMPLE_CONTROLLER => Some(["input/select/click", "input/grip/pose", "output/haptic"]),
        TOUCH_CONTROLLER => Some(["input/squeeze/value", "input/grip/pose", "output/haptic"]),
        _ => None,
    }
}

/// The single action set: grab (float), grip (pose) and buzz (haptic), each
/// with left/right subaction paths.
pub struct OpenXrActions {
    session: xr::Session<xr::OpenGL>,
    action_set: xr::ActionSet,
    grab: xr::Action<f32>,
    grip: xr::Action<xr::Posef>,
    buzz: xr::Action<xr::Haptic>,
    hand_paths: PerHand<xr::Path>,
    grip_spaces: PerHand<xr::Space>,
    space: xr::Space,
}

impl OpenXrActions {
    /// Create the actions, suggest bindings and attach the set to the session.
    /// Fails with [`XrError::NoBindings`] when every profile is rejected.
    pub fn new(instance: &xr::Instance, session: &xr::Session<xr::OpenGL>) -> XrResult<Self> {
        let action_set = instance
            .create_action_set("grabxr", "GrabXR", 0)
            .map_err(|e| XrError::setup(format!("OpenXR action set: {e:?}")))?;

        let left = instance
            .string_to_path(Hand::Left.user_path())
            .map_err(|e| XrError::setup(format!("OpenXR path left: {e:?}")))?;
        let right = instance
            .string_to_path(Hand::Right.user_path())
            .map_err(|e| XrError::setup(format!("OpenXR path right: {e:?}")))?;
        let subaction_paths = [left, right];

        let grab = action_set
            .create_action::<f32>("grab_object", "Grab Object", &subaction_paths)
            .map_err(|e| XrError::setup(format!("OpenXR action grab_object: {e:?}")))?;
        let grip = action_set
            .create_action::<xr::Posef>("grip_pose", "Grip Pose", &subaction_paths)
            .map_err(|e| XrError::setup(format!("OpenXR action grip_pose: {e:?}")))?;
        let buzz = action_set
            .create_action::<xr::Haptic>("buzz", "Buzz", &subaction_paths)
            .map_err(|e| XrError::setup(format!("OpenXR action buzz: {e:?}")))?;

        let mut accepted = 0;
        for profile in INTERACTION_PROFILES {
            let profile_path = instance
                .string_to_path(profile)
                .map_err(|e| XrError::setup(format!("OpenXR profile path: {e:?}")))?;
            let bindings = Self::bindings_for_profile(instance, profile, &grab, &grip, &buzz);
            match instance.suggest_interaction_profile_bindings(profile_path, &bindings) {
                Ok(()) => {
                    log::info!("bindings accepted for {profile}");
                    accepted += 1;
                }
                Err(err) => {
                    log::warn!("OpenXR binding suggestion rejected for {profile}: {err:?}");
                }
            }
        }
        if accepted == 0 {
            return Err(XrError::NoBindings);
        }

        session
            .attach_action_sets(&[&action_set])
            .map_err(|e| XrError::setup(format!("OpenXR attach actions: {e:?}")))?;

        let grip_space = |path| {
            grip.create_space(session, path, xr::Posef::IDENTITY)
                .map_err(|e| XrError::setup(format!("OpenXR grip space: {e:?}")))
        };
        let grip_spaces = PerHand::new(grip_space(left)?, grip_space(right)?);
        let space = local_space(session)?;

        Ok(Self {
            session: session.clone(),
            action_set,
            grab,
            grip,
            buzz,
            hand_paths: PerHand::new(left, right),
            grip_spaces,
            space,
        })
    }

    fn bindings_for_profile<'a>(
        instance: &xr::Instance,
        profile: &str,
        grab: &'a xr::Action<f32>,
        grip: &'a xr::Action<xr::Posef>,
        buzz: &'a xr::Action<xr::Haptic>,
    ) -> Vec<xr::Binding<'a>> {
        let mut bindings = Vec::with_capacity(6);
        let Some([grab_component, grip_component, buzz_component]) = binding_components(profile)
        else {
            return bindings;
        };

        macro_rules! bind {
            ($action:expr, $component:expr) => {
                for hand in Hand::ALL {
                    let path = format!("{}/{}", hand.user_path(), $component);
                    if let Ok(path) = instance.string_to_path(&path) {
                        bindings.push(xr::Binding::new($action, path));
                    }
                }
            };
        }

        bind!(grab, grab_component);
        bind!(grip, grip_component);
        bind!(buzz, buzz_component);
        bindings
    }
}

impl ActionSource for OpenXrActions {
    fn sync(&mut self) -> XrResult<()> {
        self.session
            .sync_actions(&[xr::ActiveActionSet::new(&self.action_set)])
            .map_err(|e| XrError::ActionSync(format!("{e:?}")))
    }

    fn grip_active(&self, hand: Hand) -> XrResult<bool> {
        self.grip
            .is_active(&self.session, self.hand_paths[hand])
            .map_err(|e| XrError::runtime(format!("grip state {hand:?}: {e:?}")))
    }

    fn locate_grip(&self, hand: Hand, time: Time) -> XrResult<SpaceLocation> {
        let location = self.grip_spaces[hand]
            .locate(&self.space, to_xr_time(time))
            .map_err(|e| XrError::runtime(format!("locate grip {hand:?}: {e:?}")))?;
        let (position_valid, orientation_valid) = location_validity(location.location_flags);
        Ok(SpaceLocation {
            pose: to_pose(location.pose),
            position_valid,
            orientation_valid,
        })
    }

    fn grab_state(&self, hand: Hand) -> XrResult<ActionState<f32>> {
        let state = self
            .grab
            .state(&self.session, self.hand_paths[hand])
            .map_err(|e| XrError::runtime(format!("grab state {hand:?}: {e:?}")))?;
        Ok(ActionState {
            current_state: state.current_state,
            is_active: state.is_active,
        })
    }

    fn apply_haptic(&mut self, hand: Hand, pulse: HapticPulse) -> XrResult<()> {
        let vibration = xr::HapticVibration::new()
            .amplitude(pulse.amplitude)
            .duration(xr::Duration::MIN_HAPTIC)
            .frequency(xr::FREQUENCY_UNSPECIFIED);
        self.buzz
            .apply_feedback(&self.session, self.hand_paths[hand], &vibration)
            .map_err(|e| XrError::runtime(format!("haptic {hand:?}: {e:?}")))
    }
}
