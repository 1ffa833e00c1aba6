//! Hand-joint tracking through `XR_EXT_hand_tracking`.
//!
//! Joints are located with the unobstructed motion range when
//! `XR_EXT_hand_joints_motion_range` is enabled. The safe wrapper has no way
//! to chain that struct, so the locate call goes through the raw entry point.

use std::ffi::c_void;
use std::ptr;

use openxr as xr;

use grabxr_vr::runtime::JointSource;
use grabxr_vr::types::{Hand, HandJoints, JointLocation, Time, HAND_JOINT_COUNT};
use grabxr_vr::{PerHand, XrError, XrResult};

use crate::common::{local_space, location_validity, to_pose, to_xr_time};

/// Extension entry points, resolved once after instance creation.
#[derive(Clone, Copy)]
pub struct HandTrackingEntryPoints {
    table: xr::raw::HandTrackingEXT,
    motion_range: bool,
}

impl HandTrackingEntryPoints {
    /// `None` when the instance was created without the extension.
    pub fn resolve(instance: &xr::Instance) -> Option<Self> {
        let exts = instance.exts();
        let table = exts.ext_hand_tracking?;
        Some(Self {
            table,
            motion_range: exts.ext_hand_joints_motion_range.is_some(),
        })
    }
}

pub struct OpenXrJoints {
    entry: HandTrackingEntryPoints,
    trackers: PerHand<Option<xr::HandTracker>>,
    space: xr::Space,
}

impl OpenXrJoints {
    /// Create a tracker per hand. A hand whose tracker cannot be created is
    /// skipped rather than failing startup.
    pub fn new(
        entry: HandTrackingEntryPoints,
        session: &xr::Session<xr::OpenGL>,
    ) -> XrResult<Self> {
        let tracker = |hand: Hand, xr_hand| match session.create_hand_tracker(xr_hand) {
            Ok(tracker) => Some(tracker),
            Err(err) => {
                log::warn!("OpenXR create hand tracker {hand:?} failed: {err:?}");
                None
            }
        };
        let trackers = PerHand::new(
            tracker(Hand::Left, xr::Hand::LEFT),
            tracker(Hand::Right, xr::Hand::RIGHT),
        );
        if !entry.motion_range {
            log::info!("hand joints motion range unavailable, using runtime default");
        }
        Ok(Self {
            entry,
            trackers,
            space: local_space(session)?,
        })
    }
}

impl JointSource for OpenXrJoints {
    fn has_tracker(&self, hand: Hand) -> bool {
        self.trackers[hand].is_some()
    }

    fn locate_joints(&self, hand: Hand, time: Time) -> XrResult<HandJoints> {
        let tracker = self.trackers[hand]
            .as_ref()
            .ok_or_else(|| XrError::runtime(format!("no hand tracker for {hand:?}")))?;

        let motion_range = xr::sys::HandJointsMotionRangeInfoEXT {
            ty: xr::sys::HandJointsMotionRangeInfoEXT::TYPE,
            next: ptr::null(),
            hand_joints_motion_range: xr::sys::HandJointsMotionRangeEXT::UNOBSTRUCTED,
        };
        let locate_info = xr::sys::HandJointsLocateInfoEXT {
            ty: xr::sys::HandJointsLocateInfoEXT::TYPE,
            next: if self.entry.motion_range {
                &motion_range as *const _ as *const c_void
            } else {
                ptr::null()
            },
            base_space: self.space.as_raw(),
            time: to_xr_time(time),
        };
        let mut raw = [xr::sys::HandJointLocationEXT {
            location_flags: xr::SpaceLocationFlags::EMPTY,
            pose: xr::Posef::IDENTITY,
            radius: 0.0,
        }; HAND_JOINT_COUNT];
        let mut locations = xr::sys::HandJointLocationsEXT {
            ty: xr::sys::HandJointLocationsEXT::TYPE,
            next: ptr::null_mut(),
            is_active: false.into(),
            joint_count: HAND_JOINT_COUNT as u32,
            joint_locations: raw.as_mut_ptr(),
        };

        // SAFETY: both structs outlive the call, and `raw` holds exactly
        // `joint_count` elements.
        let result = unsafe {
            (self.entry.table.locate_hand_joints)(tracker.as_raw(), &locate_info, &mut locations)
        };
        if result.into_raw() < 0 {
            return Err(XrError::runtime(format!(
                "locate hand joints {hand:?}: {result:?}"
            )));
        }

        let mut joints = [JointLocation::default(); HAND_JOINT_COUNT];
        for (joint, location) in joints.iter_mut().zip(raw.iter()) {
            let (position_valid, orientation_valid) = location_validity(location.location_flags);
            *joint = JointLocation {
                pose: to_pose(location.pose),
                radius: location.radius,
                position_valid,
                orientation_valid,
            };
        }
        Ok(joints)
    }
}
