//! Pose and matrix helpers. All matrices are column-major and right-handed,
//! matching the runtime's conventions.

use glam::{Mat3, Mat4, Quat, Vec3};

use crate::GraphicsBackend;

/// Position plus orientation in some reference space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Pose {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
    };

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            orientation: Quat::IDENTITY,
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Field of view as four half-angles in radians. Left and down are negative
/// for a symmetric view.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Fov {
    pub angle_left: f32,
    pub angle_right: f32,
    pub angle_up: f32,
    pub angle_down: f32,
}

/// Clip-space convention of the backend the projection is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipSpace {
    /// Depth in [-1, 1], y up.
    OpenGl,
    /// Depth in [0, 1], y down.
    Vulkan,
    /// Depth in [0, 1], y up.
    Direct3d,
}

impl From<GraphicsBackend> for ClipSpace {
    fn from(backend: GraphicsBackend) -> Self {
        match backend {
            GraphicsBackend::OpenGl | GraphicsBackend::OpenGlEs => Self::OpenGl,
            GraphicsBackend::Vulkan => Self::Vulkan,
            GraphicsBackend::D3d11 | GraphicsBackend::D3d12 => Self::Direct3d,
        }
    }
}

/// Largest per-axis absolute difference.
pub fn chebyshev_distance(a: Vec3, b: Vec3) -> f32 {
    (a - b).abs().max_element()
}

/// Round each axis to the nearest grid point, `cells_per_unit` points per unit.
pub fn snap_to_grid(v: Vec3, cells_per_unit: f32) -> Vec3 {
    (v * cells_per_unit).round() / cells_per_unit
}

/// Model matrix: scale, then rotate, then translate.
pub fn translation_rotation_scale(pose: &Pose, scale: Vec3) -> Mat4 {
    Mat4::from_scale_rotation_translation(scale, pose.orientation, pose.position)
}

/// Inverse of a rotation+translation matrix without a general inverse.
pub fn invert_rigid_body(m: &Mat4) -> Mat4 {
    let rotation = Mat3::from_mat4(*m).transpose();
    let translation = -(rotation * m.w_axis.truncate());
    Mat4::from_cols(
        rotation.x_axis.extend(0.0),
        rotation.y_axis.extend(0.0),
        rotation.z_axis.extend(0.0),
        translation.extend(1.0),
    )
}

/// Asymmetric perspective projection from a runtime-reported field of view.
pub fn projection_fov(fov: &Fov, near_z: f32, far_z: f32, clip: ClipSpace) -> Mat4 {
    let tan_left = fov.angle_left.tan();
    let tan_right = fov.angle_right.tan();
    let tan_down = fov.angle_down.tan();
    let tan_up = fov.angle_up.tan();

    let tan_width = tan_right - tan_left;
    let tan_height = match clip {
        ClipSpace::Vulkan => tan_down - tan_up,
        _ => tan_up - tan_down,
    };
    let offset_z = match clip {
        ClipSpace::OpenGl => near_z,
        _ => 0.0,
    };

    Mat4::from_cols_array(&[
        2.0 / tan_width,
        0.0,
        0.0,
        0.0,
        0.0,
        2.0 / tan_height,
        0.0,
        0.0,
        (tan_right + tan_left) / tan_width,
        (tan_up + tan_down) / tan_height,
        -(far_z + offset_z) / (far_z - near_z),
        -1.0,
        0.0,
        0.0,
        -(far_z * (near_z + offset_z)) / (far_z - near_z),
        0.0,
    ])
}

/// Camera matrix for one eye: projection times the inverse eye pose.
pub fn view_projection(eye: &Pose, fov: &Fov, near_z: f32, far_z: f32, clip: ClipSpace) -> Mat4 {
    let proj = projection_fov(fov, near_z, far_z, clip);
    let to_view = translation_rotation_scale(eye, Vec3::ONE);
    proj * invert_rigid_body(&to_view)
}
