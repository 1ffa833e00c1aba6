//! OpenXR runtime connection for grabxr.
//!
//! [`connect`] creates the instance, discovers the system, opens a session
//! bound to an OpenGL context and returns everything the core
//! [`Application`](grabxr_vr::Application) needs. Only the OpenGL backend over
//! GLX is built; every other graphics API reports `Unavailable`.

use grabxr_common::{AppConfig, GraphicsBackend};
use grabxr_vr::{Connection, XrError, XrResult};

pub mod actions;
pub mod common;
pub mod gl;
pub mod hand_tracking;
pub mod runtime;

#[cfg(target_os = "linux")]
pub mod glx;

pub use actions::OpenXrActions;
pub use gl::GlDevice;
pub use hand_tracking::{HandTrackingEntryPoints, OpenXrJoints};
pub use runtime::OpenXrRuntime;

/// Open an OpenXR session for `config`. Every error is fatal for startup.
pub fn connect(config: &AppConfig) -> XrResult<Connection<OpenXrRuntime, GlDevice>> {
    if !config.graphics_backend.is_valid_for_platform() {
        return Err(XrError::Unavailable(format!(
            "{} is not available on this platform",
            config.graphics_backend
        )));
    }
    if config.graphics_backend != GraphicsBackend::OpenGl {
        return Err(XrError::Unavailable(format!(
            "{} backend is not built, use {}",
            config.graphics_backend,
            GraphicsBackend::OpenGl
        )));
    }

    #[cfg(target_os = "linux")]
    return connect_glx(config);

    #[cfg(not(target_os = "linux"))]
    Err(XrError::Unavailable(
        "OpenGL sessions are only built for Linux/GLX".to_string(),
    ))
}

#[cfg(target_os = "linux")]
fn connect_glx(config: &AppConfig) -> XrResult<Connection<OpenXrRuntime, GlDevice>> {
    use openxr as xr;

    use crate::glx::GlxContext;

    let context = unsafe { GlxContext::new(&config.application_name)? };

    let entry = unsafe { xr::Entry::load() }
        .map_err(|e| XrError::Unavailable(format!("OpenXR load failed: {e:?}")))?;
    let available = entry
        .enumerate_extensions()
        .map_err(|e| XrError::setup(format!("OpenXR ext enumerate: {e:?}")))?;
    if !available.khr_opengl_enable {
        return Err(XrError::Unavailable(
            "OpenXR KHR_opengl_enable not available".to_string(),
        ));
    }

    let hand_tracking = config.hand_tracking && available.ext_hand_tracking;
    let mut exts = xr::ExtensionSet::default();
    exts.khr_opengl_enable = true;
    exts.ext_debug_utils = available.ext_debug_utils;
    exts.ext_hand_tracking = hand_tracking;
    exts.ext_hand_joints_motion_range = hand_tracking && available.ext_hand_joints_motion_range;

    let app_info = xr::ApplicationInfo {
        application_name: &config.application_name,
        application_version: 1,
        engine_name: &config.engine_name,
        engine_version: 1,
        api_version: xr::Version::new(1, 0, 0),
    };
    let instance = entry
        .create_instance(&app_info, &exts, &[])
        .map_err(|e| XrError::setup(format!("OpenXR create_instance: {e:?}")))?;
    let system = instance
        .system(xr::FormFactor::HEAD_MOUNTED_DISPLAY)
        .map_err(|e| XrError::Unavailable(format!("OpenXR system: {e:?}")))?;

    let info = runtime::discover_system(&instance, system, hand_tracking)?;
    log::info!(
        "OpenXR runtime '{}' {} on '{}'",
        info.runtime_name,
        info.runtime_version,
        info.system_name
    );

    let requirements = instance
        .graphics_requirements::<xr::OpenGL>(system)
        .map_err(|e| XrError::setup(format!("OpenXR OpenGL requirements: {e:?}")))?;
    log::info!(
        "OpenGL requirements: min {}.{} max {}.{}",
        requirements.min_api_version_supported.major(),
        requirements.min_api_version_supported.minor(),
        requirements.max_api_version_supported.major(),
        requirements.max_api_version_supported.minor()
    );

    let create_info = context.session_create_info();
    let device = GlDevice::with_glx(context)?;
    let (session, frame_waiter, frame_stream) = unsafe {
        instance
            .create_session::<xr::OpenGL>(system, &create_info)
            .map_err(|e| XrError::setup(format!("OpenXR create_session: {e:?}")))?
    };

    let actions = OpenXrActions::new(&instance, &session)?;
    let joints = if info.hand_tracking_supported {
        match HandTrackingEntryPoints::resolve(&instance) {
            Some(entry) => Some(OpenXrJoints::new(entry, &session)?),
            None => {
                log::warn!("hand tracking reported but entry points missing");
                None
            }
        }
    } else {
        None
    };

    let runtime = OpenXrRuntime::new(instance, session, frame_waiter, frame_stream, info)?;
    Ok(Connection {
        runtime,
        device,
        actions: Box::new(actions),
        joints: joints.map(|joints| Box::new(joints) as Box<dyn grabxr_vr::JointSource>),
        shaders: gl::SHADERS,
    })
}
