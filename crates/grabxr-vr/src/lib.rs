//! Head-mounted-display application core: session lifecycle, per-frame input
//! synchronization, block grab interaction and stereo frame submission.
//!
//! The runtime and the GPU are reached only through the traits in
//! [`runtime`] and [`graphics`]; `grabxr-vr-openxr` supplies the real ones.

#![forbid(unsafe_code)]

pub mod app;
pub mod events;
pub mod frame;
pub mod graphics;
pub mod hand_tracking;
pub mod input;
pub mod interaction;
pub mod lifecycle;
pub mod math;
pub mod platform;
pub mod render;
pub mod runtime;
pub mod scene;
pub mod swapchain;
pub mod types;

#[cfg(test)]
mod testing;

pub use app::{Application, Connection};
pub use grabxr_common::{BlendMode, GraphicsBackend};
pub use graphics::GraphicsDevice;
pub use lifecycle::SessionLifecycle;
pub use math::{Fov, Pose};
pub use runtime::{ActionSource, JointSource, SessionControl, XrRuntime};
pub use types::{Block, Hand, PerHand, SessionState, Time};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum XrError {
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("setup failed: {0}")]
    Setup(String),
    #[error("stereo views differ in size: {left_width}x{left_height} vs {right_width}x{right_height}")]
    ViewSizeMismatch {
        left_width: u32,
        left_height: u32,
        right_width: u32,
        right_height: u32,
    },
    #[error("no interaction profile accepted the suggested bindings")]
    NoBindings,
    #[error("action sync failed: {0}")]
    ActionSync(String),
    #[error("runtime call failed: {0}")]
    Runtime(String),
    #[error("graphics device error: {0}")]
    Graphics(String),
}

impl XrError {
    pub fn setup(msg: impl std::fmt::Display) -> Self {
        Self::Setup(msg.to_string())
    }

    pub fn runtime(msg: impl std::fmt::Display) -> Self {
        Self::Runtime(msg.to_string())
    }

    pub fn graphics(msg: impl std::fmt::Display) -> Self {
        Self::Graphics(msg.to_string())
    }

    /// Errors that mean the environment can never work and startup must stop.
    pub fn is_fatal_setup(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::Setup(_) | Self::ViewSizeMismatch { .. } | Self::NoBindings
        )
    }
}

pub type XrResult<T> = Result<T, XrError>;
