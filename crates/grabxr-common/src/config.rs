//! Application configuration.
//!
//! Values come from an optional JSON file and are then overridden by CLI
//! flags. Everything has a default, so an empty file (or none) is valid.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Graphics API used to back the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphicsBackend {
    #[serde(rename = "opengl")]
    OpenGl,
    #[serde(rename = "opengl_es")]
    OpenGlEs,
    Vulkan,
    D3d11,
    D3d12,
}

impl GraphicsBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenGl => "opengl",
            Self::OpenGlEs => "opengl_es",
            Self::Vulkan => "vulkan",
            Self::D3d11 => "d3d11",
            Self::D3d12 => "d3d12",
        }
    }

    /// Whether this API can exist at all on the target platform.
    pub fn is_valid_for_platform(&self) -> bool {
        match self {
            Self::D3d11 | Self::D3d12 => cfg!(target_os = "windows"),
            Self::OpenGl => cfg!(any(target_os = "windows", target_os = "linux")),
            Self::OpenGlEs => cfg!(target_os = "android"),
            Self::Vulkan => true,
        }
    }
}

impl Default for GraphicsBackend {
    fn default() -> Self {
        Self::OpenGl
    }
}

impl fmt::Display for GraphicsBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GraphicsBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "opengl" | "gl" => Ok(Self::OpenGl),
            "opengl_es" | "gles" => Ok(Self::OpenGlEs),
            "vulkan" | "vk" => Ok(Self::Vulkan),
            "d3d11" => Ok(Self::D3d11),
            "d3d12" => Ok(Self::D3d12),
            other => Err(Error::config(format!("unknown graphics backend '{other}'"))),
        }
    }
}

/// How rendered content is composited with the real world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    Opaque,
    Additive,
    AlphaBlend,
}

impl FromStr for BlendMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "opaque" => Ok(Self::Opaque),
            "additive" => Ok(Self::Additive),
            "alpha_blend" | "alpha" => Ok(Self::AlphaBlend),
            other => Err(Error::config(format!("unknown blend mode '{other}'"))),
        }
    }
}

/// Layout of the grabbable block grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockGridConfig {
    pub per_axis: u32,
    pub spacing: f32,
    pub centre: [f32; 3],
    pub size: f32,
    /// Seed for block colours; `None` picks a fresh seed per run.
    pub colour_seed: Option<u64>,
}

impl Default for BlockGridConfig {
    fn default() -> Self {
        Self {
            per_axis: 4,
            spacing: 0.2,
            centre: [0.0, -0.2, -0.7],
            size: 0.095,
            colour_seed: None,
        }
    }
}

impl BlockGridConfig {
    pub fn block_count(&self) -> usize {
        (self.per_axis as usize).pow(3)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub application_name: String,
    pub engine_name: String,
    pub graphics_backend: GraphicsBackend,
    /// Application preference order; the first one the runtime supports wins.
    pub blend_modes: Vec<BlendMode>,
    /// Offset from the LOCAL space origin down to the floor, in metres.
    pub view_height_m: f32,
    pub near_z: f32,
    pub far_z: f32,
    pub hand_tracking: bool,
    pub blocks: BlockGridConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            application_name: "grabxr".to_string(),
            engine_name: "grabxr-engine".to_string(),
            graphics_backend: GraphicsBackend::default(),
            blend_modes: vec![BlendMode::Opaque, BlendMode::Additive],
            view_height_m: 1.5,
            near_z: 0.05,
            far_z: 100.0,
            hand_tracking: true,
            blocks: BlockGridConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.application_name.trim().is_empty() {
            return Err(Error::config("application_name must not be empty"));
        }
        if self.blend_modes.is_empty() {
            return Err(Error::config("blend_modes must list at least one mode"));
        }
        if !(self.near_z > 0.0 && self.far_z > self.near_z) {
            return Err(Error::config(format!(
                "clip planes must satisfy 0 < near_z < far_z (got {} / {})",
                self.near_z, self.far_z
            )));
        }
        if self.blocks.per_axis == 0 {
            return Err(Error::config("blocks.per_axis must be at least 1"));
        }
        if self.blocks.size <= 0.0 || self.blocks.spacing <= 0.0 {
            return Err(Error::config("block size and spacing must be positive"));
        }
        Ok(())
    }
}
