//! grabxr: grab, carry and drop blocks on an OpenXR headset.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use grabxr_common::{AppConfig, BlendMode, GraphicsBackend};
use grabxr_vr::platform::{SystemEvent, SystemEventSender};
use grabxr_vr::Application;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "grabxr")]
#[command(about = "Block grab scene for OpenXR headsets")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to the OpenXR runtime and run until the session exits
    Run(ConfigArgs),

    /// Print the effective configuration as JSON
    Config(ConfigArgs),

    /// Show version information
    Version,
}

#[derive(clap::Args, Debug, Default)]
struct ConfigArgs {
    /// JSON configuration file
    #[arg(short, long, env = "GRABXR_CONFIG")]
    config: Option<PathBuf>,

    /// Graphics API (opengl, vulkan, d3d11, d3d12, opengl_es)
    #[arg(long, env = "GRABXR_BACKEND")]
    backend: Option<GraphicsBackend>,

    /// Blend mode preference, first supported wins (comma separated)
    #[arg(long = "blend-mode", env = "GRABXR_BLEND_MODES", value_delimiter = ',')]
    blend_modes: Vec<BlendMode>,

    /// Height of the LOCAL space origin above the floor, in metres
    #[arg(long, env = "GRABXR_VIEW_HEIGHT")]
    view_height: Option<f32>,

    /// Blocks along each axis of the grid
    #[arg(long, env = "GRABXR_BLOCKS_PER_AXIS")]
    blocks_per_axis: Option<u32>,

    /// Seed for block colours
    #[arg(long, env = "GRABXR_SEED")]
    seed: Option<u64>,

    /// Do not request hand tracking
    #[arg(long, env = "GRABXR_NO_HAND_TRACKING")]
    no_hand_tracking: bool,
}

impl ConfigArgs {
    /// File values (or defaults), then flag overrides, then validation.
    fn load(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => AppConfig::default(),
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, config: &mut AppConfig) {
        if let Some(backend) = self.backend {
            config.graphics_backend = backend;
        }
        if !self.blend_modes.is_empty() {
            config.blend_modes = self.blend_modes.clone();
        }
        if let Some(height) = self.view_height {
            config.view_height_m = height;
        }
        if let Some(per_axis) = self.blocks_per_axis {
            config.blocks.per_axis = per_axis;
        }
        if let Some(seed) = self.seed {
            config.blocks.colour_seed = Some(seed);
        }
        if self.no_hand_tracking {
            config.hand_tracking = false;
        }
    }
}

fn main() -> Result<()> {
    grabxr_common::init_tracing();

    let args = Args::parse();

    match args.command {
        Command::Run(opts) => {
            let config = opts.load()?;
            if let Err(err) = run(&config) {
                error!("grabxr stopped: {err:#}");
                return Err(err);
            }
        }
        Command::Config(opts) => {
            let config = opts.load()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Command::Version => {
            println!("grabxr {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn run(config: &AppConfig) -> Result<()> {
    let connection =
        grabxr_vr_openxr::connect(config).context("connecting to the OpenXR runtime")?;
    let mut app = Application::new(connection, config).context("setting up the scene")?;
    forward_ctrl_c(app.system_events())?;
    app.run().context("main loop")?;
    info!("session ended");
    Ok(())
}

/// Turn Ctrl-C into a destroy request drained by the main loop.
fn forward_ctrl_c(events: SystemEventSender) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    std::thread::Builder::new()
        .name("grabxr-signals".to_string())
        .spawn(move || {
            rt.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("ctrl-c received, shutting down");
                    events.send(SystemEvent::DestroyRequested);
                }
            })
        })?;
    Ok(())
}
