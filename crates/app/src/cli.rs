//! Command-line interface for glance3d.

use std::path::PathBuf;

use clap::Parser;
use corelib::config::DEFAULT_ENV_MAP;
use corelib::{AssetPolicy, SceneConfig};
use wgpu::Backends;

#[derive(Parser, Debug)]
#[command(name = "glance3d")]
#[command(about = "A face model that turns to follow the pointer", long_about = None)]
#[command(version)]
pub struct Cli {
    /// glTF / GLB model to load
    #[arg(long, value_name = "PATH", default_value = "assets/model.glb")]
    pub model: PathBuf,

    /// Equirectangular HDR environment map: local path or http(s) URL
    #[arg(long, value_name = "PATH|URL", default_value = DEFAULT_ENV_MAP)]
    pub env_map: String,

    /// Name of the node that follows the pointer
    #[arg(long, value_name = "NAME", default_value = "face")]
    pub node: String,

    /// What to do when the model, the node or the model camera is missing
    #[arg(long, value_name = "degrade|strict", default_value_t = AssetPolicy::Degrade)]
    pub asset_policy: AssetPolicy,

    /// GPU backend: auto, vulkan, dx12, metal or gl
    #[arg(long, value_name = "BACKEND", default_value = "auto", value_parser = parse_backend)]
    pub gpu_backend: Backends,

    /// Initial window size
    #[arg(long, value_name = "WxH", default_value = "1280x720", value_parser = parse_size)]
    pub size: (u32, u32),

    /// Hide the marker drawn at the point light
    #[arg(long)]
    pub no_light_helper: bool,

    /// Verbosity level (can be repeated for more detail)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    /// Default log filter for the chosen verbosity.
    pub fn log_filter(&self) -> log::LevelFilter {
        if self.quiet {
            return log::LevelFilter::Error;
        }
        match self.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }

    /// Defaults with the CLI overrides applied.
    pub fn scene_config(&self) -> SceneConfig {
        SceneConfig {
            model_path: self.model.clone(),
            env_map: self.env_map.clone(),
            node_name: self.node.clone(),
            asset_policy: self.asset_policy,
            light_helper: !self.no_light_helper,
            ..SceneConfig::default()
        }
    }
}

pub fn parse_backend(s: &str) -> Result<Backends, String> {
    match s.to_ascii_lowercase().as_str() {
        "auto" => Ok(Backends::all()),
        "vulkan" | "vk" => Ok(Backends::VULKAN),
        "dx12" | "d3d12" => Ok(Backends::DX12),
        "metal" | "mtl" => Ok(Backends::METAL),
        "gl" | "opengl" | "gles" => Ok(Backends::GL),
        other => Err(format!(
            "unknown backend '{other}' (expected auto|vulkan|dx12|metal|gl)"
        )),
    }
}

/// Parse `WxH` (either case of `x`); both sides must be non-zero.
pub fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once('x')
        .or_else(|| s.split_once('X'))
        .ok_or_else(|| format!("expected WxH, got '{s}'"))?;
    let w: u32 = w.trim().parse().map_err(|e| format!("bad width '{w}': {e}"))?;
    let h: u32 = h.trim().parse().map_err(|e| format!("bad height '{h}': {e}"))?;
    if w == 0 || h == 0 {
        return Err(format!("window size must be non-zero, got {w}x{h}"));
    }
    Ok((w, h))
}
