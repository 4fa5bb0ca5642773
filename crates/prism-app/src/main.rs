// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::{Context, Result};
use clap::Parser;
use prism_core::init_tracing;
use prism_platform::{PlatformWindow, WindowConfig};
use prism_render::{run, EventPump};
use prism_render_vk::{
    RenderSettings, VkPolygonMode, VkRenderer, DEFAULT_FRAGMENT_SHADER, DEFAULT_FRAMES_IN_FLIGHT,
    DEFAULT_VERTEX_SHADER,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{info, warn};

use serde::Deserialize;

const CONFIG_FILE: &str = "prism.toml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
struct WindowCfg {
    width: u32,
    height: u32,
    title: String,
    resizable: bool,
}

impl Default for WindowCfg {
    fn default() -> Self {
        let w = WindowConfig::default();
        WindowCfg {
            width: w.width,
            height: w.height,
            title: w.title,
            resizable: w.resizable,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum PolygonModeCfg {
    #[default]
    Fill,
    Wireframe,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
struct RenderCfg {
    frames_in_flight: usize,
    vertex_shader: PathBuf,
    fragment_shader: PathBuf,
    acquire_timeout_ms: u64,
    validation: bool,
    polygon_mode: PolygonModeCfg,
    clear_color: [f32; 4],
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            vertex_shader: PathBuf::from(DEFAULT_VERTEX_SHADER),
            fragment_shader: PathBuf::from(DEFAULT_FRAGMENT_SHADER),
            acquire_timeout_ms: 2000,
            validation: cfg!(debug_assertions),
            polygon_mode: PolygonModeCfg::Fill,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct AppCfg {
    #[serde(default)]
    window: WindowCfg,
    #[serde(default)]
    render: RenderCfg,
}

impl AppCfg {
    fn window_config(&self) -> WindowConfig {
        WindowConfig {
            title: self.window.title.clone(),
            width: self.window.width,
            height: self.window.height,
            resizable: self.window.resizable,
        }
    }

    fn render_settings(&self) -> RenderSettings {
        let r = &self.render;
        RenderSettings {
            app_name: self.window.title.clone(),
            frames_in_flight: r.frames_in_flight.max(1),
            vertex_shader: r.vertex_shader.clone(),
            fragment_shader: r.fragment_shader.clone(),
            acquire_timeout: Duration::from_millis(r.acquire_timeout_ms),
            validation: r.validation,
            polygon_mode: match r.polygon_mode {
                PolygonModeCfg::Fill => VkPolygonMode::Fill,
                PolygonModeCfg::Wireframe => VkPolygonMode::Wireframe,
            },
            clear_color: r.clear_color,
        }
    }
}

fn parse_cfg(text: &str) -> Result<AppCfg> {
    Ok(toml::from_str::<AppCfg>(text)?)
}

fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => parse_cfg(&s).unwrap_or_else(|e| {
            warn!("ignoring {}: {e}", path.display());
            AppCfg::default()
        }),
        Err(_) => AppCfg::default(),
    }
}

fn run_app() -> Result<()> {
    let cfg = load_cfg(Path::new(CONFIG_FILE));
    info!("config: {:?}", cfg);

    let mut window = PlatformWindow::open(cfg.window_config())?;
    let size = window.framebuffer_size();

    // SAFETY: the renderer is dropped at the end of this scope, before the window.
    let mut renderer = unsafe { VkRenderer::create(&window, size, cfg.render_settings()) }
        .context("initializing the vulkan renderer")?;
    info!("rendering on {}", renderer.backend().device_name());

    let stats = run(&mut renderer, &mut window)?;
    info!(
        "exiting after {} iterations ({} frames)",
        stats.iterations,
        renderer.frame_counter()
    );

    drop(renderer);
    Ok(())
}

fn main() -> ExitCode {
    init_tracing();
    let _args = Args::parse();

    match run_app() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = parse_cfg("").unwrap();
        assert_eq!((cfg.window.width, cfg.window.height), (512, 512));
        assert!(!cfg.window.resizable);
        assert_eq!(cfg.render.frames_in_flight, 2);
        assert_eq!(cfg.render.vertex_shader, PathBuf::from(DEFAULT_VERTEX_SHADER));
        assert!(cfg.render.fragment_shader.ends_with("triangle.frag.spv"));
        assert_eq!(cfg.render.polygon_mode, PolygonModeCfg::Fill);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = parse_cfg(
            r#"
            [window]
            title = "tri"

            [render]
            frames_in_flight = 0
            polygon_mode = "wireframe"
            acquire_timeout_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(cfg.window.title, "tri");
        assert_eq!(cfg.window.width, 512);

        let settings = cfg.render_settings();
        assert_eq!(settings.frames_in_flight, 1);
        assert_eq!(settings.polygon_mode, VkPolygonMode::Wireframe);
        assert_eq!(settings.acquire_timeout, Duration::from_millis(250));
        assert_eq!(settings.app_name, "tri");
    }

    #[test]
    fn malformed_config_is_rejected() {
        assert!(parse_cfg("[render]\nframes_in_flight = \"two\"").is_err());
    }

    #[test]
    fn missing_config_file_falls_back() {
        let cfg = load_cfg(Path::new("no/such/prism.toml"));
        assert_eq!(cfg.render.acquire_timeout_ms, 2000);
    }
}
