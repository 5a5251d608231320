// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tri_core::init_tracing;
use tri_platform::fixed_window_attributes;
use tri_render::{RenderSettings, RenderSize, Renderer, ValidationPolicy};
use tri_render_vk::VkRenderer;

use tri_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Draws one triangle with Vulkan", long_about = None)]
struct Args {
    /// TOML config file; a missing file means built-in defaults
    #[arg(long, default_value = "triangle.toml")]
    config: PathBuf,
    /// Overrides `render.validation` from the config file
    #[arg(long, value_enum)]
    validation: Option<ValidationCfg>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
enum ValidationCfg {
    Strict,
    #[default]
    Permissive,
    Off,
}

impl From<ValidationCfg> for ValidationPolicy {
    fn from(v: ValidationCfg) -> Self {
        match v {
            ValidationCfg::Strict => ValidationPolicy::Strict,
            ValidationCfg::Permissive => ValidationPolicy::Permissive,
            ValidationCfg::Off => ValidationPolicy::Off,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
struct WindowCfg {
    title: String,
    width: u32,
    height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: "Triangle".into(),
            width: 800,
            height: 600,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default, deny_unknown_fields)]
struct RenderCfg {
    clear_color: [f32; 4],
    validation: ValidationCfg,
    frames_in_flight: usize,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            validation: ValidationCfg::default(),
            frames_in_flight: 1,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
struct ShaderCfg {
    vertex: PathBuf,
    fragment: PathBuf,
}

impl Default for ShaderCfg {
    fn default() -> Self {
        ShaderCfg {
            vertex: "vert.spv".into(),
            fragment: "frag.spv".into(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
struct AppCfg {
    window: WindowCfg,
    render: RenderCfg,
    shaders: ShaderCfg,
}

impl AppCfg {
    fn render_settings(&self, validation: Option<ValidationCfg>) -> RenderSettings {
        RenderSettings {
            clear_color: self.render.clear_color,
            validation: validation.unwrap_or(self.render.validation).into(),
            frames_in_flight: self.render.frames_in_flight,
            vertex_shader: self.shaders.vertex.clone(),
            fragment_shader: self.shaders.fragment.clone(),
        }
    }
}

fn parse_cfg(text: &str) -> Result<AppCfg> {
    Ok(toml::from_str(text)?)
}

fn load_cfg(path: &Path) -> Result<AppCfg> {
    match fs::read_to_string(path) {
        Ok(text) => parse_cfg(&text).with_context(|| format!("invalid config {}", path.display())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("{} not found, using defaults", path.display());
            Ok(AppCfg::default())
        }
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

struct App {
    cfg: AppCfg,
    settings: RenderSettings,
    // Dropped before `window`: the surface must not outlive it.
    renderer: Option<VkRenderer>,
    window: Option<Window>,
    error: Option<anyhow::Error>,
}

impl App {
    fn new(cfg: AppCfg, settings: RenderSettings) -> Self {
        App {
            cfg,
            settings,
            renderer: None,
            window: None,
            error: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let w = &self.cfg.window;
        let window = event_loop
            .create_window(fixed_window_attributes(&w.title, w.width, w.height))
            .context("failed to create window")?;

        let size = window.inner_size();
        let render_size = RenderSize {
            width: size.width.max(1),
            height: size.height.max(1),
        };
        let renderer = VkRenderer::new(&window, &window, render_size, &self.settings)?;
        info!(
            "window {}x{}, validation {:?}",
            render_size.width, render_size.height, self.settings.validation
        );

        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        self.error = Some(e);
        self.shutdown(event_loop);
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.error.is_some() {
            return;
        }
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        match &self.window {
            Some(window) if window.id() == window_id => {}
            _ => return,
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("close requested");
                self.shutdown(event_loop);
            }
            WindowEvent::RedrawRequested => {
                let drawn = match &mut self.renderer {
                    Some(renderer) => renderer.render(),
                    None => Ok(()),
                };
                if let Err(e) = drawn {
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let cfg = load_cfg(&args.config)?;
    let settings = cfg.render_settings(args.validation);

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(cfg, settings);
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn main() -> ExitCode {
    init_tracing();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
