// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::path::PathBuf;

/// Upper bound for concurrently recorded frames.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

/// What to do when validation layers are missing from the loader.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ValidationPolicy {
    /// Abort instance creation.
    Strict,
    /// Warn and continue without validation.
    #[default]
    Permissive,
    /// Never request the layers.
    Off,
}

#[derive(Clone, Debug)]
pub struct RenderSettings {
    pub clear_color: [f32; 4],
    pub validation: ValidationPolicy,
    pub frames_in_flight: usize,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
}

impl Default for RenderSettings {
    fn default() -> Self {
        RenderSettings {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            validation: ValidationPolicy::default(),
            frames_in_flight: 1,
            vertex_shader: PathBuf::from("vert.spv"),
            fragment_shader: PathBuf::from("frag.spv"),
        }
    }
}

impl RenderSettings {
    /// Frame slot count, clamped into `1..=MAX_FRAMES_IN_FLIGHT`.
    pub fn frame_slots(&self) -> usize {
        self.frames_in_flight.clamp(1, MAX_FRAMES_IN_FLIGHT)
    }
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
    ) -> Result<Self>
    where
        Self: Sized;

    fn render(&mut self) -> Result<()>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);
}
