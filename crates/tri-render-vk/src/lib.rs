// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Vulkan backend that draws one hardcoded triangle.

mod ash_driver;
mod device;
mod driver;
mod frame;
mod instance;
#[cfg(test)]
mod mock;
mod pipeline;
mod probe;
mod shader;
mod swapchain;

use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info, warn};
use tri_core::RenderResult;
use tri_render::{RenderSettings, RenderSize, Renderer};

pub use ash_driver::AshDriver;
pub use driver::Driver;
pub use shader::{load_spirv, ShaderCode};

use device::{create_logical_device, Queues};
use frame::FrameLoop;
use pipeline::GraphicsPipeline;
use probe::pick_physical_device;
use swapchain::PresentationChain;

/// Owns every per-device object. Field order matters only for `driver`,
/// which must outlive everything else and so is released last.
pub struct TriangleRenderer<D: Driver> {
    frames: FrameLoop,
    pipeline: GraphicsPipeline,
    chain: PresentationChain,
    queues: Queues,
    clear_color: [f32; 4],
    frame_count: u64,
    released: bool,
    driver: D,
}

pub type VkRenderer = TriangleRenderer<AshDriver>;

/// Everything `build` creates on top of the driver.
struct Parts {
    queues: Queues,
    chain: PresentationChain,
    pipeline: GraphicsPipeline,
    frames: FrameLoop,
}

/// Device selection through frame-slot creation. Any failure aborts;
/// objects created before the failing step are released again.
fn assemble<D: Driver>(
    driver: &mut D,
    size: RenderSize,
    settings: &RenderSettings,
    shaders: &ShaderCode,
) -> RenderResult<Parts> {
    let surface = driver.surface();
    let (phys, families) = pick_physical_device(&*driver, surface)?;
    let queues = create_logical_device(driver, phys, families)?;

    let mut chain = PresentationChain::create(driver, phys, &families, size)?;
    let mut pipeline = match GraphicsPipeline::create(driver, chain.format.format, shaders) {
        Ok(p) => p,
        Err(e) => {
            chain.destroy(driver);
            return Err(e);
        }
    };

    let frames = chain
        .create_framebuffers(driver, pipeline.render_pass)
        .and_then(|()| FrameLoop::new(driver, queues.families.graphics, settings.frame_slots()));
    match frames {
        Ok(frames) => Ok(Parts {
            queues,
            chain,
            pipeline,
            frames,
        }),
        Err(e) => {
            chain.destroy_framebuffers(driver);
            pipeline.destroy(driver);
            chain.destroy(driver);
            Err(e)
        }
    }
}

impl<D: Driver> TriangleRenderer<D> {
    pub fn build(
        mut driver: D,
        size: RenderSize,
        settings: &RenderSettings,
        shaders: &ShaderCode,
    ) -> RenderResult<Self> {
        let Parts {
            queues,
            chain,
            pipeline,
            frames,
        } = assemble(&mut driver, size, settings, shaders)?;

        info!(
            "renderer ready: {:?}, {} swapchain image(s), {} frame slot(s)",
            chain.present_mode,
            chain.len(),
            frames.slot_count()
        );

        Ok(TriangleRenderer {
            frames,
            pipeline,
            chain,
            queues,
            clear_color: settings.clear_color,
            frame_count: 0,
            released: false,
            driver,
        })
    }

    pub fn draw_frame(&mut self) -> RenderResult<()> {
        self.frames.draw_frame(
            &mut self.driver,
            &self.queues,
            &self.chain,
            &self.pipeline,
            self.clear_color,
        )?;
        if self.frame_count == 0 {
            debug!("first frame presented");
        }
        self.frame_count += 1;
        Ok(())
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear_color = rgba;
    }

    /// Waits for the device, then destroys everything in reverse creation
    /// order. Runs once; `Drop` calls it too.
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Err(e) = self.driver.wait_idle() {
            warn!("device_wait_idle before teardown failed: {e}");
        }
        self.frames.destroy(&mut self.driver);
        self.chain.destroy_framebuffers(&mut self.driver);
        self.pipeline.destroy(&mut self.driver);
        self.chain.destroy(&mut self.driver);
        info!("renderer released after {} frame(s)", self.frame_count);
    }
}

impl<D: Driver> Drop for TriangleRenderer<D> {
    fn drop(&mut self) {
        self.release();
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
    ) -> Result<Self> {
        let shaders = ShaderCode::load(&settings.vertex_shader, &settings.fragment_shader)?;
        let driver = AshDriver::new(window, display, settings.validation)?;
        Ok(TriangleRenderer::build(driver, size, settings, &shaders)?)
    }

    fn render(&mut self) -> Result<()> {
        Ok(self.draw_frame()?)
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        TriangleRenderer::set_clear_color(self, rgba);
    }
}
