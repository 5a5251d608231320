// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use tracing::info;
use tri_core::{RenderError, RenderResult, Stage, StageExt};
use tri_render::RenderSize;

use crate::driver::{Driver, ImageSharing, SwapchainPlan};
use crate::probe::{swap_chain_details, QueueFamilies, SwapChainDetails};

/// Surfaces report this width when the swapchain extent follows the window.
const EXTENT_MATCHES_WINDOW: u32 = u32::MAX;

/// Preferred 8-bit sRGB pair, else the first reported pair.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
}

/// MAILBOX (replace pending images), else FIFO, else the first reported mode.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> Option<vk::PresentModeKHR> {
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO]
        .into_iter()
        .find(|m| modes.contains(m))
        .or_else(|| modes.first().copied())
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != EXTENT_MATCHES_WINDOW {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: window
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: window
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped by the maximum (0 == no maximum).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        want
    } else {
        want.min(caps.max_image_count)
    }
}

pub fn image_sharing(families: &QueueFamilies) -> ImageSharing {
    if families.shared() {
        ImageSharing::Exclusive
    } else {
        ImageSharing::Concurrent([families.graphics, families.present])
    }
}

/// Derives the creation plan from probed surface details.
pub fn plan_swapchain(
    details: &SwapChainDetails,
    surface: vk::SurfaceKHR,
    families: &QueueFamilies,
    window: RenderSize,
) -> RenderResult<SwapchainPlan> {
    let format = choose_surface_format(&details.formats)
        .ok_or_else(|| RenderError::new(Stage::Swapchain, "surface reports no formats"))?;
    let present_mode = choose_present_mode(&details.present_modes)
        .ok_or_else(|| RenderError::new(Stage::Swapchain, "surface reports no present modes"))?;
    let caps = &details.capabilities;

    Ok(SwapchainPlan {
        surface,
        min_image_count: choose_image_count(caps),
        format,
        extent: choose_extent(caps, window),
        present_mode,
        sharing: image_sharing(families),
        pre_transform: caps.current_transform,
    })
}

/// Swapchain plus its per-image views and framebuffers.
///
/// `images` belong to the driver; `image_views` and `framebuffers` are ours
/// and always have the same length as `images` once framebuffers exist.
pub struct PresentationChain {
    pub swapchain: vk::SwapchainKHR,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
}

impl PresentationChain {
    /// Creates the swapchain and one color view per image. Framebuffers need
    /// the render pass and are added by [`PresentationChain::create_framebuffers`].
    pub fn create<D: Driver + ?Sized>(
        driver: &mut D,
        phys: vk::PhysicalDevice,
        families: &QueueFamilies,
        window: RenderSize,
    ) -> RenderResult<Self> {
        let surface = driver.surface();
        let details = swap_chain_details(driver, phys, surface).stage(Stage::Swapchain)?;
        let plan = plan_swapchain(&details, surface, families, window)?;

        let swapchain = driver.create_swapchain(&plan).stage(Stage::Swapchain)?;
        let images = driver.swapchain_images(swapchain).stage(Stage::Swapchain)?;

        info!(
            "swapchain: {:?}/{:?}, {:?}, {}x{}, images(requested={} → got={})",
            plan.format.format,
            plan.format.color_space,
            plan.present_mode,
            plan.extent.width,
            plan.extent.height,
            plan.min_image_count,
            images.len()
        );

        let mut chain = PresentationChain {
            swapchain,
            format: plan.format,
            present_mode: plan.present_mode,
            extent: plan.extent,
            image_views: Vec::with_capacity(images.len()),
            images,
            framebuffers: Vec::new(),
        };
        for i in 0..chain.images.len() {
            match driver.create_image_view(chain.images[i], plan.format.format) {
                Ok(view) => chain.image_views.push(view),
                Err(e) => {
                    chain.destroy(driver);
                    return Err(e).stage(Stage::ImageView);
                }
            }
        }
        Ok(chain)
    }

    /// On failure the framebuffers made so far stay in `self.framebuffers`
    /// and are released by [`PresentationChain::destroy`].
    pub fn create_framebuffers<D: Driver + ?Sized>(
        &mut self,
        driver: &mut D,
        render_pass: vk::RenderPass,
    ) -> RenderResult<()> {
        for &view in &self.image_views {
            let fb = driver
                .create_framebuffer(render_pass, view, self.extent)
                .stage(Stage::Framebuffer)?;
            self.framebuffers.push(fb);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn destroy_framebuffers<D: Driver + ?Sized>(&mut self, driver: &mut D) {
        for fb in self.framebuffers.drain(..) {
            driver.destroy_framebuffer(fb);
        }
    }

    pub fn destroy<D: Driver + ?Sized>(&mut self, driver: &mut D) {
        self.destroy_framebuffers(driver);
        for view in self.image_views.drain(..) {
            driver.destroy_image_view(view);
        }
        self.images.clear();
        driver.destroy_swapchain(self.swapchain);
        self.swapchain = vk::SwapchainKHR::null();
    }
}
