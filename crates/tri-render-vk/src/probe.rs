// SPDX-License-Identifier: CEPL-1.0
//! Answers "is physical device X usable for surface Y".

use std::ffi::CStr;

use ash::prelude::VkResult;
use ash::vk;
use tracing::{debug, info, warn};
use tri_core::{RenderError, RenderResult, Stage};

use crate::driver::Driver;

/// Device extensions every candidate must expose.
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Graphics and present family indices; `None` means not found yet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

/// Both families resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    pub fn resolved(&self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics?,
            present: self.present?,
        })
    }
}

impl QueueFamilies {
    pub fn shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices in ascending order.
    pub fn unique(&self) -> Vec<u32> {
        if self.shared() {
            vec![self.graphics]
        } else {
            let mut v = vec![self.graphics, self.present];
            v.sort_unstable();
            v
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SwapChainDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapChainDetails {
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Scans families in index order, taking the first graphics-capable one and,
/// independently, the first one that can present to `surface`.
pub fn queue_family_indices<D: Driver + ?Sized>(
    driver: &D,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> VkResult<QueueFamilyIndices> {
    let mut indices = QueueFamilyIndices::default();

    for (i, family) in driver.queue_families(phys).iter().enumerate() {
        let i = i as u32;
        if indices.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            indices.graphics = Some(i);
        }
        if indices.present.is_none() && driver.surface_support(phys, i, surface)? {
            indices.present = Some(i);
        }
        if indices.is_complete() {
            break;
        }
    }

    debug!(
        "queue families: graphics={:?} present={:?}",
        indices.graphics, indices.present
    );
    Ok(indices)
}

pub fn swap_chain_details<D: Driver + ?Sized>(
    driver: &D,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> VkResult<SwapChainDetails> {
    Ok(SwapChainDetails {
        capabilities: driver.surface_capabilities(phys, surface)?,
        formats: driver.surface_formats(phys, surface)?,
        present_modes: driver.present_modes(phys, surface)?,
    })
}

pub fn supports_required_extensions<D: Driver + ?Sized>(
    driver: &D,
    phys: vk::PhysicalDevice,
) -> VkResult<bool> {
    let available = driver.device_extensions(phys)?;
    Ok(REQUIRED_DEVICE_EXTENSIONS
        .iter()
        .all(|req| available.iter().any(|have| have.as_c_str() == *req)))
}

/// Complete queue families, every required extension, and at least one
/// surface format and present mode.
pub fn device_suitable<D: Driver + ?Sized>(
    driver: &D,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> VkResult<bool> {
    let indices = queue_family_indices(driver, phys, surface)?;
    let extensions = supports_required_extensions(driver, phys)?;
    // Surface queries are only meaningful once the swapchain extension is known.
    let swap_chain = extensions && swap_chain_details(driver, phys, surface)?.is_adequate();
    Ok(indices.is_complete() && extensions && swap_chain)
}

/// First suitable device in enumeration order. A device whose probing errors
/// is skipped, never retried.
pub fn pick_physical_device<D: Driver + ?Sized>(
    driver: &D,
    surface: vk::SurfaceKHR,
) -> RenderResult<(vk::PhysicalDevice, QueueFamilies)> {
    let devices = driver
        .physical_devices()
        .map_err(|e| RenderError::new(Stage::PhysicalDevice, format!("enumerate: {e}")))?;
    if devices.is_empty() {
        return Err(RenderError::new(
            Stage::PhysicalDevice,
            "no GPUs with Vulkan support",
        ));
    }

    for phys in devices {
        let name = driver.device_name(phys);
        match device_suitable(driver, phys, surface) {
            Ok(true) => {
                let families = queue_family_indices(driver, phys, surface)
                    .ok()
                    .and_then(|i| i.resolved());
                if let Some(families) = families {
                    info!(
                        "GPU: {name} (graphics family {}, present family {})",
                        families.graphics, families.present
                    );
                    return Ok((phys, families));
                }
            }
            Ok(false) => debug!("GPU {name}: not suitable"),
            Err(e) => warn!("GPU {name}: probing failed ({e}), skipped"),
        }
    }

    Err(RenderError::new(
        Stage::PhysicalDevice,
        "no enumerated device supports graphics, presentation and the swapchain extension",
    ))
}
