// SPDX-License-Identifier: CEPL-1.0
//! In-memory driver that records every call, for tests that must run
//! without a GPU.

use std::cell::Cell;
use std::collections::HashMap;
use std::ffi::{CStr, CString};

use ash::prelude::VkResult;
use ash::vk::{self, Handle};

use crate::driver::{
    DrawPass, Driver, PipelineDesc, QueueRequest, RenderPassDesc, ShaderStage, Submission,
    SwapchainPlan,
};

#[derive(Clone, Copy, Debug)]
pub struct MockFamily {
    pub flags: vk::QueueFlags,
    pub present: bool,
}

impl MockFamily {
    pub fn compute_only() -> Self {
        MockFamily {
            flags: vk::QueueFlags::COMPUTE,
            present: false,
        }
    }

    pub fn graphics_only() -> Self {
        MockFamily {
            flags: vk::QueueFlags::GRAPHICS,
            present: false,
        }
    }

    pub fn present_only() -> Self {
        MockFamily {
            flags: vk::QueueFlags::TRANSFER,
            present: true,
        }
    }

    pub fn both() -> Self {
        MockFamily {
            flags: vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE,
            present: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MockDevice {
    pub name: String,
    pub families: Vec<MockFamily>,
    pub extensions: Vec<CString>,
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
    /// Overrides how many images the swapchain really has.
    pub swapchain_images: Option<u32>,
}

impl MockDevice {
    /// One shared family, the swapchain extension, an sRGB and a UNORM
    /// format, FIFO and MAILBOX.
    pub fn capable() -> Self {
        MockDevice {
            name: "Mock GPU".into(),
            families: vec![MockFamily::both()],
            extensions: vec![
                CString::from(c"VK_KHR_maintenance1"),
                CString::from(ash::khr::swapchain::NAME),
            ],
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 8,
                current_extent: vk::Extent2D {
                    width: 800,
                    height: 600,
                },
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                ..Default::default()
            },
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            swapchain_images: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    CreateDevice {
        queues: Vec<QueueRequest>,
        extensions: Vec<String>,
    },
    CreateSwapchain,
    CreateImageView,
    CreateFramebuffer,
    CreateRenderPass,
    CreateShaderModule,
    CreatePipelineLayout,
    CreatePipeline {
        render_pass: vk::RenderPass,
        stages: usize,
    },
    CreateCommandPool(u32),
    AllocateCommandBuffers(u32),
    CreateSemaphore,
    CreateFence {
        signaled: bool,
    },
    /// The fence was unsignaled when waited on; the mock GPU then finished.
    FenceBlocked(vk::Fence),
    WaitFence(vk::Fence),
    ResetFence(vk::Fence),
    AcquireNextImage {
        signal: vk::Semaphore,
    },
    ResetCommandBuffer(vk::CommandBuffer),
    RecordDraw {
        cmd: vk::CommandBuffer,
        framebuffer: vk::Framebuffer,
        clear_color: [f32; 4],
        vertex_count: u32,
    },
    Submit {
        cmd: vk::CommandBuffer,
        wait: vk::Semaphore,
        wait_stage: vk::PipelineStageFlags,
        signal: vk::Semaphore,
        fence: vk::Fence,
    },
    Present {
        image_index: u32,
        wait: vk::Semaphore,
    },
    DestroyShaderModule,
    Destroy(&'static str),
}

#[derive(Default)]
pub struct MockDriver {
    pub devices: Vec<MockDevice>,
    pub log: Vec<Call>,
    pub fail_device: bool,
    pub fail_pipeline: bool,
    /// The Nth semaphore creation (0-based) fails.
    pub fail_semaphore_at: Option<usize>,
    pub fail_fence: bool,
    pub fail_fence_reset: bool,
    /// Every fence wait times out.
    pub stall_fences: bool,
    pub acquire_error: Option<vk::Result>,
    pub acquire_suboptimal: bool,
    pub present_error: Option<vk::Result>,
    pub present_suboptimal: bool,
    selected: Option<usize>,
    fences: HashMap<u64, bool>,
    destroyed: HashMap<&'static str, usize>,
    next_handle: u64,
    image_count: u32,
    next_image: u32,
    last_plan: Option<SwapchainPlan>,
    support_queries: Cell<usize>,
    idle_waits: Cell<usize>,
}

impl MockDriver {
    pub fn with_devices(devices: Vec<MockDevice>) -> Self {
        MockDriver {
            devices,
            next_handle: 0x1000,
            ..Default::default()
        }
    }

    pub fn surface_support_queries(&self) -> usize {
        self.support_queries.get()
    }

    pub fn idle_waits(&self) -> usize {
        self.idle_waits.get()
    }

    pub fn last_swapchain_plan(&self) -> Option<SwapchainPlan> {
        self.last_plan
    }

    pub fn destroyed(&self, kind: &str) -> usize {
        self.destroyed.get(kind).copied().unwrap_or(0)
    }

    pub fn calls(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.log.iter().filter(|c| pred(c)).count()
    }

    fn device(&self, phys: vk::PhysicalDevice) -> &MockDevice {
        &self.devices[(phys.as_raw() - 1) as usize]
    }

    fn handle<T: Handle>(&mut self) -> T {
        self.next_handle += 1;
        T::from_raw(self.next_handle)
    }

    fn release(&mut self, kind: &'static str) {
        *self.destroyed.entry(kind).or_default() += 1;
        self.log.push(Call::Destroy(kind));
    }
}

impl Driver for MockDriver {
    fn surface(&self) -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(0xACE)
    }

    fn physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        Ok((1..=self.devices.len() as u64)
            .map(vk::PhysicalDevice::from_raw)
            .collect())
    }

    fn device_name(&self, phys: vk::PhysicalDevice) -> String {
        self.device(phys).name.clone()
    }

    fn queue_families(&self, phys: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        self.device(phys)
            .families
            .iter()
            .map(|f| vk::QueueFamilyProperties {
                queue_flags: f.flags,
                queue_count: 1,
                ..Default::default()
            })
            .collect()
    }

    fn surface_support(
        &self,
        phys: vk::PhysicalDevice,
        family_index: u32,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<bool> {
        self.support_queries.set(self.support_queries.get() + 1);
        Ok(self.device(phys).families[family_index as usize].present)
    }

    fn device_extensions(&self, phys: vk::PhysicalDevice) -> VkResult<Vec<CString>> {
        Ok(self.device(phys).extensions.clone())
    }

    fn surface_capabilities(
        &self,
        phys: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        Ok(self.device(phys).capabilities)
    }

    fn surface_formats(
        &self,
        phys: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        Ok(self.device(phys).formats.clone())
    }

    fn present_modes(
        &self,
        phys: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>> {
        Ok(self.device(phys).present_modes.clone())
    }

    fn create_device(
        &mut self,
        phys: vk::PhysicalDevice,
        queues: &[QueueRequest],
        extensions: &[&CStr],
    ) -> VkResult<()> {
        self.log.push(Call::CreateDevice {
            queues: queues.to_vec(),
            extensions: extensions
                .iter()
                .map(|e| e.to_string_lossy().into_owned())
                .collect(),
        });
        if self.fail_device {
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }
        self.selected = Some((phys.as_raw() - 1) as usize);
        Ok(())
    }

    fn queue(&self, family_index: u32) -> vk::Queue {
        vk::Queue::from_raw(0x5000 + u64::from(family_index))
    }

    fn wait_idle(&self) -> VkResult<()> {
        self.idle_waits.set(self.idle_waits.get() + 1);
        Ok(())
    }

    fn create_swapchain(&mut self, plan: &SwapchainPlan) -> VkResult<vk::SwapchainKHR> {
        self.log.push(Call::CreateSwapchain);
        // Without a created device the first one stands in.
        let forced = self
            .devices
            .get(self.selected.unwrap_or(0))
            .and_then(|d| d.swapchain_images);
        self.image_count = forced.unwrap_or(plan.min_image_count);
        self.last_plan = Some(*plan);
        Ok(self.handle())
    }

    fn swapchain_images(&self, _swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        Ok((0..u64::from(self.image_count))
            .map(|i| vk::Image::from_raw(0x9000 + i))
            .collect())
    }

    fn create_image_view(
        &mut self,
        _image: vk::Image,
        _format: vk::Format,
    ) -> VkResult<vk::ImageView> {
        self.log.push(Call::CreateImageView);
        Ok(self.handle())
    }

    fn create_framebuffer(
        &mut self,
        _render_pass: vk::RenderPass,
        _view: vk::ImageView,
        _extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        self.log.push(Call::CreateFramebuffer);
        Ok(self.handle())
    }

    fn create_render_pass(&mut self, _desc: &RenderPassDesc) -> VkResult<vk::RenderPass> {
        self.log.push(Call::CreateRenderPass);
        Ok(self.handle())
    }

    fn create_shader_module(&mut self, _code: &[u32]) -> VkResult<vk::ShaderModule> {
        self.log.push(Call::CreateShaderModule);
        Ok(self.handle())
    }

    fn create_pipeline_layout(&mut self, _desc: &PipelineDesc) -> VkResult<vk::PipelineLayout> {
        self.log.push(Call::CreatePipelineLayout);
        Ok(self.handle())
    }

    fn create_graphics_pipeline(
        &mut self,
        _desc: &PipelineDesc,
        stages: &[ShaderStage],
        _layout: vk::PipelineLayout,
        render_pass: vk::RenderPass,
    ) -> VkResult<vk::Pipeline> {
        self.log.push(Call::CreatePipeline {
            render_pass,
            stages: stages.len(),
        });
        if self.fail_pipeline {
            return Err(vk::Result::ERROR_UNKNOWN);
        }
        Ok(self.handle())
    }

    fn create_command_pool(&mut self, family_index: u32) -> VkResult<vk::CommandPool> {
        self.log.push(Call::CreateCommandPool(family_index));
        Ok(self.handle())
    }

    fn allocate_command_buffers(
        &mut self,
        _pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        self.log.push(Call::AllocateCommandBuffers(count));
        Ok((0..count).map(|_| self.handle()).collect())
    }

    fn create_semaphore(&mut self) -> VkResult<vk::Semaphore> {
        let made = self.calls(|c| matches!(c, Call::CreateSemaphore));
        self.log.push(Call::CreateSemaphore);
        if self.fail_semaphore_at == Some(made) {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        Ok(self.handle())
    }

    fn create_fence(&mut self, signaled: bool) -> VkResult<vk::Fence> {
        self.log.push(Call::CreateFence { signaled });
        if self.fail_fence {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        let fence: vk::Fence = self.handle();
        self.fences.insert(fence.as_raw(), signaled);
        Ok(fence)
    }

    fn wait_for_fence(&mut self, fence: vk::Fence, _timeout: u64) -> VkResult<()> {
        if self.stall_fences {
            return Err(vk::Result::TIMEOUT);
        }
        let signaled = self.fences.entry(fence.as_raw()).or_insert(false);
        if !*signaled {
            *signaled = true;
            self.log.push(Call::FenceBlocked(fence));
        }
        self.log.push(Call::WaitFence(fence));
        Ok(())
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> VkResult<()> {
        if self.fail_fence_reset {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        self.fences.insert(fence.as_raw(), false);
        self.log.push(Call::ResetFence(fence));
        Ok(())
    }

    fn acquire_next_image(
        &mut self,
        _swapchain: vk::SwapchainKHR,
        _timeout: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        self.log.push(Call::AcquireNextImage { signal });
        if let Some(err) = self.acquire_error {
            return Err(err);
        }
        let index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count.max(1);
        Ok((index, self.acquire_suboptimal))
    }

    fn reset_command_buffer(&mut self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.log.push(Call::ResetCommandBuffer(cmd));
        Ok(())
    }

    fn record_draw(&mut self, cmd: vk::CommandBuffer, pass: &DrawPass) -> VkResult<()> {
        self.log.push(Call::RecordDraw {
            cmd,
            framebuffer: pass.framebuffer,
            clear_color: pass.clear_color,
            vertex_count: pass.vertex_count,
        });
        Ok(())
    }

    fn submit(&mut self, _queue: vk::Queue, s: &Submission) -> VkResult<()> {
        // The fence stays unsignaled until someone waits on it.
        self.log.push(Call::Submit {
            cmd: s.command_buffer,
            wait: s.wait_semaphore,
            wait_stage: s.wait_stage,
            signal: s.signal_semaphore,
            fence: s.fence,
        });
        Ok(())
    }

    fn present(
        &mut self,
        _queue: vk::Queue,
        _swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        self.log.push(Call::Present { image_index, wait });
        match self.present_error {
            Some(err) => Err(err),
            None => Ok(self.present_suboptimal),
        }
    }

    fn destroy_semaphore(&mut self, _semaphore: vk::Semaphore) {
        self.release("semaphore");
    }

    fn destroy_fence(&mut self, _fence: vk::Fence) {
        self.release("fence");
    }

    fn destroy_command_pool(&mut self, _pool: vk::CommandPool) {
        self.release("command_pool");
    }

    fn destroy_framebuffer(&mut self, _framebuffer: vk::Framebuffer) {
        self.release("framebuffer");
    }

    fn destroy_pipeline(&mut self, _pipeline: vk::Pipeline) {
        self.release("pipeline");
    }

    fn destroy_pipeline_layout(&mut self, _layout: vk::PipelineLayout) {
        self.release("pipeline_layout");
    }

    fn destroy_render_pass(&mut self, _render_pass: vk::RenderPass) {
        self.release("render_pass");
    }

    fn destroy_shader_module(&mut self, _module: vk::ShaderModule) {
        *self.destroyed.entry("shader_module").or_default() += 1;
        self.log.push(Call::DestroyShaderModule);
    }

    fn destroy_image_view(&mut self, _view: vk::ImageView) {
        self.release("image_view");
    }

    fn destroy_swapchain(&mut self, _swapchain: vk::SwapchainKHR) {
        self.release("swapchain");
    }
}
