// SPDX-License-Identifier: CEPL-1.0
//! The seam between renderer logic and the graphics driver.
//!
//! Everything above this trait decides *what* to create; implementations
//! only translate the plans below into driver create-infos. Every method
//! reports through [`VkResult`], so `Ok` is the single success sentinel.

use std::ffi::{CStr, CString};

use ash::prelude::VkResult;
use ash::vk;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QueueRequest {
    pub family_index: u32,
    pub priority: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageSharing {
    /// Owned by one queue family at a time.
    Exclusive,
    /// Usable from both listed families without ownership transfers.
    Concurrent([u32; 2]),
}

#[derive(Clone, Copy, Debug)]
pub struct SwapchainPlan {
    pub surface: vk::SurfaceKHR,
    pub min_image_count: u32,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    pub sharing: ImageSharing,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

/// Single subpass, single color attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderPassDesc {
    pub format: vk::Format,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}

/// Fixed-function state of a graphics pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineDesc {
    pub topology: vk::PrimitiveTopology,
    pub vertex_bindings: u32,
    pub vertex_attributes: u32,
    pub dynamic_states: Vec<vk::DynamicState>,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub line_width: f32,
    pub depth_bias: bool,
    pub samples: vk::SampleCountFlags,
    pub blend_enable: bool,
    pub descriptor_set_layouts: u32,
    pub push_constant_ranges: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct ShaderStage {
    pub stage: vk::ShaderStageFlags,
    pub module: vk::ShaderModule,
    pub entry: &'static CStr,
}

/// One render pass instance drawing a fixed vertex count.
#[derive(Clone, Copy, Debug)]
pub struct DrawPass {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub pipeline: vk::Pipeline,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
    pub vertex_count: u32,
    pub instance_count: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct Submission {
    pub command_buffer: vk::CommandBuffer,
    pub wait_semaphore: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    pub signal_semaphore: vk::Semaphore,
    pub fence: vk::Fence,
}

pub trait Driver {
    // --- capability queries ---
    fn surface(&self) -> vk::SurfaceKHR;
    fn physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>>;
    fn device_name(&self, phys: vk::PhysicalDevice) -> String;
    fn queue_families(&self, phys: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties>;
    fn surface_support(
        &self,
        phys: vk::PhysicalDevice,
        family_index: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool>;
    fn device_extensions(&self, phys: vk::PhysicalDevice) -> VkResult<Vec<CString>>;
    fn surface_capabilities(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR>;
    fn surface_formats(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>>;
    fn present_modes(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>>;

    // --- logical device ---
    fn create_device(
        &mut self,
        phys: vk::PhysicalDevice,
        queues: &[QueueRequest],
        extensions: &[&CStr],
    ) -> VkResult<()>;
    fn queue(&self, family_index: u32) -> vk::Queue;
    fn wait_idle(&self) -> VkResult<()>;

    // --- presentation chain ---
    fn create_swapchain(&mut self, plan: &SwapchainPlan) -> VkResult<vk::SwapchainKHR>;
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    fn create_image_view(&mut self, image: vk::Image, format: vk::Format)
        -> VkResult<vk::ImageView>;
    fn create_framebuffer(
        &mut self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer>;

    // --- pipeline ---
    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> VkResult<vk::RenderPass>;
    fn create_shader_module(&mut self, code: &[u32]) -> VkResult<vk::ShaderModule>;
    fn create_pipeline_layout(&mut self, desc: &PipelineDesc) -> VkResult<vk::PipelineLayout>;
    fn create_graphics_pipeline(
        &mut self,
        desc: &PipelineDesc,
        stages: &[ShaderStage],
        layout: vk::PipelineLayout,
        render_pass: vk::RenderPass,
    ) -> VkResult<vk::Pipeline>;

    // --- commands and synchronization ---
    fn create_command_pool(&mut self, family_index: u32) -> VkResult<vk::CommandPool>;
    fn allocate_command_buffers(
        &mut self,
        pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>>;
    fn create_semaphore(&mut self) -> VkResult<vk::Semaphore>;
    fn create_fence(&mut self, signaled: bool) -> VkResult<vk::Fence>;

    // --- per frame ---
    fn wait_for_fence(&mut self, fence: vk::Fence, timeout: u64) -> VkResult<()>;
    fn reset_fence(&mut self, fence: vk::Fence) -> VkResult<()>;
    /// Returns the image index and whether the swapchain is suboptimal.
    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;
    fn reset_command_buffer(&mut self, cmd: vk::CommandBuffer) -> VkResult<()>;
    fn record_draw(&mut self, cmd: vk::CommandBuffer, pass: &DrawPass) -> VkResult<()>;
    fn submit(&mut self, queue: vk::Queue, submission: &Submission) -> VkResult<()>;
    /// Returns whether the swapchain is suboptimal.
    fn present(
        &mut self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool>;

    // --- teardown ---
    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore);
    fn destroy_fence(&mut self, fence: vk::Fence);
    fn destroy_command_pool(&mut self, pool: vk::CommandPool);
    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer);
    fn destroy_pipeline(&mut self, pipeline: vk::Pipeline);
    fn destroy_pipeline_layout(&mut self, layout: vk::PipelineLayout);
    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass);
    fn destroy_shader_module(&mut self, module: vk::ShaderModule);
    fn destroy_image_view(&mut self, view: vk::ImageView);
    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR);
}
