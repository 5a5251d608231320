// SPDX-License-Identifier: CEPL-1.0
//! [`Driver`] on top of `ash`. All unsafe driver calls live here.

use std::ffi::{CStr, CString};

use ash::ext::debug_utils;
use ash::khr::{surface, swapchain};
use ash::prelude::VkResult;
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info};
use tri_core::{RenderResult, Stage, StageExt};
use tri_render::ValidationPolicy;

use crate::driver::{
    DrawPass, Driver, ImageSharing, PipelineDesc, QueueRequest, RenderPassDesc, ShaderStage,
    Submission, SwapchainPlan,
};
use crate::instance::create_instance;

struct LogicalDevice {
    device: ash::Device,
    swapchain: swapchain::Device,
}

pub struct AshDriver {
    // Keeps the loader library mapped for the lifetime of the instance.
    _entry: Entry,
    instance: Instance,
    debug: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,
    device: Option<LogicalDevice>,
}

impl AshDriver {
    /// Loads the driver, creates the instance (with validation per `policy`)
    /// and a surface for `window`.
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        policy: ValidationPolicy,
    ) -> RenderResult<Self> {
        let dh = display.display_handle().stage(Stage::Surface)?.as_raw();
        let wh = window.window_handle().stage(Stage::Surface)?.as_raw();

        let entry = unsafe { Entry::load() }.stage(Stage::Loader)?;
        let bundle = create_instance(&entry, dh, policy)?;

        let surface_loader = surface::Instance::new(&entry, &bundle.instance);
        let surface =
            match unsafe { ash_window::create_surface(&entry, &bundle.instance, dh, wh, None) } {
                Ok(s) => s,
                Err(e) => {
                    unsafe {
                        if let Some((loader, messenger)) = &bundle.debug {
                            loader.destroy_debug_utils_messenger(*messenger, None);
                        }
                        bundle.instance.destroy_instance(None);
                    }
                    return Err(e).stage(Stage::Surface);
                }
            };
        debug!("surface created");

        Ok(AshDriver {
            _entry: entry,
            instance: bundle.instance,
            debug: bundle.debug,
            surface_loader,
            surface,
            device: None,
        })
    }

    fn device(&self) -> VkResult<&LogicalDevice> {
        self.device
            .as_ref()
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }
}

impl Driver for AshDriver {
    fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    fn physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        unsafe { self.instance.enumerate_physical_devices() }
    }

    fn device_name(&self, phys: vk::PhysicalDevice) -> String {
        let props = unsafe { self.instance.get_physical_device_properties(phys) };
        props
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|_| format!("{phys:?}"))
    }

    fn queue_families(&self, phys: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        unsafe {
            self.instance
                .get_physical_device_queue_family_properties(phys)
        }
    }

    fn surface_support(
        &self,
        phys: vk::PhysicalDevice,
        family_index: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_support(phys, family_index, surface)
        }
    }

    fn device_extensions(&self, phys: vk::PhysicalDevice) -> VkResult<Vec<CString>> {
        let props = unsafe { self.instance.enumerate_device_extension_properties(phys) }?;
        Ok(props
            .iter()
            .filter_map(|p| p.extension_name_as_c_str().ok().map(CStr::to_owned))
            .collect())
    }

    fn surface_capabilities(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(phys, surface)
        }
    }

    fn surface_formats(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(phys, surface)
        }
    }

    fn present_modes(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(phys, surface)
        }
    }

    fn create_device(
        &mut self,
        phys: vk::PhysicalDevice,
        queues: &[QueueRequest],
        extensions: &[&CStr],
    ) -> VkResult<()> {
        let priorities: Vec<[f32; 1]> = queues.iter().map(|q| [q.priority]).collect();
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = queues
            .iter()
            .zip(&priorities)
            .map(|(q, p)| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(q.family_index)
                    .queue_priorities(p)
            })
            .collect();
        let ext_ptrs: Vec<*const std::os::raw::c_char> =
            extensions.iter().map(|e| e.as_ptr()).collect();
        let features = vk::PhysicalDeviceFeatures::default();

        let info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&ext_ptrs)
            .enabled_features(&features);

        let device = unsafe { self.instance.create_device(phys, &info, None) }?;
        let swapchain = swapchain::Device::new(&self.instance, &device);
        self.device = Some(LogicalDevice { device, swapchain });
        Ok(())
    }

    fn queue(&self, family_index: u32) -> vk::Queue {
        match &self.device {
            Some(d) => unsafe { d.device.get_device_queue(family_index, 0) },
            None => vk::Queue::null(),
        }
    }

    fn wait_idle(&self) -> VkResult<()> {
        match &self.device {
            Some(d) => unsafe { d.device.device_wait_idle() },
            None => Ok(()),
        }
    }

    fn create_swapchain(&mut self, plan: &SwapchainPlan) -> VkResult<vk::SwapchainKHR> {
        let d = self.device()?;
        let families: &[u32] = match &plan.sharing {
            ImageSharing::Exclusive => &[],
            ImageSharing::Concurrent(f) => f,
        };
        let sharing_mode = match plan.sharing {
            ImageSharing::Exclusive => vk::SharingMode::EXCLUSIVE,
            ImageSharing::Concurrent(_) => vk::SharingMode::CONCURRENT,
        };

        let info = vk::SwapchainCreateInfoKHR::default()
            .surface(plan.surface)
            .min_image_count(plan.min_image_count)
            .image_format(plan.format.format)
            .image_color_space(plan.format.color_space)
            .image_extent(plan.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(families)
            .pre_transform(plan.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(plan.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        unsafe { d.swapchain.create_swapchain(&info, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        let d = self.device()?;
        unsafe { d.swapchain.get_swapchain_images(swapchain) }
    }

    fn create_image_view(
        &mut self,
        image: vk::Image,
        format: vk::Format,
    ) -> VkResult<vk::ImageView> {
        let d = self.device()?;
        let info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        unsafe { d.device.create_image_view(&info, None) }
    }

    fn create_framebuffer(
        &mut self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        let d = self.device()?;
        let attachments = [view];
        let info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        unsafe { d.device.create_framebuffer(&info, None) }
    }

    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> VkResult<vk::RenderPass> {
        let d = self.device()?;
        let attachments = [vk::AttachmentDescription::default()
            .format(desc.format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(desc.load_op)
            .store_op(desc.store_op)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(desc.initial_layout)
            .final_layout(desc.final_layout)];
        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)];
        // Orders the layout transition after the acquire semaphore wait.
        let dependencies = [vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)];

        let info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);
        unsafe { d.device.create_render_pass(&info, None) }
    }

    fn create_shader_module(&mut self, code: &[u32]) -> VkResult<vk::ShaderModule> {
        let d = self.device()?;
        let info = vk::ShaderModuleCreateInfo::default().code(code);
        unsafe { d.device.create_shader_module(&info, None) }
    }

    fn create_pipeline_layout(&mut self, desc: &PipelineDesc) -> VkResult<vk::PipelineLayout> {
        let d = self.device()?;
        // No descriptor sets or push constants are ever declared.
        debug_assert_eq!(desc.descriptor_set_layouts, 0);
        debug_assert_eq!(desc.push_constant_ranges, 0);
        let info = vk::PipelineLayoutCreateInfo::default();
        unsafe { d.device.create_pipeline_layout(&info, None) }
    }

    fn create_graphics_pipeline(
        &mut self,
        desc: &PipelineDesc,
        stages: &[ShaderStage],
        layout: vk::PipelineLayout,
        render_pass: vk::RenderPass,
    ) -> VkResult<vk::Pipeline> {
        let d = self.device()?;

        let stage_infos: Vec<vk::PipelineShaderStageCreateInfo> = stages
            .iter()
            .map(|s| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(s.stage)
                    .module(s.module)
                    .name(s.entry)
            })
            .collect();

        // Geometry comes from the vertex shader; there is no vertex input.
        debug_assert_eq!((desc.vertex_bindings, desc.vertex_attributes), (0, 0));
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(desc.topology)
            .primitive_restart_enable(false);
        // Viewport and scissor are dynamic; only the counts are baked in.
        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let raster = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(desc.polygon_mode)
            .line_width(desc.line_width)
            .cull_mode(desc.cull_mode)
            .front_face(desc.front_face)
            .depth_bias_enable(desc.depth_bias);
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(desc.samples);
        let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(desc.blend_enable)];
        let blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);
        let dynamic =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&desc.dynamic_states);

        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stage_infos)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&raster)
            .multisample_state(&multisample)
            .color_blend_state(&blend)
            .dynamic_state(&dynamic)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);

        let pipelines = unsafe {
            d.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
        }
        .map_err(|(_, e)| e)?;
        pipelines
            .into_iter()
            .next()
            .ok_or(vk::Result::ERROR_UNKNOWN)
    }

    fn create_command_pool(&mut self, family_index: u32) -> VkResult<vk::CommandPool> {
        let d = self.device()?;
        let info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(family_index);
        unsafe { d.device.create_command_pool(&info, None) }
    }

    fn allocate_command_buffers(
        &mut self,
        pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let d = self.device()?;
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        unsafe { d.device.allocate_command_buffers(&info) }
    }

    fn create_semaphore(&mut self) -> VkResult<vk::Semaphore> {
        let d = self.device()?;
        unsafe {
            d.device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
        }
    }

    fn create_fence(&mut self, signaled: bool) -> VkResult<vk::Fence> {
        let d = self.device()?;
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        unsafe {
            d.device
                .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)
        }
    }

    fn wait_for_fence(&mut self, fence: vk::Fence, timeout: u64) -> VkResult<()> {
        let d = self.device()?;
        unsafe { d.device.wait_for_fences(&[fence], true, timeout) }
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> VkResult<()> {
        let d = self.device()?;
        unsafe { d.device.reset_fences(&[fence]) }
    }

    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let d = self.device()?;
        unsafe {
            d.swapchain
                .acquire_next_image(swapchain, timeout, signal, vk::Fence::null())
        }
    }

    fn reset_command_buffer(&mut self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let d = self.device()?;
        unsafe {
            d.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
        }
    }

    fn record_draw(&mut self, cmd: vk::CommandBuffer, pass: &DrawPass) -> VkResult<()> {
        let d = &self.device()?.device;
        let area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: pass.extent,
        };
        let clear = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: pass.clear_color,
            },
        }];
        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: pass.extent.width as f32,
            height: pass.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let begin = vk::RenderPassBeginInfo::default()
            .render_pass(pass.render_pass)
            .framebuffer(pass.framebuffer)
            .render_area(area)
            .clear_values(&clear);

        unsafe {
            d.begin_command_buffer(cmd, &vk::CommandBufferBeginInfo::default())?;
            d.cmd_begin_render_pass(cmd, &begin, vk::SubpassContents::INLINE);
            d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pass.pipeline);
            d.cmd_set_viewport(cmd, 0, &viewports);
            d.cmd_set_scissor(cmd, 0, &[area]);
            d.cmd_draw(cmd, pass.vertex_count, pass.instance_count, 0, 0);
            d.cmd_end_render_pass(cmd);
            d.end_command_buffer(cmd)
        }
    }

    fn submit(&mut self, queue: vk::Queue, submission: &Submission) -> VkResult<()> {
        let d = self.device()?;
        let waits = [submission.wait_semaphore];
        let stages = [submission.wait_stage];
        let cmds = [submission.command_buffer];
        let signals = [submission.signal_semaphore];
        let info = vk::SubmitInfo::default()
            .wait_semaphores(&waits)
            .wait_dst_stage_mask(&stages)
            .command_buffers(&cmds)
            .signal_semaphores(&signals);
        unsafe { d.device.queue_submit(queue, &[info], submission.fence) }
    }

    fn present(
        &mut self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        let d = self.device()?;
        let waits = [wait];
        let swapchains = [swapchain];
        let indices = [image_index];
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices);
        unsafe { d.swapchain.queue_present(queue, &info) }
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        if let Some(d) = &self.device {
            unsafe { d.device.destroy_semaphore(semaphore, None) };
        }
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        if let Some(d) = &self.device {
            unsafe { d.device.destroy_fence(fence, None) };
        }
    }

    fn destroy_command_pool(&mut self, pool: vk::CommandPool) {
        if let Some(d) = &self.device {
            unsafe { d.device.destroy_command_pool(pool, None) };
        }
    }

    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer) {
        if let Some(d) = &self.device {
            unsafe { d.device.destroy_framebuffer(framebuffer, None) };
        }
    }

    fn destroy_pipeline(&mut self, pipeline: vk::Pipeline) {
        if let Some(d) = &self.device {
            unsafe { d.device.destroy_pipeline(pipeline, None) };
        }
    }

    fn destroy_pipeline_layout(&mut self, layout: vk::PipelineLayout) {
        if let Some(d) = &self.device {
            unsafe { d.device.destroy_pipeline_layout(layout, None) };
        }
    }

    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass) {
        if let Some(d) = &self.device {
            unsafe { d.device.destroy_render_pass(render_pass, None) };
        }
    }

    fn destroy_shader_module(&mut self, module: vk::ShaderModule) {
        if let Some(d) = &self.device {
            unsafe { d.device.destroy_shader_module(module, None) };
        }
    }

    fn destroy_image_view(&mut self, view: vk::ImageView) {
        if let Some(d) = &self.device {
            unsafe { d.device.destroy_image_view(view, None) };
        }
    }

    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR) {
        if let Some(d) = &self.device {
            unsafe { d.swapchain.destroy_swapchain(swapchain, None) };
        }
    }
}

// Device-level objects are released by the renderer before this runs.
// Remaining order: device, debug messenger, surface, instance.
impl Drop for AshDriver {
    fn drop(&mut self) {
        unsafe {
            if let Some(d) = self.device.take() {
                d.device.destroy_device(None);
            }
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
        info!("vulkan instance destroyed");
    }
}

