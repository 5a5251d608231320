// SPDX-License-Identifier: CEPL-1.0
use std::fmt;

use thiserror::Error;

pub type RenderResult<T> = Result<T, RenderError>;

/// Every step of renderer setup and of a frame that can fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Loader,
    Validation,
    Instance,
    DebugMessenger,
    Surface,
    PhysicalDevice,
    LogicalDevice,
    Swapchain,
    ImageView,
    RenderPass,
    ShaderLoad,
    ShaderModule,
    PipelineLayout,
    Pipeline,
    Framebuffer,
    CommandPool,
    CommandBuffer,
    SyncObjects,
    FrameWait,
    FenceReset,
    Acquire,
    Record,
    Submit,
    Present,
}

impl Stage {
    /// Human-readable phrase used as the prefix of every error at this stage.
    pub fn failure(self) -> &'static str {
        match self {
            Stage::Loader => "failed to load the Vulkan loader",
            Stage::Validation => "validation layers requested, but not available",
            Stage::Instance => "failed to create instance",
            Stage::DebugMessenger => "failed to set up debug messenger",
            Stage::Surface => "failed to create window surface",
            Stage::PhysicalDevice => "failed to find a suitable GPU",
            Stage::LogicalDevice => "failed to create logical device",
            Stage::Swapchain => "failed to create swap chain",
            Stage::ImageView => "failed to create image views",
            Stage::RenderPass => "failed to create render pass",
            Stage::ShaderLoad => "failed to open shader file",
            Stage::ShaderModule => "failed to create shader module",
            Stage::PipelineLayout => "failed to create pipeline layout",
            Stage::Pipeline => "failed to create graphics pipeline",
            Stage::Framebuffer => "failed to create framebuffer",
            Stage::CommandPool => "failed to create command pool",
            Stage::CommandBuffer => "failed to allocate command buffers",
            Stage::SyncObjects => "failed to create synchronization objects for a frame",
            Stage::FrameWait => "failed to wait for in-flight fence",
            Stage::FenceReset => "failed to reset in-flight fence",
            Stage::Acquire => "failed to acquire swap chain image",
            Stage::Record => "failed to record command buffer",
            Stage::Submit => "failed to submit draw command buffer",
            Stage::Present => "failed to present swap chain image",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.failure())
    }
}

/// A fatal renderer failure tagged with the step that produced it.
#[derive(Debug, Error)]
#[error("{stage}: {message}")]
pub struct RenderError {
    pub stage: Stage,
    pub message: String,
}

impl RenderError {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// Attaches a [`Stage`] to any displayable error.
pub trait StageExt<T> {
    fn stage(self, stage: Stage) -> RenderResult<T>;
}

impl<T, E: fmt::Display> StageExt<T> for Result<T, E> {
    fn stage(self, stage: Stage) -> RenderResult<T> {
        self.map_err(|e| RenderError::new(stage, e.to_string()))
    }
}
