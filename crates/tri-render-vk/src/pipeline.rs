// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use tracing::info;
use tri_core::{RenderResult, Stage, StageExt};

use crate::driver::{Driver, PipelineDesc, RenderPassDesc, ShaderStage};
use crate::shader::{ShaderCode, SHADER_ENTRY};

/// Clear on load, keep on store, hand the image to presentation afterwards.
pub fn render_pass_desc(format: vk::Format) -> RenderPassDesc {
    RenderPassDesc {
        format,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

/// Geometry and color live in the vertex shader, so there is no vertex
/// input and no descriptor or push-constant interface at all.
pub fn triangle_pipeline_desc() -> PipelineDesc {
    PipelineDesc {
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        vertex_bindings: 0,
        vertex_attributes: 0,
        dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::BACK,
        front_face: vk::FrontFace::CLOCKWISE,
        line_width: 1.0,
        depth_bias: false,
        samples: vk::SampleCountFlags::TYPE_1,
        blend_enable: false,
        descriptor_set_layouts: 0,
        push_constant_ranges: 0,
    }
}

/// Immutable once built. Owns the render pass it was built against.
pub struct GraphicsPipeline {
    pub render_pass: vk::RenderPass,
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
}

impl GraphicsPipeline {
    pub fn create<D: Driver + ?Sized>(
        driver: &mut D,
        color_format: vk::Format,
        shaders: &ShaderCode,
    ) -> RenderResult<Self> {
        let render_pass = driver
            .create_render_pass(&render_pass_desc(color_format))
            .stage(Stage::RenderPass)?;

        let desc = triangle_pipeline_desc();
        let layout = match driver.create_pipeline_layout(&desc) {
            Ok(layout) => layout,
            Err(e) => {
                driver.destroy_render_pass(render_pass);
                return Err(e).stage(Stage::PipelineLayout);
            }
        };

        let pipeline = match build_pipeline(driver, &desc, layout, render_pass, shaders) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                driver.destroy_pipeline_layout(layout);
                driver.destroy_render_pass(render_pass);
                return Err(e);
            }
        };
        info!("graphics pipeline ready ({color_format:?})");

        Ok(GraphicsPipeline {
            render_pass,
            layout,
            pipeline,
        })
    }

    pub fn destroy<D: Driver + ?Sized>(&mut self, driver: &mut D) {
        driver.destroy_pipeline(self.pipeline);
        driver.destroy_pipeline_layout(self.layout);
        driver.destroy_render_pass(self.render_pass);
        self.pipeline = vk::Pipeline::null();
        self.layout = vk::PipelineLayout::null();
        self.render_pass = vk::RenderPass::null();
    }
}

fn build_pipeline<D: Driver + ?Sized>(
    driver: &mut D,
    desc: &PipelineDesc,
    layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
    shaders: &ShaderCode,
) -> RenderResult<vk::Pipeline> {
    let vs = driver
        .create_shader_module(&shaders.vertex)
        .stage(Stage::ShaderModule)?;
    let fs = match driver.create_shader_module(&shaders.fragment) {
        Ok(fs) => fs,
        Err(e) => {
            driver.destroy_shader_module(vs);
            return Err(e).stage(Stage::ShaderModule);
        }
    };

    let stages = [
        ShaderStage {
            stage: vk::ShaderStageFlags::VERTEX,
            module: vs,
            entry: SHADER_ENTRY,
        },
        ShaderStage {
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: fs,
            entry: SHADER_ENTRY,
        },
    ];
    let created = driver.create_graphics_pipeline(desc, &stages, layout, render_pass);

    // Modules are only read during pipeline creation.
    driver.destroy_shader_module(vs);
    driver.destroy_shader_module(fs);

    created.stage(Stage::Pipeline)
}
