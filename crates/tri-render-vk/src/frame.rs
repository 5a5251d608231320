// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use tracing::{trace, warn};
use tri_core::{RenderResult, Stage, StageExt};

use crate::device::Queues;
use crate::driver::{DrawPass, Driver, Submission};
use crate::pipeline::GraphicsPipeline;
use crate::swapchain::PresentationChain;

const TRIANGLE_VERTICES: u32 = 3;

/// Where a slot is in its cycle. Only used for trace output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

/// Objects one in-flight frame needs. The fence starts signaled so the very
/// first wait returns at once.
pub struct FrameSlot {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
    pub command_buffer: vk::CommandBuffer,
    state: SlotState,
}

impl FrameSlot {
    /// Creates both semaphores and the fence; on failure the ones already
    /// created are destroyed again.
    fn create<D: Driver + ?Sized>(
        driver: &mut D,
        command_buffer: vk::CommandBuffer,
    ) -> RenderResult<Self> {
        let image_available = driver.create_semaphore().stage(Stage::SyncObjects)?;
        let render_finished = match driver.create_semaphore() {
            Ok(s) => s,
            Err(e) => {
                driver.destroy_semaphore(image_available);
                return Err(e).stage(Stage::SyncObjects);
            }
        };
        let in_flight = match driver.create_fence(true) {
            Ok(f) => f,
            Err(e) => {
                driver.destroy_semaphore(render_finished);
                driver.destroy_semaphore(image_available);
                return Err(e).stage(Stage::SyncObjects);
            }
        };
        Ok(FrameSlot {
            image_available,
            render_finished,
            in_flight,
            command_buffer,
            state: SlotState::Idle,
        })
    }

    fn enter(&mut self, index: usize, next: SlotState) {
        trace!("slot {index}: {:?} -> {next:?}", self.state);
        self.state = next;
    }
}

pub struct FrameLoop {
    pool: vk::CommandPool,
    slots: Vec<FrameSlot>,
    current: usize,
}

impl FrameLoop {
    /// A failure part-way releases the pool and every slot built so far.
    pub fn new<D: Driver + ?Sized>(
        driver: &mut D,
        graphics_family: u32,
        slot_count: usize,
    ) -> RenderResult<Self> {
        let pool = driver
            .create_command_pool(graphics_family)
            .stage(Stage::CommandPool)?;
        let mut frames = FrameLoop {
            pool,
            slots: Vec::with_capacity(slot_count),
            current: 0,
        };

        let buffers = match driver.allocate_command_buffers(pool, slot_count as u32) {
            Ok(b) => b,
            Err(e) => {
                frames.destroy(driver);
                return Err(e).stage(Stage::CommandBuffer);
            }
        };
        for command_buffer in buffers {
            match FrameSlot::create(driver, command_buffer) {
                Ok(slot) => frames.slots.push(slot),
                Err(e) => {
                    frames.destroy(driver);
                    return Err(e);
                }
            }
        }
        Ok(frames)
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// One acquire, record, submit, present cycle on the current slot.
    pub fn draw_frame<D: Driver + ?Sized>(
        &mut self,
        driver: &mut D,
        queues: &Queues,
        chain: &PresentationChain,
        pipeline: &GraphicsPipeline,
        clear_color: [f32; 4],
    ) -> RenderResult<()> {
        let index = self.current;
        let slot = &mut self.slots[index];

        // The GPU must be done with this slot's command buffer before reuse.
        driver
            .wait_for_fence(slot.in_flight, u64::MAX)
            .stage(Stage::FrameWait)?;
        driver
            .reset_fence(slot.in_flight)
            .stage(Stage::FenceReset)?;

        slot.enter(index, SlotState::Acquiring);
        let (image_index, suboptimal) = driver
            .acquire_next_image(chain.swapchain, u64::MAX, slot.image_available)
            .stage(Stage::Acquire)?;
        if suboptimal {
            warn!("acquire: swapchain is suboptimal for the surface");
        }

        slot.enter(index, SlotState::Recording);
        driver
            .reset_command_buffer(slot.command_buffer)
            .stage(Stage::Record)?;
        driver
            .record_draw(
                slot.command_buffer,
                &DrawPass {
                    render_pass: pipeline.render_pass,
                    framebuffer: chain.framebuffers[image_index as usize],
                    pipeline: pipeline.pipeline,
                    extent: chain.extent,
                    clear_color,
                    vertex_count: TRIANGLE_VERTICES,
                    instance_count: 1,
                },
            )
            .stage(Stage::Record)?;

        driver
            .submit(
                queues.graphics,
                &Submission {
                    command_buffer: slot.command_buffer,
                    wait_semaphore: slot.image_available,
                    wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                    signal_semaphore: slot.render_finished,
                    fence: slot.in_flight,
                },
            )
            .stage(Stage::Submit)?;
        slot.enter(index, SlotState::Submitted);

        slot.enter(index, SlotState::Presenting);
        let suboptimal = driver
            .present(
                queues.present,
                chain.swapchain,
                image_index,
                slot.render_finished,
            )
            .stage(Stage::Present)?;
        if suboptimal {
            warn!("present: swapchain is suboptimal for the surface");
        }

        slot.enter(index, SlotState::Idle);
        self.current = (self.current + 1) % self.slots.len();
        Ok(())
    }

    pub fn destroy<D: Driver + ?Sized>(&mut self, driver: &mut D) {
        for slot in self.slots.drain(..) {
            driver.destroy_semaphore(slot.image_available);
            driver.destroy_semaphore(slot.render_finished);
            driver.destroy_fence(slot.in_flight);
        }
        // Freeing the pool frees its command buffers.
        driver.destroy_command_pool(self.pool);
        self.pool = vk::CommandPool::null();
    }
}
