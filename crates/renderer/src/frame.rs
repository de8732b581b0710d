//! Frames in flight.
//!
//! Each [`FrameSlot`] owns everything one in-flight frame touches: its
//! command buffer, the acquire and render-finished semaphores, the fence the
//! CPU waits on before reusing the slot, and the per-frame uniform buffer
//! with its descriptor set.
//!
//! # Synchronization Flow
//!
//! ```text
//! 1. Wait on in_flight (CPU waits for the previous use of this slot)
//! 2. Acquire a presentable image (signals image_available)
//! 3. Reset in_flight, write uniforms, record the command buffer
//! 4. Submit: wait image_available, signal render_finished and in_flight
//! 5. Present: wait render_finished
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use translucent_resources::FrameUniforms;
use translucent_rhi::RhiResult;
use translucent_rhi::buffer::{Buffer, BufferUsage};
use translucent_rhi::command::{CommandBuffer, CommandPool};
use translucent_rhi::descriptor::{DescriptorPool, write_uniform_buffer};
use translucent_rhi::device::Device;
use translucent_rhi::sync::{Fence, Semaphore};

use crate::pipelines::SetLayouts;

/// Per-frame resources, exclusively owned by one frame at a time.
pub struct FrameSlot {
    command_buffer: CommandBuffer,
    image_available: Semaphore,
    render_finished: Semaphore,
    in_flight: Fence,
    uniforms: Buffer,
    frame_set: vk::DescriptorSet,
}

impl FrameSlot {
    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    #[inline]
    pub fn image_available(&self) -> &Semaphore {
        &self.image_available
    }

    #[inline]
    pub fn render_finished(&self) -> &Semaphore {
        &self.render_finished
    }

    #[inline]
    pub fn in_flight(&self) -> &Fence {
        &self.in_flight
    }

    /// Set 0 of the mesh pipelines, pointing at this slot's uniforms.
    #[inline]
    pub fn frame_set(&self) -> vk::DescriptorSet {
        self.frame_set
    }

    /// Must only be called once [`in_flight`](Self::in_flight) has signaled.
    pub fn write_uniforms(&self, uniforms: &FrameUniforms) -> RhiResult<()> {
        self.uniforms.write_pod(uniforms)
    }

    /// Submits the recorded command buffer to the graphics queue.
    pub fn submit(&self, device: &Device) -> RhiResult<()> {
        let wait_semaphores = [self.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.render_finished.handle()];
        let command_buffers = [self.command_buffer.handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe { device.submit_graphics(&[submit_info], self.in_flight.handle()) }
    }
}

/// All frame slots, sized to the buffering depth.
pub struct FrameSlots {
    slots: Vec<FrameSlot>,
    _descriptor_pool: DescriptorPool,
    _command_pool: CommandPool,
}

impl FrameSlots {
    pub fn new(device: &Arc<Device>, layouts: &SetLayouts, depth: usize) -> RhiResult<Self> {
        let command_pool = CommandPool::new(device.clone(), device.graphics_family())?;
        let descriptor_pool = DescriptorPool::for_layout(device.clone(), &layouts.frame, depth as u32)?;

        let command_buffers = command_pool.allocate_command_buffers(depth as u32)?;
        let frame_sets = descriptor_pool.allocate(&layouts.frame, depth)?;

        let mut slots = Vec::with_capacity(depth);
        for (i, (command_buffer, frame_set)) in command_buffers.into_iter().zip(frame_sets).enumerate() {
            let uniforms = Buffer::new(
                device.clone(),
                BufferUsage::Uniform,
                FrameUniforms::size() as vk::DeviceSize,
            )?;
            write_uniform_buffer(
                device,
                frame_set,
                0,
                uniforms.handle(),
                FrameUniforms::size() as vk::DeviceSize,
            );

            slots.push(FrameSlot {
                command_buffer,
                image_available: Semaphore::new(device.clone())?,
                render_finished: Semaphore::new(device.clone())?,
                // Signaled so the first wait on each slot returns at once.
                in_flight: Fence::new(device.clone(), true)?,
                uniforms,
                frame_set,
            });
            debug!("Created frame slot {}", i);
        }

        info!("Created {} frames in flight", depth);

        Ok(Self {
            slots,
            _descriptor_pool: descriptor_pool,
            _command_pool: command_pool,
        })
    }

    /// Slot `index`, which the scheduler keeps below [`len`](Self::len).
    #[inline]
    pub fn get(&self, index: usize) -> Option<&FrameSlot> {
        self.slots.get(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Slot used by frame number `frame_index` with `depth` frames in flight.
#[inline]
pub fn slot_index(frame_index: u64, depth: usize) -> usize {
    (frame_index % depth as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_index_cycles_within_depth() {
        for depth in [2usize, 3] {
            for frame in 0..50u64 {
                let slot = slot_index(frame, depth);
                assert!(slot < depth);
                assert_eq!(slot, frame as usize % depth);
            }
        }
    }

    #[test]
    fn test_slot_index_survives_large_frame_counts() {
        assert_eq!(slot_index(u64::MAX, 2), 1);
        assert_eq!(slot_index(u64::MAX, 3), 0);
    }

    #[test]
    fn test_frame_slot_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameSlot>();
        assert_send::<FrameSlots>();
    }
}
