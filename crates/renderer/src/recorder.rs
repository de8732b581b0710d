//! Command recording for one frame.
//!
//! The transparency pass is recorded even when the transparent list is
//! empty: its clears are what give the composite defined inputs.

use ash::vk;
use tracing::error;

use translucent_resources::{DrawPushConstants, Material, Model};
use translucent_rhi::RhiResult;
use translucent_rhi::command::CommandBuffer;
use translucent_rhi::image::LayoutTransition;

use crate::gather::{DrawItem, DrawLists};
use crate::gpu_scene::GpuScene;
use crate::lifecycle::ExtentResources;
use crate::passes::{
    PassGraph, opaque_clear_values, present_clear_values, transparency_clear_values,
};
use crate::pipelines::{FRAME_SET, MATERIAL_SET, PUSH_STAGES, Pipelines};

/// Stages that may still write the opaque targets when the pass ends. Depth
/// resolves count as color attachment output.
pub const OPAQUE_WRITE_STAGES: vk::PipelineStageFlags = vk::PipelineStageFlags::from_raw(
    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT.as_raw()
        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS.as_raw(),
);

/// Stages of the transparency and present passes that read them.
pub const OPAQUE_READ_STAGES: vk::PipelineStageFlags = vk::PipelineStageFlags::from_raw(
    vk::PipelineStageFlags::FRAGMENT_SHADER.as_raw()
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS.as_raw()
        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS.as_raw(),
);

/// Resolved or directly written depth, handed to the read-only depth test.
pub const DEPTH_HANDOFF: LayoutTransition = LayoutTransition {
    src_access: vk::AccessFlags::from_raw(
        vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw()
            | vk::AccessFlags::COLOR_ATTACHMENT_WRITE.as_raw(),
    ),
    ..LayoutTransition::DEPTH_TO_READ_ONLY
};

/// Everything read while recording a frame.
pub struct FrameInputs<'a> {
    pub passes: &'a PassGraph,
    pub pipelines: &'a Pipelines,
    pub extent: &'a ExtentResources,
    pub composite_set: vk::DescriptorSet,
    pub scene: &'a GpuScene,
    pub models: &'a [Model],
    pub draws: &'a DrawLists,
    pub frame_set: vk::DescriptorSet,
    pub image_index: u32,
    pub clear_color: [f32; 4],
}

/// Commands the pass sequence is recorded with. Per-item binding and
/// drawing stays with the caller's draw callback.
pub trait FrameCommands {
    fn begin(&self) -> RhiResult<()>;
    fn end(&self) -> RhiResult<()>;
    fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    );
    fn end_render_pass(&self);
    fn set_viewport_and_scissor(&self, extent: vk::Extent2D);
    fn bind_graphics_pipeline(&self, pipeline: vk::Pipeline);
    fn bind_descriptor_sets(
        &self,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    );
    fn pipeline_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    );
    fn draw(&self, vertex_count: u32);
}

impl FrameCommands for CommandBuffer {
    fn begin(&self) -> RhiResult<()> {
        CommandBuffer::begin(self)
    }

    fn end(&self) -> RhiResult<()> {
        CommandBuffer::end(self)
    }

    fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    ) {
        CommandBuffer::begin_render_pass(self, render_pass, framebuffer, extent, clear_values);
    }

    fn end_render_pass(&self) {
        CommandBuffer::end_render_pass(self);
    }

    fn set_viewport_and_scissor(&self, extent: vk::Extent2D) {
        CommandBuffer::set_viewport_and_scissor(self, extent);
    }

    fn bind_graphics_pipeline(&self, pipeline: vk::Pipeline) {
        CommandBuffer::bind_graphics_pipeline(self, pipeline);
    }

    fn bind_descriptor_sets(
        &self,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        CommandBuffer::bind_descriptor_sets(self, layout, first_set, sets);
    }

    fn pipeline_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        CommandBuffer::pipeline_barrier(self, src_stage, dst_stage, image_barriers);
    }

    fn draw(&self, vertex_count: u32) {
        CommandBuffer::draw(self, vertex_count);
    }
}

/// A render pass instance: pass, framebuffer, area and clears.
#[derive(Clone)]
pub struct PassTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_values: Vec<vk::ClearValue>,
}

/// Raw handles and barriers of one frame, resolved from the owning objects.
#[derive(Clone)]
pub struct FramePlan {
    pub opaque: PassTarget,
    pub transparency: PassTarget,
    pub present: PassTarget,
    pub mesh_layout: vk::PipelineLayout,
    pub composite_layout: vk::PipelineLayout,
    pub opaque_pipeline: vk::Pipeline,
    pub transparent_pipeline: vk::Pipeline,
    pub composite_pipeline: vk::Pipeline,
    pub frame_set: vk::DescriptorSet,
    pub composite_set: vk::DescriptorSet,
    /// Opaque color to sampled, depth to read-only.
    pub opaque_handoff: [vk::ImageMemoryBarrier<'static>; 2],
    /// Accumulation and revealage to sampled.
    pub transparency_handoff: [vk::ImageMemoryBarrier<'static>; 2],
}

impl FramePlan {
    pub fn new(inputs: &FrameInputs<'_>) -> RhiResult<Self> {
        let targets = inputs.extent.targets();
        let framebuffers = inputs.extent.framebuffers();
        let extent = targets.extent();

        Ok(Self {
            opaque: PassTarget {
                render_pass: inputs.passes.opaque().handle(),
                framebuffer: framebuffers.opaque().handle(),
                extent,
                clear_values: opaque_clear_values(
                    inputs.clear_color,
                    inputs.passes.opaque().attachment_count(),
                ),
            },
            transparency: PassTarget {
                render_pass: inputs.passes.transparency().handle(),
                framebuffer: framebuffers.transparency().handle(),
                extent,
                clear_values: transparency_clear_values().to_vec(),
            },
            present: PassTarget {
                render_pass: inputs.passes.present().handle(),
                framebuffer: framebuffers.present(inputs.image_index)?.handle(),
                extent: inputs.extent.swapchain().extent(),
                clear_values: present_clear_values(inputs.clear_color).to_vec(),
            },
            mesh_layout: inputs.pipelines.mesh_layout().handle(),
            composite_layout: inputs.pipelines.composite_layout().handle(),
            opaque_pipeline: inputs.pipelines.opaque().handle(),
            transparent_pipeline: inputs.pipelines.transparent().handle(),
            composite_pipeline: inputs.pipelines.composite().handle(),
            frame_set: inputs.frame_set,
            composite_set: inputs.composite_set,
            opaque_handoff: [
                targets.color().barrier(LayoutTransition::COLOR_TO_SAMPLED),
                targets.depth().barrier(DEPTH_HANDOFF),
            ],
            transparency_handoff: [
                targets.accum().barrier(LayoutTransition::COLOR_TO_SAMPLED),
                targets.reveal().barrier(LayoutTransition::COLOR_TO_SAMPLED),
            ],
        })
    }
}

/// Records opaque, transparency and present passes into `cmd`.
pub fn record_frame(cmd: &CommandBuffer, inputs: &FrameInputs<'_>) -> RhiResult<()> {
    let plan = FramePlan::new(inputs)?;
    record_passes(cmd, &plan, inputs.draws, |cmd, item| {
        draw_item(cmd, inputs, item)
    })
}

/// Records the three passes and their hand-off barriers, calling `draw_item`
/// for every item inside the pass that owns it.
pub fn record_passes<C, F>(
    cmd: &C,
    plan: &FramePlan,
    draws: &DrawLists,
    mut draw_item: F,
) -> RhiResult<()>
where
    C: FrameCommands,
    F: FnMut(&C, &DrawItem),
{
    cmd.begin()?;

    // Opaque
    begin_pass(cmd, &plan.opaque);
    cmd.bind_graphics_pipeline(plan.opaque_pipeline);
    cmd.bind_descriptor_sets(plan.mesh_layout, FRAME_SET, &[plan.frame_set]);
    for item in &draws.opaque {
        draw_item(cmd, item);
    }
    cmd.end_render_pass();

    cmd.pipeline_barrier(OPAQUE_WRITE_STAGES, OPAQUE_READ_STAGES, &plan.opaque_handoff);

    // Transparency
    let misplaced = misclassified_transparent(draws);
    if misplaced > 0 {
        error!(
            "{} opaque draw item(s) in the transparent list, drawing them anyway",
            misplaced
        );
    }
    begin_pass(cmd, &plan.transparency);
    cmd.bind_graphics_pipeline(plan.transparent_pipeline);
    cmd.bind_descriptor_sets(plan.mesh_layout, FRAME_SET, &[plan.frame_set]);
    for item in &draws.transparent {
        draw_item(cmd, item);
    }
    cmd.end_render_pass();

    cmd.pipeline_barrier(
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        vk::PipelineStageFlags::FRAGMENT_SHADER,
        &plan.transparency_handoff,
    );

    // Present
    begin_pass(cmd, &plan.present);
    cmd.bind_graphics_pipeline(plan.composite_pipeline);
    cmd.bind_descriptor_sets(plan.composite_layout, 0, &[plan.composite_set]);
    // Full-screen triangle generated in the vertex shader.
    cmd.draw(3);
    cmd.end_render_pass();

    cmd.end()
}

fn begin_pass<C: FrameCommands>(cmd: &C, target: &PassTarget) {
    cmd.begin_render_pass(
        target.render_pass,
        target.framebuffer,
        target.extent,
        &target.clear_values,
    );
    cmd.set_viewport_and_scissor(target.extent);
}

fn draw_item(cmd: &CommandBuffer, inputs: &FrameInputs<'_>, item: &DrawItem) {
    let (Some(model), Some(gpu_model)) =
        (inputs.models.get(item.model), inputs.scene.model(item.model))
    else {
        return;
    };
    // Empty meshes were never uploaded.
    let (Some(mesh), Some(gpu_mesh)) = (model.meshes.get(item.mesh), gpu_model.mesh(item.mesh))
    else {
        return;
    };

    let default_material = Material::default();
    let material = model.material(mesh).unwrap_or(&default_material);
    let layout = inputs.pipelines.mesh_layout().handle();

    cmd.bind_descriptor_sets(layout, MATERIAL_SET, &[gpu_model.material_set(mesh)]);
    cmd.bind_vertex_buffer(gpu_mesh.vertex_buffer());
    cmd.bind_index_buffer(gpu_mesh.index_buffer(), vk::IndexType::UINT32);
    cmd.push_constants(
        layout,
        PUSH_STAGES,
        &DrawPushConstants::new(item.world, material),
    );
    cmd.draw_indexed(gpu_mesh.index_count());
}

/// Number of items in the transparent list that were classified opaque.
pub fn misclassified_transparent(draws: &DrawLists) -> usize {
    draws.transparent.iter().filter(|item| !item.transparent).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use ash::vk::Handle;
    use glam::Mat4;
    use translucent_rhi::image::{has_stencil, image_barrier};

    use crate::targets::{DEPTH_CANDIDATES, TargetDescs};

    #[derive(Clone, Debug, PartialEq)]
    enum Recorded {
        Begin,
        End,
        BeginPass(u64, usize),
        EndPass,
        Barrier(Vec<(u64, vk::ImageLayout)>),
        Pipeline(u64),
        Draw(u32),
        Item(bool),
    }

    #[derive(Default)]
    struct MockCommands {
        log: RefCell<Vec<Recorded>>,
    }

    impl MockCommands {
        fn push(&self, entry: Recorded) {
            self.log.borrow_mut().push(entry);
        }

        fn log(&self) -> Vec<Recorded> {
            self.log.borrow().clone()
        }
    }

    impl FrameCommands for MockCommands {
        fn begin(&self) -> RhiResult<()> {
            self.push(Recorded::Begin);
            Ok(())
        }

        fn end(&self) -> RhiResult<()> {
            self.push(Recorded::End);
            Ok(())
        }

        fn begin_render_pass(
            &self,
            render_pass: vk::RenderPass,
            _framebuffer: vk::Framebuffer,
            _extent: vk::Extent2D,
            clear_values: &[vk::ClearValue],
        ) {
            self.push(Recorded::BeginPass(render_pass.as_raw(), clear_values.len()));
        }

        fn end_render_pass(&self) {
            self.push(Recorded::EndPass);
        }

        fn set_viewport_and_scissor(&self, _extent: vk::Extent2D) {}

        fn bind_graphics_pipeline(&self, pipeline: vk::Pipeline) {
            self.push(Recorded::Pipeline(pipeline.as_raw()));
        }

        fn bind_descriptor_sets(
            &self,
            _layout: vk::PipelineLayout,
            _first_set: u32,
            _sets: &[vk::DescriptorSet],
        ) {
        }

        fn pipeline_barrier(
            &self,
            _src_stage: vk::PipelineStageFlags,
            _dst_stage: vk::PipelineStageFlags,
            image_barriers: &[vk::ImageMemoryBarrier<'_>],
        ) {
            self.push(Recorded::Barrier(
                image_barriers
                    .iter()
                    .map(|b| (b.image.as_raw(), b.new_layout))
                    .collect(),
            ));
        }

        fn draw(&self, vertex_count: u32) {
            self.push(Recorded::Draw(vertex_count));
        }
    }

    const OPAQUE_PASS: u64 = 1;
    const TRANSPARENCY_PASS: u64 = 2;
    const PRESENT_PASS: u64 = 3;
    const COLOR: u64 = 10;
    const DEPTH: u64 = 11;
    const ACCUM: u64 = 12;
    const REVEAL: u64 = 13;

    fn pass(raw: u64, clear_values: Vec<vk::ClearValue>) -> PassTarget {
        PassTarget {
            render_pass: vk::RenderPass::from_raw(raw),
            framebuffer: vk::Framebuffer::from_raw(raw + 100),
            extent: vk::Extent2D {
                width: 640,
                height: 480,
            },
            clear_values,
        }
    }

    fn plan() -> FramePlan {
        let barrier = |raw: u64, aspect: vk::ImageAspectFlags, transition| {
            image_barrier(vk::Image::from_raw(raw), aspect, transition)
        };
        let color = vk::ImageAspectFlags::COLOR;
        FramePlan {
            opaque: pass(OPAQUE_PASS, opaque_clear_values([0.0; 4], 2)),
            transparency: pass(TRANSPARENCY_PASS, transparency_clear_values().to_vec()),
            present: pass(PRESENT_PASS, present_clear_values([0.0; 4]).to_vec()),
            mesh_layout: vk::PipelineLayout::from_raw(20),
            composite_layout: vk::PipelineLayout::from_raw(21),
            opaque_pipeline: vk::Pipeline::from_raw(30),
            transparent_pipeline: vk::Pipeline::from_raw(31),
            composite_pipeline: vk::Pipeline::from_raw(32),
            frame_set: vk::DescriptorSet::from_raw(40),
            composite_set: vk::DescriptorSet::from_raw(41),
            opaque_handoff: [
                barrier(COLOR, color, LayoutTransition::COLOR_TO_SAMPLED),
                barrier(DEPTH, vk::ImageAspectFlags::DEPTH, DEPTH_HANDOFF),
            ],
            transparency_handoff: [
                barrier(ACCUM, color, LayoutTransition::COLOR_TO_SAMPLED),
                barrier(REVEAL, color, LayoutTransition::COLOR_TO_SAMPLED),
            ],
        }
    }

    fn record(draws: &DrawLists) -> Vec<Recorded> {
        let cmd = MockCommands::default();
        record_passes(&cmd, &plan(), draws, |cmd, item| {
            cmd.push(Recorded::Item(item.transparent))
        })
        .unwrap();
        cmd.log()
    }

    fn item(transparent: bool) -> DrawItem {
        DrawItem {
            model: 0,
            mesh: 0,
            world: Mat4::IDENTITY,
            distance: 1.0,
            transparent,
        }
    }

    #[test]
    fn test_depth_handoff_covers_resolve_writes() {
        assert!(
            DEPTH_HANDOFF
                .src_access
                .contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        );
        assert!(
            DEPTH_HANDOFF
                .src_access
                .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
        );
        assert_eq!(
            DEPTH_HANDOFF.new_layout,
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        );
        assert_eq!(
            DEPTH_HANDOFF.old_layout,
            LayoutTransition::DEPTH_TO_READ_ONLY.old_layout
        );
    }

    #[test]
    fn test_handoff_stages() {
        assert!(OPAQUE_WRITE_STAGES.contains(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT));
        assert!(OPAQUE_WRITE_STAGES.contains(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS));
        assert!(OPAQUE_READ_STAGES.contains(vk::PipelineStageFlags::FRAGMENT_SHADER));
        assert!(OPAQUE_READ_STAGES.contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS));
    }

    #[test]
    fn test_misclassified_transparent_items_are_counted() {
        let draws = DrawLists {
            opaque: vec![item(false)],
            transparent: vec![item(true), item(false), item(true)],
            dangling: 0,
        };
        assert_eq!(misclassified_transparent(&draws), 1);
        assert_eq!(misclassified_transparent(&DrawLists::new()), 0);
    }

    #[test]
    fn test_empty_transparent_list_still_records_transparency_pass() {
        let draws = DrawLists {
            opaque: vec![item(false)],
            transparent: Vec::new(),
            dangling: 0,
        };
        let log = record(&draws);

        let sampled = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
        let read_only = vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL;
        let expected = vec![
            Recorded::Begin,
            Recorded::BeginPass(OPAQUE_PASS, 2),
            Recorded::Pipeline(30),
            Recorded::Item(false),
            Recorded::EndPass,
            Recorded::Barrier(vec![(COLOR, sampled), (DEPTH, read_only)]),
            // Both OIT targets plus the loaded depth.
            Recorded::BeginPass(TRANSPARENCY_PASS, 3),
            Recorded::Pipeline(31),
            Recorded::EndPass,
            Recorded::Barrier(vec![(ACCUM, sampled), (REVEAL, sampled)]),
            Recorded::BeginPass(PRESENT_PASS, 1),
            Recorded::Pipeline(32),
            Recorded::Draw(3),
            Recorded::EndPass,
            Recorded::End,
        ];
        assert_eq!(log, expected);
    }

    #[test]
    fn test_items_are_drawn_inside_their_pass() {
        let draws = DrawLists {
            opaque: vec![item(false), item(false)],
            transparent: vec![item(true)],
            dangling: 0,
        };
        let log = record(&draws);

        let position = |entry: &Recorded| log.iter().position(|e| e == entry).unwrap();
        let transparency = position(&Recorded::BeginPass(TRANSPARENCY_PASS, 3));
        let present = position(&Recorded::BeginPass(PRESENT_PASS, 1));
        let opaque_items: Vec<usize> = log
            .iter()
            .enumerate()
            .filter(|(_, e)| **e == Recorded::Item(false))
            .map(|(i, _)| i)
            .collect();
        let transparent_item = position(&Recorded::Item(true));

        assert_eq!(opaque_items.len(), 2);
        assert!(opaque_items.iter().all(|&i| i < transparency));
        assert!(transparent_item > transparency && transparent_item < present);
    }

    #[test]
    fn test_depth_handoff_names_every_depth_plane() {
        let extent = vk::Extent2D {
            width: 64,
            height: 64,
        };
        for format in DEPTH_CANDIDATES {
            let descs = TargetDescs::new(extent, vk::SampleCountFlags::TYPE_4, format);
            let barrier = image_barrier(vk::Image::null(), descs.depth.aspect(), DEPTH_HANDOFF);
            let aspect = barrier.subresource_range.aspect_mask;
            assert!(aspect.contains(vk::ImageAspectFlags::DEPTH), "{:?}", format);
            assert_eq!(
                aspect.contains(vk::ImageAspectFlags::STENCIL),
                has_stencil(format),
                "{:?}",
                format
            );
        }
    }
}
