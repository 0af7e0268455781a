//! Per-frame command recording.
//!
//! [`FrameRecorder::record`] emits one frame's [`CommandSequence`] in a
//! fixed step order:
//!
//! 1. begin the render target (transparent-black color, 0.0 reversed depth)
//! 2. set viewport and scissor
//! 3. bind the object pipeline and its descriptor set
//! 4. apply the object pipeline's declared dynamic state at baseline
//!    values, including the currently selected logic operation
//! 5. draw every list entry in order, toggling per-object dynamic state
//!    where the entry requests it
//! 6. reset the transient toggles to their disabled baseline
//! 7. bind the background pipeline and its descriptor set, draw the proxy
//! 8. give the overlay hook its slot
//! 9. end the render target
//!
//! Every step runs unconditionally once the renderer is prepared; the only
//! branches are per-category "is this state dynamic on this device", so a
//! device without an optional capability simply sees no command for that
//! category. Recording builds data and cannot itself fail — errors surface
//! when the sequence is executed.

use crate::commands::{CommandSequence, RenderCommand};
use crate::device::{DescriptorSetId, GpuGeometry, PipelineId};
use crate::draw_list::DrawList;
use crate::dynamic_state::{DynamicStateSet, LogicOp};
use crate::pipeline::{PipelineTable, PipelineVariant};
use crate::types::{ScissorRect, Viewport};
use crate::uniforms::PushConstantBlock;

/// Clear color for the frame target: transparent black.
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 0.0];

/// Depth clear value. Zero is "farthest" under the reversed-depth
/// convention paired with a `Greater` compare.
pub const CLEAR_DEPTH: f32 = 0.0;

/// Records overlay draws into the frame after the background pass.
///
/// The recorder reserves a slot between the background draw and the end of
/// the target; an installed hook may append whatever commands it needs
/// there. Overlay draws are excluded from the renderer's own draw
/// accounting.
pub trait OverlayHook: Send + Sync {
    /// Append overlay commands to the current frame.
    fn record_overlay(&self, sequence: &mut CommandSequence);
}

/// Borrowed view of the prepared resources a frame is recorded from.
pub struct FrameRecorder<'a> {
    /// Compiled pipelines by variant.
    pub pipelines: &'a PipelineTable<PipelineId>,
    /// Declared dynamic-state sets by variant.
    pub dynamic_states: &'a PipelineTable<DynamicStateSet>,
    /// Descriptor sets by variant.
    pub descriptor_sets: &'a PipelineTable<DescriptorSetId>,
    /// Flattened object draws.
    pub draw_list: &'a DrawList,
    /// Uploaded background proxy geometry.
    pub background: &'a GpuGeometry,
    /// Current target viewport.
    pub viewport: Viewport,
    /// Current target scissor.
    pub scissor: ScissorRect,
    /// Logic operation selected for this frame's object pass.
    pub logic_op: LogicOp,
}

impl FrameRecorder<'_> {
    /// Record one frame.
    pub fn record(
        &self,
        frame_index: u32,
        overlay: Option<&dyn OverlayHook>,
    ) -> CommandSequence {
        let mut sequence = CommandSequence::new(frame_index);
        let dynamic = self.dynamic_states[PipelineVariant::Object];

        sequence.push(RenderCommand::BeginRendering {
            clear_color: CLEAR_COLOR,
            clear_depth: CLEAR_DEPTH,
        });
        sequence.push(RenderCommand::SetViewport(self.viewport));
        sequence.push(RenderCommand::SetScissor(self.scissor));

        self.bind_variant(&mut sequence, PipelineVariant::Object);
        self.apply_baseline(&mut sequence, dynamic);
        self.record_object_pass(&mut sequence, dynamic);
        self.reset_transient_toggles(&mut sequence, dynamic);

        self.bind_variant(&mut sequence, PipelineVariant::Background);
        self.draw_geometry(&mut sequence, self.background);

        if let Some(hook) = overlay {
            hook.record_overlay(&mut sequence);
        }

        sequence.push(RenderCommand::EndRendering);
        log::trace!(
            "recorded frame {frame_index}: {} commands, {} draws",
            sequence.len(),
            sequence.draw_count()
        );
        sequence
    }

    fn bind_variant(&self, sequence: &mut CommandSequence, variant: PipelineVariant) {
        sequence.push(RenderCommand::BindPipeline {
            variant,
            pipeline: self.pipelines[variant],
        });
        sequence.push(RenderCommand::BindDescriptorSet {
            variant,
            set: self.descriptor_sets[variant],
        });
    }

    /// Set every declared dynamic category to its baseline value. States a
    /// pipeline declares dynamic are undefined until set within the frame,
    /// so each one needs a value before the first draw; baked categories
    /// get no command at all.
    fn apply_baseline(&self, sequence: &mut CommandSequence, dynamic: DynamicStateSet) {
        if dynamic.contains(DynamicStateSet::LOGIC_OP) {
            sequence.push(RenderCommand::SetLogicOp(self.logic_op));
        }
        if dynamic.contains(DynamicStateSet::PRIMITIVE_TOPOLOGY) {
            sequence.push(RenderCommand::SetPrimitiveTopology(
                marigold_core::mesh::PrimitiveTopology::TriangleList,
            ));
        }
        if dynamic.contains(DynamicStateSet::PRIMITIVE_RESTART_ENABLE) {
            sequence.push(RenderCommand::SetPrimitiveRestart(false));
        }
        if dynamic.contains(DynamicStateSet::RASTERIZER_DISCARD_ENABLE) {
            sequence.push(RenderCommand::SetRasterizerDiscard(false));
        }
        if dynamic.contains(DynamicStateSet::DEPTH_BIAS_ENABLE) {
            sequence.push(RenderCommand::SetDepthBiasEnable(false));
        }
    }

    fn record_object_pass(&self, sequence: &mut CommandSequence, dynamic: DynamicStateSet) {
        let mut discard_enabled = false;
        let mut bias_enabled = false;

        for entry in self.draw_list.entries() {
            if dynamic.contains(DynamicStateSet::RASTERIZER_DISCARD_ENABLE)
                && entry.rasterizer_discard != discard_enabled
            {
                discard_enabled = entry.rasterizer_discard;
                sequence.push(RenderCommand::SetRasterizerDiscard(discard_enabled));
            }
            if dynamic.contains(DynamicStateSet::DEPTH_BIAS_ENABLE)
                && entry.depth_bias != bias_enabled
            {
                bias_enabled = entry.depth_bias;
                sequence.push(RenderCommand::SetDepthBiasEnable(bias_enabled));
            }

            sequence.push(RenderCommand::PushConstants(PushConstantBlock::new(
                entry.transform,
                entry.color,
            )));
            self.draw_geometry(sequence, &entry.geometry);
        }
    }

    /// Per-object toggles must not leak into the background pass or the
    /// next frame, so the loop always ends by putting them back at their
    /// disabled baseline.
    fn reset_transient_toggles(&self, sequence: &mut CommandSequence, dynamic: DynamicStateSet) {
        if dynamic.contains(DynamicStateSet::RASTERIZER_DISCARD_ENABLE) {
            sequence.push(RenderCommand::SetRasterizerDiscard(false));
        }
        if dynamic.contains(DynamicStateSet::DEPTH_BIAS_ENABLE) {
            sequence.push(RenderCommand::SetDepthBiasEnable(false));
        }
    }

    fn draw_geometry(&self, sequence: &mut CommandSequence, geometry: &GpuGeometry) {
        sequence.push(RenderCommand::BindVertexBuffers {
            positions: geometry.positions,
            normals: geometry.normals,
        });
        sequence.push(RenderCommand::BindIndexBuffer {
            buffer: geometry.indices,
            format: geometry.index_format,
        });
        sequence.push(RenderCommand::DrawIndexed {
            index_count: geometry.index_count,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{negotiate, DeviceFeatures};
    use crate::device::BufferId;
    use crate::draw_list::DrawEntry;
    use crate::pipeline::describe;
    use glam::{Mat4, Vec4};
    use marigold_core::mesh::{IndexFormat, PrimitiveTopology};

    fn fake_geometry(base: u32, index_count: u32) -> GpuGeometry {
        GpuGeometry {
            positions: BufferId::from_raw(base),
            normals: BufferId::from_raw(base + 1),
            indices: BufferId::from_raw(base + 2),
            index_format: IndexFormat::Uint16,
            index_count,
        }
    }

    fn entry(base: u32, index_count: u32) -> DrawEntry {
        DrawEntry {
            label: format!("entry-{base}"),
            transform: Mat4::from_translation(glam::Vec3::new(base as f32, 0.0, 0.0)),
            color: Vec4::ONE,
            geometry: fake_geometry(base, index_count),
            depth_bias: false,
            rasterizer_discard: false,
        }
    }

    fn draw_list(entries: Vec<DrawEntry>) -> DrawList {
        DrawList::from_entries(entries)
    }

    struct Fixture {
        pipelines: PipelineTable<PipelineId>,
        dynamic_states: PipelineTable<DynamicStateSet>,
        descriptor_sets: PipelineTable<DescriptorSetId>,
        background: GpuGeometry,
    }

    impl Fixture {
        fn new(features: DeviceFeatures) -> Self {
            let caps = negotiate(&features).unwrap();
            Self {
                pipelines: PipelineTable::from_fn(|v| PipelineId::from_raw(v.index() as u32)),
                dynamic_states: PipelineTable::from_fn(|v| describe(v, &caps).dynamic),
                descriptor_sets: PipelineTable::from_fn(|v| {
                    DescriptorSetId::from_raw(v.index() as u32)
                }),
                background: fake_geometry(90, 36),
            }
        }

        fn recorder<'a>(&'a self, list: &'a DrawList) -> FrameRecorder<'a> {
            FrameRecorder {
                pipelines: &self.pipelines,
                dynamic_states: &self.dynamic_states,
                descriptor_sets: &self.descriptor_sets,
                draw_list: list,
                background: &self.background,
                viewport: Viewport::from_extent(crate::types::Extent2d::new(1280, 720)),
                scissor: ScissorRect::from_extent(crate::types::Extent2d::new(1280, 720)),
                logic_op: LogicOp::Copy,
            }
        }
    }

    #[test]
    fn test_full_sequence_with_all_capabilities() {
        let fixture = Fixture::new(DeviceFeatures::all());
        let list = draw_list(vec![entry(0, 36), entry(10, 24), entry(20, 12)]);
        let sequence = fixture.recorder(&list).record(0, None);

        use RenderCommand::*;
        let kinds: Vec<&RenderCommand> = sequence.commands().iter().collect();
        let mut i = 0;
        let mut expect = |pred: &dyn Fn(&RenderCommand) -> bool, what: &str| {
            assert!(pred(kinds[i]), "command {i} should be {what}: {:?}", kinds[i]);
            i += 1;
        };

        expect(&|c| matches!(c, BeginRendering { clear_depth, .. } if *clear_depth == 0.0), "begin");
        expect(&|c| matches!(c, SetViewport(_)), "viewport");
        expect(&|c| matches!(c, SetScissor(_)), "scissor");
        expect(
            &|c| matches!(c, BindPipeline { variant: PipelineVariant::Object, .. }),
            "bind object pipeline",
        );
        expect(
            &|c| matches!(c, BindDescriptorSet { variant: PipelineVariant::Object, .. }),
            "bind object set",
        );
        expect(&|c| matches!(c, SetLogicOp(LogicOp::Copy)), "logic op");
        expect(
            &|c| matches!(c, SetPrimitiveTopology(PrimitiveTopology::TriangleList)),
            "topology baseline",
        );
        expect(&|c| matches!(c, SetPrimitiveRestart(false)), "restart baseline");
        expect(&|c| matches!(c, SetRasterizerDiscard(false)), "discard baseline");
        expect(&|c| matches!(c, SetDepthBiasEnable(false)), "bias baseline");
        for count in [36u32, 24, 12] {
            expect(&|c| matches!(c, PushConstants(_)), "push constants");
            expect(&|c| matches!(c, BindVertexBuffers { .. }), "vertex buffers");
            expect(&|c| matches!(c, BindIndexBuffer { .. }), "index buffer");
            expect(
                &move |c| matches!(c, DrawIndexed { index_count } if *index_count == count),
                "object draw",
            );
        }
        expect(&|c| matches!(c, SetRasterizerDiscard(false)), "discard reset");
        expect(&|c| matches!(c, SetDepthBiasEnable(false)), "bias reset");
        expect(
            &|c| matches!(c, BindPipeline { variant: PipelineVariant::Background, .. }),
            "bind background pipeline",
        );
        expect(
            &|c| matches!(c, BindDescriptorSet { variant: PipelineVariant::Background, .. }),
            "bind background set",
        );
        expect(&|c| matches!(c, BindVertexBuffers { .. }), "background vertices");
        expect(&|c| matches!(c, BindIndexBuffer { .. }), "background indices");
        expect(
            &|c| matches!(c, DrawIndexed { index_count: 36 }),
            "background draw",
        );
        expect(&|c| matches!(c, EndRendering), "end");
        assert_eq!(i, sequence.len(), "no trailing commands");
    }

    #[test]
    fn test_draw_count_is_entries_plus_background() {
        let fixture = Fixture::new(DeviceFeatures::all());
        for k in [0usize, 1, 5] {
            let list = draw_list((0..k).map(|n| entry(n as u32 * 10, 36)).collect());
            let sequence = fixture.recorder(&list).record(0, None);
            assert_eq!(sequence.draw_count(), k + 1);
        }
    }

    #[test]
    fn test_missing_capabilities_emit_no_dynamic_commands() {
        let fixture = Fixture::new(DeviceFeatures::logic_op_only());
        let list = draw_list(vec![{
            let mut e = entry(0, 36);
            e.depth_bias = true;
            e.rasterizer_discard = true;
            e
        }]);
        let sequence = fixture.recorder(&list).record(0, None);

        for command in sequence.commands() {
            assert!(
                !matches!(
                    command,
                    RenderCommand::SetPrimitiveTopology(_)
                        | RenderCommand::SetPrimitiveRestart(_)
                        | RenderCommand::SetRasterizerDiscard(_)
                        | RenderCommand::SetDepthBiasEnable(_)
                ),
                "baked category leaked into the stream: {command:?}"
            );
        }
        // Logic op stays dynamic even on the minimal device.
        assert!(sequence
            .commands()
            .iter()
            .any(|c| matches!(c, RenderCommand::SetLogicOp(_))));
    }

    #[test]
    fn test_transient_toggles_track_entries_and_reset() {
        let fixture = Fixture::new(DeviceFeatures::all());
        let mut first = entry(0, 36);
        first.depth_bias = true;
        let second = entry(10, 24);
        let list = draw_list(vec![first, second]);
        let sequence = fixture.recorder(&list).record(0, None);

        let bias_values: Vec<bool> = sequence
            .commands()
            .iter()
            .filter_map(|c| match c {
                RenderCommand::SetDepthBiasEnable(v) => Some(*v),
                _ => None,
            })
            .collect();
        // Baseline, enabled for the first entry, back off for the second,
        // and the unconditional post-loop reset.
        assert_eq!(bias_values, [false, true, false, false]);

        // Nothing after the background bind touches the toggles.
        let background_at = sequence
            .commands()
            .iter()
            .position(|c| {
                matches!(
                    c,
                    RenderCommand::BindPipeline {
                        variant: PipelineVariant::Background,
                        ..
                    }
                )
            })
            .unwrap();
        for command in &sequence.commands()[background_at..] {
            assert!(!matches!(
                command,
                RenderCommand::SetDepthBiasEnable(_) | RenderCommand::SetRasterizerDiscard(_)
            ));
        }
    }

    #[test]
    fn test_push_constants_follow_list_order() {
        let fixture = Fixture::new(DeviceFeatures::all());
        let list = draw_list(vec![entry(0, 36), entry(10, 24), entry(20, 12)]);
        let sequence = fixture.recorder(&list).record(0, None);

        let blocks = sequence.push_constant_blocks();
        assert_eq!(blocks.len(), 3);
        let xs: Vec<f32> = blocks.iter().map(|b| b.transform[3][0]).collect();
        assert_eq!(xs, [0.0, 10.0, 20.0]);
    }

    #[test]
    fn test_overlay_hook_slot_is_before_end() {
        struct MarkerOverlay;
        impl OverlayHook for MarkerOverlay {
            fn record_overlay(&self, sequence: &mut CommandSequence) {
                sequence.push(RenderCommand::DrawIndexed { index_count: 6 });
            }
        }

        let fixture = Fixture::new(DeviceFeatures::all());
        let list = draw_list(vec![entry(0, 36)]);
        let sequence = fixture.recorder(&list).record(0, Some(&MarkerOverlay));

        let commands = sequence.commands();
        assert!(matches!(commands[commands.len() - 1], RenderCommand::EndRendering));
        assert!(matches!(
            commands[commands.len() - 2],
            RenderCommand::DrawIndexed { index_count: 6 }
        ));
        // The overlay draw comes after the background draw.
        assert!(matches!(
            commands[commands.len() - 3],
            RenderCommand::DrawIndexed { index_count: 36 }
        ));
    }
}
