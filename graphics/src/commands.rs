//! Recorded frame commands.
//!
//! A frame is recorded into a [`CommandSequence`] — an ordered list of
//! [`RenderCommand`]s plus the frame-in-flight index — and handed to a
//! [`RenderDevice`](crate::device::RenderDevice) for execution. Keeping the
//! frame as data rather than immediate backend calls lets the test suite
//! assert on exact command order without touching a GPU, and keeps the
//! recorder backend-agnostic.

use marigold_core::mesh::{IndexFormat, PrimitiveTopology};

use crate::device::{BufferId, DescriptorSetId, PipelineId};
use crate::dynamic_state::LogicOp;
use crate::pipeline::PipelineVariant;
use crate::types::{ScissorRect, Viewport};
use crate::uniforms::PushConstantBlock;

/// One step of a recorded frame.
///
/// Commands carry both the backend handle and, where useful to observers,
/// the variant it resolves from, so a sequence is self-contained for
/// execution and still legible in tests and traces.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    /// Begin rendering into the frame's color and depth targets.
    BeginRendering {
        /// Color clear value.
        clear_color: [f32; 4],
        /// Depth clear value; 0.0 under the reversed-depth convention.
        clear_depth: f32,
    },
    /// Set the dynamic viewport.
    SetViewport(Viewport),
    /// Set the dynamic scissor rectangle.
    SetScissor(ScissorRect),
    /// Bind a pipeline.
    BindPipeline {
        /// Variant the handle was resolved from.
        variant: PipelineVariant,
        /// Backend pipeline handle.
        pipeline: PipelineId,
    },
    /// Bind the descriptor set for a variant's layout.
    BindDescriptorSet {
        /// Variant the set belongs to.
        variant: PipelineVariant,
        /// Backend descriptor-set handle.
        set: DescriptorSetId,
    },
    /// Set the dynamic framebuffer logic operation.
    SetLogicOp(LogicOp),
    /// Set the dynamic primitive topology.
    SetPrimitiveTopology(PrimitiveTopology),
    /// Toggle dynamic primitive restart.
    SetPrimitiveRestart(bool),
    /// Toggle dynamic rasterizer discard.
    SetRasterizerDiscard(bool),
    /// Toggle dynamic depth bias.
    SetDepthBiasEnable(bool),
    /// Upload the per-draw push-constant block.
    PushConstants(PushConstantBlock),
    /// Bind the two vertex streams: positions at slot 0, normals at slot 1.
    BindVertexBuffers {
        /// Position stream.
        positions: BufferId,
        /// Normal stream.
        normals: BufferId,
    },
    /// Bind the index buffer.
    BindIndexBuffer {
        /// Index buffer handle.
        buffer: BufferId,
        /// Element width.
        format: IndexFormat,
    },
    /// Issue one indexed, single-instance draw.
    DrawIndexed {
        /// Number of indices.
        index_count: u32,
    },
    /// End rendering into the frame's targets.
    EndRendering,
}

/// An ordered frame recording.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandSequence {
    frame_index: u32,
    commands: Vec<RenderCommand>,
}

impl CommandSequence {
    /// An empty sequence for `frame_index`. Executing it is a no-op.
    pub fn new(frame_index: u32) -> Self {
        Self {
            frame_index,
            commands: Vec::new(),
        }
    }

    /// Frame-in-flight index this recording targets.
    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    /// Append a command.
    pub fn push(&mut self, command: RenderCommand) {
        self.commands.push(command);
    }

    /// Recorded commands in execution order.
    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    /// Number of recorded commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of draw calls in the recording.
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, RenderCommand::DrawIndexed { .. }))
            .count()
    }

    /// Push-constant blocks in the order they were recorded.
    pub fn push_constant_blocks(&self) -> Vec<&PushConstantBlock> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                RenderCommand::PushConstants(block) => Some(block),
                _ => None,
            })
            .collect()
    }
}

static_assertions::assert_impl_all!(CommandSequence: Send, Sync);
