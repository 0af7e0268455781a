//! Host-memory device for tests and headless runs.
//!
//! [`DummyDevice`] implements [`RenderDevice`] without any GPU: resources
//! live in slot arenas behind a mutex, buffer writes land in host vectors,
//! and executed command sequences are journaled. Tests inspect the journal
//! and the per-buffer write counters to assert on recording order and
//! refresh behavior; a headless demo can run a full frame loop on it.

use parking_lot::Mutex;

use marigold_core::texture::CpuTexture;

use crate::bindings::{BindingLayout, BindingType};
use crate::capability::DeviceFeatures;
use crate::commands::{CommandSequence, RenderCommand};
use crate::device::{
    BindingLayoutId, BoundResource, BufferDesc, BufferId, DescriptorSetId, PipelineId,
    RenderDevice, SamplerDesc, SamplerId, TextureId,
};
use crate::error::RenderError;
use crate::pipeline::{PipelineDescription, ShaderSet};

#[derive(Debug)]
struct DummyBuffer {
    label: String,
    size: u64,
    data: Vec<u8>,
    write_count: u32,
}

#[derive(Debug)]
struct DummyDescriptorSet {
    layout: BindingLayoutId,
    resources: Vec<BoundResource>,
}

#[derive(Debug, Default)]
struct DummyState {
    buffers: Vec<Option<DummyBuffer>>,
    textures: Vec<Option<CpuTexture>>,
    samplers: Vec<Option<SamplerDesc>>,
    layouts: Vec<Option<BindingLayout>>,
    sets: Vec<Option<DummyDescriptorSet>>,
    pipelines: Vec<Option<PipelineDescription>>,
    executed: Vec<CommandSequence>,
}

fn slot_index<T>(arena: &[Option<T>], raw: u32, kind: &str) -> Result<usize, RenderError> {
    let index = raw as usize;
    match arena.get(index) {
        Some(Some(_)) => Ok(index),
        _ => Err(RenderError::InvalidParameter(format!(
            "{kind} {raw} is not alive"
        ))),
    }
}

fn live_count<T>(arena: &[Option<T>]) -> usize {
    arena.iter().filter(|slot| slot.is_some()).count()
}

/// In-memory [`RenderDevice`] with a command journal.
pub struct DummyDevice {
    features: DeviceFeatures,
    state: Mutex<DummyState>,
}

impl DummyDevice {
    /// Device advertising every dynamic-state feature.
    pub fn new() -> Self {
        Self::with_features(DeviceFeatures::all())
    }

    /// Device advertising exactly `features`.
    pub fn with_features(features: DeviceFeatures) -> Self {
        Self {
            features,
            state: Mutex::new(DummyState::default()),
        }
    }

    /// Times `buffer` has been written since creation.
    pub fn buffer_write_count(&self, buffer: BufferId) -> u32 {
        let state = self.state.lock();
        state
            .buffers
            .get(buffer.to_raw() as usize)
            .and_then(Option::as_ref)
            .map(|b| b.write_count)
            .unwrap_or(0)
    }

    /// Current contents of `buffer`, if it is alive.
    pub fn buffer_data(&self, buffer: BufferId) -> Option<Vec<u8>> {
        let state = self.state.lock();
        state
            .buffers
            .get(buffer.to_raw() as usize)
            .and_then(Option::as_ref)
            .map(|b| b.data.clone())
    }

    /// Id of the live buffer labelled `label`, if any.
    pub fn buffer_by_label(&self, label: &str) -> Option<BufferId> {
        let state = self.state.lock();
        state.buffers.iter().enumerate().find_map(|(index, slot)| {
            slot.as_ref()
                .filter(|b| b.label == label)
                .map(|_| BufferId::from_raw(index as u32))
        })
    }

    /// All executed sequences in submission order.
    pub fn executed_sequences(&self) -> Vec<CommandSequence> {
        self.state.lock().executed.clone()
    }

    /// The most recently executed sequence.
    pub fn last_sequence(&self) -> Option<CommandSequence> {
        self.state.lock().executed.last().cloned()
    }

    /// Number of sequences executed so far.
    pub fn execution_count(&self) -> usize {
        self.state.lock().executed.len()
    }

    /// Total live resources across every arena. Zero after a full teardown.
    pub fn live_resource_count(&self) -> usize {
        let state = self.state.lock();
        live_count(&state.buffers)
            + live_count(&state.textures)
            + live_count(&state.samplers)
            + live_count(&state.layouts)
            + live_count(&state.sets)
            + live_count(&state.pipelines)
    }

    /// Resources written into `set` at creation, in binding order.
    pub fn descriptor_set_resources(&self, set: DescriptorSetId) -> Option<Vec<BoundResource>> {
        let state = self.state.lock();
        state
            .sets
            .get(set.to_raw() as usize)
            .and_then(Option::as_ref)
            .map(|s| s.resources.clone())
    }

    /// Layout `set` was allocated over.
    pub fn descriptor_set_layout(&self, set: DescriptorSetId) -> Option<BindingLayoutId> {
        let state = self.state.lock();
        state
            .sets
            .get(set.to_raw() as usize)
            .and_then(Option::as_ref)
            .map(|s| s.layout)
    }

    /// Description a pipeline was created with.
    pub fn pipeline_description(&self, pipeline: PipelineId) -> Option<PipelineDescription> {
        let state = self.state.lock();
        state
            .pipelines
            .get(pipeline.to_raw() as usize)
            .and_then(Option::as_ref)
            .cloned()
    }

    fn validate_sequence(
        &self,
        state: &DummyState,
        sequence: &CommandSequence,
    ) -> Result<(), RenderError> {
        for command in sequence.commands() {
            match command {
                RenderCommand::BindPipeline { pipeline, .. } => {
                    slot_index(&state.pipelines, pipeline.to_raw(), "pipeline")?;
                }
                RenderCommand::BindDescriptorSet { set, .. } => {
                    slot_index(&state.sets, set.to_raw(), "descriptor set")?;
                }
                RenderCommand::BindVertexBuffers { positions, normals } => {
                    slot_index(&state.buffers, positions.to_raw(), "buffer")?;
                    slot_index(&state.buffers, normals.to_raw(), "buffer")?;
                }
                RenderCommand::BindIndexBuffer { buffer, .. } => {
                    slot_index(&state.buffers, buffer.to_raw(), "buffer")?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DummyDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DummyDevice")
            .field("features", &self.features)
            .field("live_buffers", &live_count(&state.buffers))
            .field("live_pipelines", &live_count(&state.pipelines))
            .field("executed", &state.executed.len())
            .finish()
    }
}

impl RenderDevice for DummyDevice {
    fn name(&self) -> &str {
        "dummy"
    }

    fn features(&self) -> DeviceFeatures {
        self.features
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferId, RenderError> {
        if desc.size == 0 {
            return Err(RenderError::InvalidParameter(format!(
                "buffer '{}' has zero size",
                desc.label
            )));
        }
        let mut state = self.state.lock();
        let id = BufferId::from_raw(state.buffers.len() as u32);
        log::trace!("dummy: create buffer '{}' ({} bytes)", desc.label, desc.size);
        state.buffers.push(Some(DummyBuffer {
            label: desc.label.clone(),
            size: desc.size,
            data: vec![0; desc.size as usize],
            write_count: 0,
        }));
        Ok(id)
    }

    fn write_buffer(&self, buffer: BufferId, data: &[u8]) -> Result<(), RenderError> {
        let mut state = self.state.lock();
        let slot = state
            .buffers
            .get_mut(buffer.to_raw() as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| {
                RenderError::InvalidParameter(format!("buffer {} is not alive", buffer.to_raw()))
            })?;
        if data.len() as u64 > slot.size {
            return Err(RenderError::InvalidParameter(format!(
                "write of {} bytes exceeds buffer '{}' of {} bytes",
                data.len(),
                slot.label,
                slot.size
            )));
        }
        slot.data[..data.len()].copy_from_slice(data);
        slot.write_count += 1;
        log::trace!(
            "dummy: write {} bytes to '{}' (write #{})",
            data.len(),
            slot.label,
            slot.write_count
        );
        Ok(())
    }

    fn create_texture(&self, texture: &CpuTexture) -> Result<TextureId, RenderError> {
        let mut state = self.state.lock();
        let id = TextureId::from_raw(state.textures.len() as u32);
        log::trace!(
            "dummy: create texture {}x{}",
            texture.width(),
            texture.height()
        );
        state.textures.push(Some(texture.clone()));
        Ok(id)
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<SamplerId, RenderError> {
        let mut state = self.state.lock();
        let id = SamplerId::from_raw(state.samplers.len() as u32);
        state.samplers.push(Some(*desc));
        Ok(id)
    }

    fn create_binding_layout(
        &self,
        layout: &BindingLayout,
    ) -> Result<BindingLayoutId, RenderError> {
        let mut state = self.state.lock();
        let id = BindingLayoutId::from_raw(state.layouts.len() as u32);
        log::trace!(
            "dummy: create binding layout '{}' ({} entries)",
            layout.label,
            layout.entries.len()
        );
        state.layouts.push(Some(layout.clone()));
        Ok(id)
    }

    fn create_descriptor_set(
        &self,
        layout: BindingLayoutId,
        resources: &[BoundResource],
    ) -> Result<DescriptorSetId, RenderError> {
        let mut state = self.state.lock();
        let entries = &state
            .layouts
            .get(layout.to_raw() as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                RenderError::InvalidParameter(format!(
                    "binding layout {} is not alive",
                    layout.to_raw()
                ))
            })?
            .entries;
        if entries.len() != resources.len() {
            return Err(RenderError::InvalidParameter(format!(
                "descriptor set supplies {} resources for a layout of {} entries",
                resources.len(),
                entries.len()
            )));
        }
        for (entry, resource) in entries.iter().zip(resources) {
            let matches = match (entry.binding_type, resource) {
                (BindingType::UniformBuffer, BoundResource::UniformBuffer(_)) => true,
                (
                    BindingType::CombinedImageSampler,
                    BoundResource::CombinedImageSampler { .. },
                ) => true,
                _ => false,
            };
            if !matches {
                return Err(RenderError::InvalidParameter(format!(
                    "resource bound at {} does not match the layout entry type",
                    entry.binding
                )));
            }
        }
        for resource in resources {
            match resource {
                BoundResource::UniformBuffer(buffer) => {
                    slot_index(&state.buffers, buffer.to_raw(), "buffer")?;
                }
                BoundResource::CombinedImageSampler { texture, sampler } => {
                    slot_index(&state.textures, texture.to_raw(), "texture")?;
                    slot_index(&state.samplers, sampler.to_raw(), "sampler")?;
                }
            }
        }
        let id = DescriptorSetId::from_raw(state.sets.len() as u32);
        state.sets.push(Some(DummyDescriptorSet {
            layout,
            resources: resources.to_vec(),
        }));
        Ok(id)
    }

    fn create_pipeline(
        &self,
        desc: &PipelineDescription,
        _shaders: &ShaderSet,
        layout: BindingLayoutId,
    ) -> Result<PipelineId, RenderError> {
        let mut state = self.state.lock();
        slot_index(&state.layouts, layout.to_raw(), "binding layout")?;
        let id = PipelineId::from_raw(state.pipelines.len() as u32);
        log::trace!(
            "dummy: create {} pipeline (dynamic: {:?})",
            desc.variant.name(),
            desc.dynamic
        );
        state.pipelines.push(Some(desc.clone()));
        Ok(id)
    }

    fn execute(&self, sequence: &CommandSequence) -> Result<(), RenderError> {
        if sequence.is_empty() {
            return Ok(());
        }
        let mut state = self.state.lock();
        self.validate_sequence(&state, sequence)?;
        log::trace!(
            "dummy: execute frame {} ({} commands, {} draws)",
            sequence.frame_index(),
            sequence.len(),
            sequence.draw_count()
        );
        state.executed.push(sequence.clone());
        Ok(())
    }

    fn wait_idle(&self) {}

    fn destroy_buffer(&self, buffer: BufferId) {
        if let Some(slot) = self.state.lock().buffers.get_mut(buffer.to_raw() as usize) {
            *slot = None;
        }
    }

    fn destroy_texture(&self, texture: TextureId) {
        if let Some(slot) = self.state.lock().textures.get_mut(texture.to_raw() as usize) {
            *slot = None;
        }
    }

    fn destroy_sampler(&self, sampler: SamplerId) {
        if let Some(slot) = self.state.lock().samplers.get_mut(sampler.to_raw() as usize) {
            *slot = None;
        }
    }

    fn destroy_binding_layout(&self, layout: BindingLayoutId) {
        if let Some(slot) = self.state.lock().layouts.get_mut(layout.to_raw() as usize) {
            *slot = None;
        }
    }

    fn destroy_descriptor_set(&self, set: DescriptorSetId) {
        if let Some(slot) = self.state.lock().sets.get_mut(set.to_raw() as usize) {
            *slot = None;
        }
    }

    fn destroy_pipeline(&self, pipeline: PipelineId) {
        if let Some(slot) = self.state.lock().pipelines.get_mut(pipeline.to_raw() as usize) {
            *slot = None;
        }
    }
}

static_assertions::assert_impl_all!(DummyDevice: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::BufferUsage;

    fn uniform_desc(size: u64) -> BufferDesc {
        BufferDesc {
            label: "test".to_string(),
            size,
            usage: BufferUsage::Uniform,
        }
    }

    #[test]
    fn test_buffer_write_counting() {
        let device = DummyDevice::new();
        let buffer = device.create_buffer(&uniform_desc(16)).unwrap();
        assert_eq!(device.buffer_write_count(buffer), 0);

        device.write_buffer(buffer, &[1; 16]).unwrap();
        device.write_buffer(buffer, &[2; 8]).unwrap();
        assert_eq!(device.buffer_write_count(buffer), 2);
        assert_eq!(device.buffer_data(buffer).unwrap()[..8], [2; 8]);
    }

    #[test]
    fn test_buffer_lookup_by_label() {
        let device = DummyDevice::new();
        device.create_buffer(&uniform_desc(16)).unwrap();
        let named = device
            .create_buffer(&BufferDesc {
                label: "camera block".to_string(),
                size: 64,
                usage: BufferUsage::Uniform,
            })
            .unwrap();
        assert_eq!(device.buffer_by_label("camera block"), Some(named));
        assert_eq!(device.buffer_by_label("missing"), None);

        device.destroy_buffer(named);
        assert_eq!(device.buffer_by_label("camera block"), None);
    }

    #[test]
    fn test_zero_sized_buffer_is_rejected() {
        let device = DummyDevice::new();
        assert!(matches!(
            device.create_buffer(&uniform_desc(0)),
            Err(RenderError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_oversized_write_is_rejected() {
        let device = DummyDevice::new();
        let buffer = device.create_buffer(&uniform_desc(4)).unwrap();
        assert!(matches!(
            device.write_buffer(buffer, &[0; 8]),
            Err(RenderError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_descriptor_set_shape_is_validated() {
        let device = DummyDevice::new();
        let layout = device
            .create_binding_layout(&BindingLayout::object())
            .unwrap();

        // Too few resources.
        assert!(device.create_descriptor_set(layout, &[]).is_err());

        // Wrong resource kind for the uniform slot.
        let texture = device
            .create_texture(&CpuTexture::solid(1, 1, [0; 4]))
            .unwrap();
        let sampler = device.create_sampler(&SamplerDesc::default()).unwrap();
        assert!(device
            .create_descriptor_set(
                layout,
                &[BoundResource::CombinedImageSampler { texture, sampler }]
            )
            .is_err());
    }

    #[test]
    fn test_destroy_frees_slots() {
        let device = DummyDevice::new();
        let buffer = device.create_buffer(&uniform_desc(16)).unwrap();
        assert_eq!(device.live_resource_count(), 1);
        device.destroy_buffer(buffer);
        assert_eq!(device.live_resource_count(), 0);
        assert!(device.write_buffer(buffer, &[0; 4]).is_err());
    }

    #[test]
    fn test_execute_journals_sequences() {
        let device = DummyDevice::new();

        // Empty sequences are a no-op and never reach the journal.
        device.execute(&CommandSequence::new(0)).unwrap();
        assert_eq!(device.execution_count(), 0);

        let mut sequence = CommandSequence::new(1);
        sequence.push(RenderCommand::EndRendering);
        device.execute(&sequence).unwrap();
        assert_eq!(device.execution_count(), 1);
        assert_eq!(device.last_sequence().unwrap().frame_index(), 1);
    }

    #[test]
    fn test_execute_rejects_dead_handles() {
        let device = DummyDevice::new();
        let mut sequence = CommandSequence::new(0);
        sequence.push(RenderCommand::BindIndexBuffer {
            buffer: BufferId::from_raw(42),
            format: marigold_core::mesh::IndexFormat::Uint16,
        });
        assert!(matches!(
            device.execute(&sequence),
            Err(RenderError::InvalidParameter(_))
        ));
    }
}
