//! Uniform and descriptor ownership.
//!
//! The [`ResourceBinder`] owns everything the two pipelines bind: one
//! uniform buffer per variant, the background environment texture with its
//! sampler, and the per-variant binding layouts and descriptor sets. It is
//! also the only writer of the uniform buffers — [`refresh`] uploads the
//! camera matrices into both blocks together, exactly once per camera
//! change, keyed off the camera's dirty flag.
//!
//! [`refresh`]: ResourceBinder::refresh

use std::mem::size_of;

use glam::Vec4;

use marigold_core::camera::Camera;
use marigold_core::texture::CpuTexture;

use crate::bindings::BindingLayout;
use crate::device::{
    BindingLayoutId, BoundResource, BufferDesc, BufferId, BufferUsage, DescriptorSetId,
    RenderDevice, SamplerDesc, SamplerId, TextureId,
};
use crate::error::RenderError;
use crate::pipeline::{PipelineTable, PipelineVariant};
use crate::uniforms::{BackgroundUniforms, ObjectUniforms};

/// Owns uniform buffers, the environment texture, and descriptor sets.
#[derive(Debug)]
pub struct ResourceBinder {
    uniform_buffers: PipelineTable<BufferId>,
    layouts: PipelineTable<BindingLayoutId>,
    sets: PipelineTable<DescriptorSetId>,
    environment: TextureId,
    environment_sampler: SamplerId,
    light_position: Vec4,
    destroyed: bool,
}

impl ResourceBinder {
    /// Create every bindable resource up front.
    ///
    /// The uniform buffers stay unwritten until the first [`refresh`]; a
    /// freshly constructed camera is marked updated, so preparation always
    /// performs that first upload before any frame is recorded.
    ///
    /// A creation failure at any stage releases whatever earlier stages
    /// built, so an `Err` from here leaves the device untouched.
    ///
    /// [`refresh`]: Self::refresh
    pub fn create(
        device: &dyn RenderDevice,
        environment: &CpuTexture,
        light_position: Vec4,
    ) -> Result<Self, RenderError> {
        let mut created_buffers = Vec::new();
        let uniform_buffers = match PipelineTable::try_from_fn(|variant| {
            let (label, size) = match variant {
                PipelineVariant::Object => {
                    ("object uniforms", size_of::<ObjectUniforms>() as u64)
                }
                PipelineVariant::Background => {
                    ("background uniforms", size_of::<BackgroundUniforms>() as u64)
                }
            };
            let buffer = device.create_buffer(&BufferDesc {
                label: label.to_string(),
                size,
                usage: BufferUsage::Uniform,
            })?;
            created_buffers.push(buffer);
            Ok(buffer)
        }) {
            Ok(table) => table,
            Err(err) => {
                Self::release_created(device, &created_buffers, None, None, &[], &[]);
                return Err(err);
            }
        };

        let environment_texture = match device.create_texture(environment) {
            Ok(texture) => texture,
            Err(err) => {
                Self::release_created(device, &created_buffers, None, None, &[], &[]);
                return Err(err);
            }
        };

        let environment_sampler = match device.create_sampler(&SamplerDesc::default()) {
            Ok(sampler) => sampler,
            Err(err) => {
                Self::release_created(
                    device,
                    &created_buffers,
                    Some(environment_texture),
                    None,
                    &[],
                    &[],
                );
                return Err(err);
            }
        };

        let mut created_layouts = Vec::new();
        let layouts = match PipelineTable::try_from_fn(|variant| {
            let layout = match variant {
                PipelineVariant::Object => BindingLayout::object(),
                PipelineVariant::Background => BindingLayout::background(),
            };
            let id = device.create_binding_layout(&layout)?;
            created_layouts.push(id);
            Ok(id)
        }) {
            Ok(table) => table,
            Err(err) => {
                Self::release_created(
                    device,
                    &created_buffers,
                    Some(environment_texture),
                    Some(environment_sampler),
                    &created_layouts,
                    &[],
                );
                return Err(err);
            }
        };

        let mut created_sets = Vec::new();
        let sets = match PipelineTable::try_from_fn(|variant| {
            let resources = match variant {
                PipelineVariant::Object => {
                    vec![BoundResource::UniformBuffer(uniform_buffers[variant])]
                }
                PipelineVariant::Background => vec![
                    BoundResource::UniformBuffer(uniform_buffers[variant]),
                    BoundResource::CombinedImageSampler {
                        texture: environment_texture,
                        sampler: environment_sampler,
                    },
                ],
            };
            let id = device.create_descriptor_set(layouts[variant], &resources)?;
            created_sets.push(id);
            Ok(id)
        }) {
            Ok(table) => table,
            Err(err) => {
                Self::release_created(
                    device,
                    &created_buffers,
                    Some(environment_texture),
                    Some(environment_sampler),
                    &created_layouts,
                    &created_sets,
                );
                return Err(err);
            }
        };

        log::debug!("resource binder created (light at {light_position})");
        Ok(Self {
            uniform_buffers,
            layouts,
            sets,
            environment: environment_texture,
            environment_sampler,
            light_position,
            destroyed: false,
        })
    }

    /// Failure-path release for whatever `create` managed to build, in
    /// reverse creation order.
    fn release_created(
        device: &dyn RenderDevice,
        buffers: &[BufferId],
        texture: Option<TextureId>,
        sampler: Option<SamplerId>,
        layouts: &[BindingLayoutId],
        sets: &[DescriptorSetId],
    ) {
        for set in sets {
            device.destroy_descriptor_set(*set);
        }
        for layout in layouts {
            device.destroy_binding_layout(*layout);
        }
        if let Some(sampler) = sampler {
            device.destroy_sampler(sampler);
        }
        if let Some(texture) = texture {
            device.destroy_texture(texture);
        }
        for buffer in buffers {
            device.destroy_buffer(*buffer);
        }
    }

    /// Upload the camera matrices if the camera changed, clearing its flag.
    ///
    /// Both uniform blocks are written from the same matrices in the same
    /// call, so the object and background passes can never observe a frame
    /// where only one of them advanced. Returns whether an upload happened.
    pub fn refresh(
        &mut self,
        device: &dyn RenderDevice,
        camera: &mut Camera,
    ) -> Result<bool, RenderError> {
        if !camera.updated() {
            log::trace!("camera unchanged, skipping uniform refresh");
            return Ok(false);
        }

        let projection = camera.projection_matrix();
        let view = camera.view_matrix();

        let object = ObjectUniforms::new(projection, view, self.light_position);
        device.write_buffer(
            self.uniform_buffers[PipelineVariant::Object],
            bytemuck::bytes_of(&object),
        )?;

        let background = BackgroundUniforms::new(projection, view);
        device.write_buffer(
            self.uniform_buffers[PipelineVariant::Background],
            bytemuck::bytes_of(&background),
        )?;

        camera.clear_updated();
        log::debug!("uniform blocks refreshed from camera");
        Ok(true)
    }

    /// Binding layout handle for `variant`, used at pipeline creation.
    pub fn layout(&self, variant: PipelineVariant) -> BindingLayoutId {
        self.layouts[variant]
    }

    /// Descriptor set bound for `variant`'s draws.
    pub fn descriptor_set(&self, variant: PipelineVariant) -> DescriptorSetId {
        self.sets[variant]
    }

    /// Full descriptor-set table, borrowed by the frame recorder.
    pub fn descriptor_sets(&self) -> &PipelineTable<DescriptorSetId> {
        &self.sets
    }

    /// Uniform buffer backing `variant`'s block.
    pub fn uniform_buffer(&self, variant: PipelineVariant) -> BufferId {
        self.uniform_buffers[variant]
    }

    /// Release every owned resource. Safe to call more than once.
    pub fn destroy(&mut self, device: &dyn RenderDevice) {
        if self.destroyed {
            return;
        }
        for (_, set) in self.sets.iter() {
            device.destroy_descriptor_set(*set);
        }
        for (_, layout) in self.layouts.iter() {
            device.destroy_binding_layout(*layout);
        }
        device.destroy_sampler(self.environment_sampler);
        device.destroy_texture(self.environment);
        for (_, buffer) in self.uniform_buffers.iter() {
            device.destroy_buffer(*buffer);
        }
        self.destroyed = true;
        log::debug!("resource binder destroyed");
    }
}

impl Drop for ResourceBinder {
    fn drop(&mut self) {
        if !self.destroyed {
            log::warn!("resource binder dropped without destroy, leaking device resources");
        }
    }
}
