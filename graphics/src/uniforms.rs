//! GPU-visible parameter blocks.
//!
//! Plain `#[repr(C)]` structs uploaded byte-for-byte: the per-variant frame
//! uniform blocks refreshed when the camera moves, and the per-draw
//! push-constant block written immediately before each draw. All fields are
//! 16-byte aligned (matrices and vec4s only), so the std140 layout matches
//! the Rust layout with no padding.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

/// Frame uniforms for the object pass: camera matrices plus the static
/// light position. Written only when the camera changed, and always as a
/// whole block — projection and view are never updated separately.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct ObjectUniforms {
    /// Reversed-depth projection matrix, column-major.
    pub projection: [[f32; 4]; 4],
    /// View matrix, column-major.
    pub view: [[f32; 4]; 4],
    /// World-space light position (w unused).
    pub light_position: [f32; 4],
}

impl ObjectUniforms {
    /// Build from camera matrices and the scene light.
    pub fn new(projection: Mat4, view: Mat4, light_position: Vec4) -> Self {
        Self {
            projection: projection.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            light_position: light_position.to_array(),
        }
    }
}

/// Frame uniforms for the background pass: camera matrices only.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct BackgroundUniforms {
    /// Reversed-depth projection matrix, column-major.
    pub projection: [[f32; 4]; 4],
    /// View matrix, column-major.
    pub view: [[f32; 4]; 4],
}

impl BackgroundUniforms {
    /// Build from camera matrices.
    pub fn new(projection: Mat4, view: Mat4) -> Self {
        Self {
            projection: projection.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
        }
    }
}

/// Per-draw parameters pushed to the vertex stage at offset 0: the entry's
/// world transform and its material base color. Written for every draw and
/// never persisted.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct PushConstantBlock {
    /// World transform of the draw entry, column-major.
    pub transform: [[f32; 4]; 4],
    /// Base color factor of the entry's material.
    pub color: [f32; 4],
}

impl PushConstantBlock {
    /// Build from a draw entry's transform and material color.
    pub fn new(transform: Mat4, color: Vec4) -> Self {
        Self {
            transform: transform.to_cols_array_2d(),
            color: color.to_array(),
        }
    }
}
