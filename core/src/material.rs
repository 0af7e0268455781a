//! CPU-side material data.
//!
//! The renderer's per-draw parameters are deliberately small: each submesh
//! carries a material whose base color factor is pushed alongside the
//! transform for every draw. There is no binding-slot machinery here; the
//! factor travels through push constants.

use glam::Vec4;

/// A material exposing a base color factor.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Human-readable name for debugging.
    pub name: Option<String>,
    /// RGBA base color factor, non-premultiplied.
    pub base_color: Vec4,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: None,
            base_color: Vec4::ONE,
        }
    }
}

impl Material {
    /// Create a material with the given base color.
    pub fn new(base_color: Vec4) -> Self {
        Self {
            name: None,
            base_color,
        }
    }

    /// Set a debug name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Base color as a plain float array for GPU upload.
    pub fn base_color_array(&self) -> [f32; 4] {
        self.base_color.to_array()
    }
}
