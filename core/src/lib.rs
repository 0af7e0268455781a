//! # Marigold Core
//!
//! CPU-side, GPU-agnostic data for the Marigold renderer:
//!
//! - [`camera::Camera`] - Look-at camera with reversed-depth projection and
//!   a dirty flag consumed by the renderer's uniform refresh
//! - [`mesh::CpuMesh`] - Raw position/normal/index geometry
//! - [`material::Material`] - Base-color material factors
//! - [`texture::CpuTexture`] - RGBA8 pixel data for the background sampler
//! - [`scene::Scene`] - Meshes, instance nodes, and the background proxy
//!
//! Nothing in this crate touches a GPU; `marigold-graphics` consumes these
//! types through its device abstraction.

pub mod camera;
pub mod material;
pub mod mesh;
pub mod scene;
pub mod texture;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the core crate version at startup.
pub fn init() {
    log::info!("Marigold Core v{} initialized", VERSION);
}
