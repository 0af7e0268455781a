//! # Marigold Graphics
//!
//! Renderer core for Marigold built around extended dynamic pipeline state.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`Renderer`] - Lifecycle state machine: prepare, record frames, teardown
//! - [`capability`] - Negotiation of dynamic-state features against a device
//! - [`pipeline`] - The two pipeline variants and their fixed-function state
//! - [`recorder`] - Per-frame command recording with declarative dynamic state
//! - [`device`] - Backend abstraction: Vulkan and Dummy (for testing)
//!
//! ## Example
//!
//! ```ignore
//! use marigold_graphics::{Renderer, RendererConfig};
//!
//! let mut renderer = Renderer::new(device, RendererConfig::default());
//! renderer.prepare(&scene)?;
//! renderer.render(0)?;
//! renderer.teardown();
//! ```

pub mod binder;
pub mod bindings;
pub mod capability;
pub mod commands;
pub mod device;
pub mod draw_list;
pub mod dynamic_state;
pub mod error;
pub mod pipeline;
pub mod recorder;
pub mod renderer;
pub mod types;
pub mod uniforms;

// Re-export main types for convenience
pub use capability::{negotiate, DeviceFeatures, DynamicCapabilities};
pub use commands::{CommandSequence, RenderCommand};
pub use device::RenderDevice;
pub use draw_list::{DrawEntry, DrawList};
pub use dynamic_state::{DynamicStateSet, LogicOp};
pub use error::RenderError;
pub use pipeline::{PipelineTable, PipelineVariant, ShaderSet};
pub use recorder::OverlayHook;
pub use renderer::{Renderer, RendererConfig, RendererState};
pub use types::{Extent2d, ScissorRect, Viewport};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
///
/// This should be called before using any graphics functionality.
pub fn init() {
    log::info!("Marigold Graphics v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_negotiation_with_full_features() {
        let capabilities = negotiate(&DeviceFeatures::all()).unwrap();
        assert!(!capabilities.optional_states().is_empty());
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_dummy_device() {
        use crate::device::dummy::DummyDevice;
        let device = DummyDevice::new();
        assert_eq!(device.name(), "dummy");
    }
}
