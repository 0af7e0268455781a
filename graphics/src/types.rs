//! Common types shared across the renderer.

// ============================================================================
// Extent
// ============================================================================

/// Render target size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent2d {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Extent2d {
    /// Create a new extent.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width / height as f32, guarding against zero height.
    pub fn aspect(&self) -> f32 {
        self.width as f32 / (self.height.max(1)) as f32
    }
}

impl Default for Extent2d {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

// ============================================================================
// Viewport
// ============================================================================

/// Viewport configuration for rendering.
///
/// Coordinates follow the Vulkan convention: origin at the top-left corner,
/// depth range `[0, 1]`. The renderer's projection matrices are reversed-depth,
/// which only changes what the depth values *mean* — the viewport depth range
/// stays `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// X coordinate of the viewport's top-left corner.
    pub x: f32,
    /// Y coordinate of the viewport's top-left corner.
    pub y: f32,
    /// Width of the viewport.
    pub width: f32,
    /// Height of the viewport.
    pub height: f32,
    /// Minimum depth value.
    pub min_depth: f32,
    /// Maximum depth value.
    pub max_depth: f32,
}

impl Viewport {
    /// Create a viewport with the standard `[0, 1]` depth range.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// Full-target viewport with origin at (0, 0).
    pub fn from_extent(extent: Extent2d) -> Self {
        Self::new(0.0, 0.0, extent.width as f32, extent.height as f32)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }
}

// ============================================================================
// Scissor Rectangle
// ============================================================================

/// Scissor rectangle clipping rendering; pixels outside are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScissorRect {
    /// X coordinate of the top-left corner.
    pub x: i32,
    /// Y coordinate of the top-left corner.
    pub y: i32,
    /// Width of the scissor rectangle.
    pub width: u32,
    /// Height of the scissor rectangle.
    pub height: u32,
}

impl ScissorRect {
    /// Create a new scissor rectangle.
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Full-target scissor with origin at (0, 0).
    pub fn from_extent(extent: Extent2d) -> Self {
        Self::new(0, 0, extent.width, extent.height)
    }
}
