//! CPU-side texture data.
//!
//! [`CpuTexture`] holds raw RGBA8 pixels for upload by a device backend.
//! The renderer uses exactly one texture: the environment image sampled by
//! the background pass.

/// Bytes per RGBA8 pixel.
pub const RGBA8_PIXEL_SIZE: usize = 4;

/// An RGBA8 texture held in CPU memory.
#[derive(Clone, PartialEq, Eq)]
pub struct CpuTexture {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    label: Option<String>,
}

impl CpuTexture {
    /// Create a texture from raw RGBA8 pixel data.
    ///
    /// `pixels` length must be `width * height * 4`.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(
            pixels.len(),
            width as usize * height as usize * RGBA8_PIXEL_SIZE,
            "pixel data length must match extent"
        );
        Self {
            width,
            height,
            pixels,
            label: None,
        }
    }

    /// Create a single-color texture.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * RGBA8_PIXEL_SIZE);
        for _ in 0..(width * height) {
            pixels.extend_from_slice(&rgba);
        }
        Self::new(width, height, pixels)
    }

    /// Set a debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Texture width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Texture height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA8 pixel bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Total pixel data size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.pixels.len()
    }

    /// Debug label, if set.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl std::fmt::Debug for CpuTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuTexture")
            .field("label", &self.label)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("size_bytes", &self.pixels.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_texture() {
        let texture = CpuTexture::solid(4, 2, [10, 20, 30, 255]).with_label("fill");
        assert_eq!(texture.width(), 4);
        assert_eq!(texture.height(), 2);
        assert_eq!(texture.size_bytes(), 4 * 2 * RGBA8_PIXEL_SIZE);
        assert_eq!(&texture.pixels()[..4], &[10, 20, 30, 255]);
        assert_eq!(texture.label(), Some("fill"));
    }
}
