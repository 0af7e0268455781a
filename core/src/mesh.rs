//! CPU-side mesh data.
//!
//! This module provides:
//! - [`PrimitiveTopology`] - How vertices are assembled into primitives
//! - [`IndexFormat`] - Index element width (u16 or u32)
//! - [`CpuMesh`] - Raw geometry as separate position/normal attribute
//!   buffers plus an index buffer
//! - [`unit_cube`] - Generator for the cube used by demos and the
//!   background proxy
//!
//! Attribute data is stored as one buffer per named attribute (`position`,
//! `normal`) rather than interleaved, matching how the renderer binds vertex
//! buffers per attribute slot.

/// Primitive topology describing how vertices are assembled into primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    /// Each vertex is a separate point.
    PointList,
    /// Every two vertices form a line.
    LineList,
    /// Vertices form a connected strip of lines.
    LineStrip,
    /// Every three vertices form a triangle.
    #[default]
    TriangleList,
    /// Vertices form a connected strip of triangles.
    TriangleStrip,
}

/// Index format for indexed drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    /// 16-bit unsigned indices.
    #[default]
    Uint16,
    /// 32-bit unsigned indices.
    Uint32,
}

impl IndexFormat {
    /// Size in bytes of one index element.
    pub fn size(&self) -> usize {
        match self {
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }
}

/// A CPU-side mesh holding raw attribute and index data.
///
/// # Example
///
/// ```
/// use marigold_core::mesh::CpuMesh;
///
/// let triangle = CpuMesh::new()
///     .with_positions(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])
///     .with_normals(vec![[0.0, 0.0, 1.0]; 3])
///     .with_indices_u16(&[0, 1, 2]);
/// assert_eq!(triangle.vertex_count(), 3);
/// assert_eq!(triangle.index_count(), 3);
/// ```
#[derive(Clone, Default)]
pub struct CpuMesh {
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    index_data: Vec<u8>,
    index_format: IndexFormat,
    index_count: u32,
    topology: PrimitiveTopology,
    label: Option<String>,
}

impl CpuMesh {
    /// Create an empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set vertex positions.
    pub fn with_positions(mut self, positions: Vec<[f32; 3]>) -> Self {
        self.positions = positions;
        self
    }

    /// Set vertex normals. Must match the position count.
    pub fn with_normals(mut self, normals: Vec<[f32; 3]>) -> Self {
        self.normals = normals;
        self
    }

    /// Set u16 index data.
    pub fn with_indices_u16(mut self, indices: &[u16]) -> Self {
        self.index_data = bytemuck::cast_slice(indices).to_vec();
        self.index_format = IndexFormat::Uint16;
        self.index_count = indices.len() as u32;
        self
    }

    /// Set u32 index data.
    pub fn with_indices_u32(mut self, indices: &[u32]) -> Self {
        self.index_data = bytemuck::cast_slice(indices).to_vec();
        self.index_format = IndexFormat::Uint32;
        self.index_count = indices.len() as u32;
        self
    }

    /// Set the primitive topology.
    pub fn with_topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Set a debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> u32 {
        self.positions.len() as u32
    }

    /// Number of indices.
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Index element format.
    pub fn index_format(&self) -> IndexFormat {
        self.index_format
    }

    /// Primitive topology.
    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    /// Position attribute data as raw bytes.
    pub fn position_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    /// Normal attribute data as raw bytes.
    pub fn normal_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.normals)
    }

    /// Index data as raw bytes.
    pub fn index_bytes(&self) -> &[u8] {
        &self.index_data
    }

    /// Vertex positions.
    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    /// Vertex normals.
    pub fn normals(&self) -> &[[f32; 3]] {
        &self.normals
    }

    /// Debug label, if set.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// True when positions, normals, and indices are all present and the
    /// attribute buffers agree on the vertex count.
    pub fn is_complete(&self) -> bool {
        !self.positions.is_empty()
            && self.positions.len() == self.normals.len()
            && self.index_count > 0
    }
}

impl std::fmt::Debug for CpuMesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuMesh")
            .field("label", &self.label)
            .field("topology", &self.topology)
            .field("vertex_count", &self.positions.len())
            .field("index_count", &self.index_count)
            .field("index_format", &self.index_format)
            .finish()
    }
}

/// Generate a unit cube centered at the origin.
///
/// 24 vertices with per-face normals, 36 u16 indices, faces wound clockwise
/// when viewed from outside. Rendered from outside this matches a pipeline
/// with a clockwise front face; rendered from inside (the background proxy
/// case) the visible winding flips to counter-clockwise.
pub fn unit_cube() -> CpuMesh {
    const FACES: [([f32; 3], [[f32; 3]; 4]); 6] = [
        // +X
        (
            [1.0, 0.0, 0.0],
            [
                [0.5, -0.5, 0.5],
                [0.5, -0.5, -0.5],
                [0.5, 0.5, -0.5],
                [0.5, 0.5, 0.5],
            ],
        ),
        // -X
        (
            [-1.0, 0.0, 0.0],
            [
                [-0.5, -0.5, -0.5],
                [-0.5, -0.5, 0.5],
                [-0.5, 0.5, 0.5],
                [-0.5, 0.5, -0.5],
            ],
        ),
        // +Y
        (
            [0.0, 1.0, 0.0],
            [
                [-0.5, 0.5, 0.5],
                [0.5, 0.5, 0.5],
                [0.5, 0.5, -0.5],
                [-0.5, 0.5, -0.5],
            ],
        ),
        // -Y
        (
            [0.0, -1.0, 0.0],
            [
                [-0.5, -0.5, -0.5],
                [0.5, -0.5, -0.5],
                [0.5, -0.5, 0.5],
                [-0.5, -0.5, 0.5],
            ],
        ),
        // +Z
        (
            [0.0, 0.0, 1.0],
            [
                [-0.5, -0.5, 0.5],
                [0.5, -0.5, 0.5],
                [0.5, 0.5, 0.5],
                [-0.5, 0.5, 0.5],
            ],
        ),
        // -Z
        (
            [0.0, 0.0, -1.0],
            [
                [0.5, -0.5, -0.5],
                [-0.5, -0.5, -0.5],
                [-0.5, 0.5, -0.5],
                [0.5, 0.5, -0.5],
            ],
        ),
    ];

    let mut positions = Vec::with_capacity(24);
    let mut normals = Vec::with_capacity(24);
    let mut indices: Vec<u16> = Vec::with_capacity(36);

    for (face, (normal, corners)) in FACES.iter().enumerate() {
        let base = (face * 4) as u16;
        positions.extend_from_slice(corners);
        normals.extend_from_slice(&[*normal; 4]);
        // Corners are counter-clockwise from outside; emit clockwise triangles.
        indices.extend_from_slice(&[base, base + 2, base + 1, base, base + 3, base + 2]);
    }

    CpuMesh::new()
        .with_positions(positions)
        .with_normals(normals)
        .with_indices_u16(&indices)
        .with_label("unit_cube")
}
