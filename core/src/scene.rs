//! Scene structure consumed by the renderer.
//!
//! A [`Scene`] is a flat collection of meshes. Each [`SceneMesh`] owns its
//! geometry ([`Submesh`] values pairing a [`CpuMesh`] with a [`Material`])
//! and the instance [`Node`]s that place it in the world. The scene also
//! carries the [`Background`] proxy: the geometry and environment texture
//! drawn by the background pass.
//!
//! The renderer flattens mesh → node → submesh into its draw list once at
//! prepare time; the scene itself is never mutated afterwards.

use glam::Mat4;

use crate::material::Material;
use crate::mesh::CpuMesh;
use crate::texture::CpuTexture;

/// One placement of a mesh in the world.
#[derive(Debug, Clone)]
pub struct Node {
    /// Human-readable name for debugging.
    pub name: Option<String>,
    /// World transform applied to every submesh of the owning mesh.
    pub transform: Mat4,
    /// Request depth bias while drawing this node, on devices that can
    /// toggle it per draw.
    pub depth_bias: bool,
    /// Skip rasterization for this node's draws, on devices that can
    /// toggle discard per draw.
    pub rasterizer_discard: bool,
}

impl Node {
    /// Create a node with the given world transform.
    pub fn new(transform: Mat4) -> Self {
        Self {
            name: None,
            transform,
            depth_bias: false,
            rasterizer_discard: false,
        }
    }

    /// Set a debug name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Request per-draw depth bias.
    pub fn with_depth_bias(mut self, enabled: bool) -> Self {
        self.depth_bias = enabled;
        self
    }

    /// Request per-draw rasterizer discard.
    pub fn with_rasterizer_discard(mut self, enabled: bool) -> Self {
        self.rasterizer_discard = enabled;
        self
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY)
    }
}

/// Geometry plus the material it is drawn with.
#[derive(Debug, Clone)]
pub struct Submesh {
    /// Position/normal/index data.
    pub geometry: CpuMesh,
    /// Material supplying the base color factor.
    pub material: Material,
}

impl Submesh {
    /// Pair geometry with a material.
    pub fn new(geometry: CpuMesh, material: Material) -> Self {
        Self { geometry, material }
    }
}

/// A mesh with its submeshes and the nodes that instance it.
#[derive(Debug, Clone, Default)]
pub struct SceneMesh {
    /// Human-readable name for debugging.
    pub name: Option<String>,
    /// World placements of this mesh.
    pub nodes: Vec<Node>,
    /// Geometry/material pairs drawn per node.
    pub submeshes: Vec<Submesh>,
}

impl SceneMesh {
    /// Create an empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a debug name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add an instance node.
    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add a submesh.
    pub fn with_submesh(mut self, submesh: Submesh) -> Self {
        self.submeshes.push(submesh);
        self
    }
}

/// Background proxy geometry and its environment texture.
#[derive(Debug, Clone)]
pub struct Background {
    /// Proxy mesh drawn by the background pass, typically a unit cube
    /// viewed from inside.
    pub geometry: CpuMesh,
    /// Environment image sampled by the background fragment stage.
    pub texture: CpuTexture,
}

impl Background {
    /// Create a background from proxy geometry and an environment texture.
    pub fn new(geometry: CpuMesh, texture: CpuTexture) -> Self {
        Self { geometry, texture }
    }
}

/// A loaded scene: meshes with instance nodes, plus the background.
#[derive(Debug, Clone)]
pub struct Scene {
    meshes: Vec<SceneMesh>,
    background: Background,
}

impl Scene {
    /// Create a scene with the given background and no meshes.
    pub fn new(background: Background) -> Self {
        Self {
            meshes: Vec::new(),
            background,
        }
    }

    /// Add a mesh.
    pub fn with_mesh(mut self, mesh: SceneMesh) -> Self {
        self.meshes.push(mesh);
        self
    }

    /// Add a mesh in place.
    pub fn add_mesh(&mut self, mesh: SceneMesh) {
        self.meshes.push(mesh);
    }

    /// Meshes in insertion order.
    pub fn meshes(&self) -> &[SceneMesh] {
        &self.meshes
    }

    /// The background proxy.
    pub fn background(&self) -> &Background {
        &self.background
    }

    /// Number of draw entries a flattening pass produces:
    /// one per (mesh, node, submesh) triple, in that nesting order.
    pub fn entry_count(&self) -> usize {
        self.meshes
            .iter()
            .map(|mesh| mesh.nodes.len() * mesh.submeshes.len())
            .sum()
    }
}
