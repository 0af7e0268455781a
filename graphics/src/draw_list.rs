//! Flattened draw list.
//!
//! The scene's mesh → node → submesh nesting is flattened once at prepare
//! time into a stable, ordered [`DrawList`]. Recording then walks a flat
//! slice instead of re-traversing the scene every frame, and the entry
//! order — meshes in insertion order, nodes within a mesh, submeshes within
//! a node — is the draw order observers see in the command stream.

use glam::{Mat4, Vec4};
use marigold_core::scene::Scene;

use crate::device::GpuGeometry;
use crate::error::RenderError;

/// One object draw: a geometry with its per-draw parameters.
#[derive(Debug, Clone)]
pub struct DrawEntry {
    /// `mesh/node` label for traces.
    pub label: String,
    /// World transform pushed to the vertex stage.
    pub transform: Mat4,
    /// Base color factor pushed to the vertex stage.
    pub color: Vec4,
    /// Uploaded geometry to bind and draw.
    pub geometry: GpuGeometry,
    /// Node requested per-draw depth bias.
    pub depth_bias: bool,
    /// Node requested per-draw rasterizer discard.
    pub rasterizer_discard: bool,
}

/// Stable flattening of a scene's object draws.
#[derive(Debug, Clone, Default)]
pub struct DrawList {
    entries: Vec<DrawEntry>,
}

impl DrawList {
    /// Flatten `scene` against its uploaded geometries.
    ///
    /// `geometries` is parallel to the scene: one outer entry per mesh, one
    /// inner entry per submesh. A shape mismatch means the upload pass and
    /// the scene disagree and is rejected rather than silently truncated.
    pub fn build(scene: &Scene, geometries: &[Vec<GpuGeometry>]) -> Result<Self, RenderError> {
        if geometries.len() != scene.meshes().len() {
            return Err(RenderError::InvalidParameter(format!(
                "geometry table covers {} meshes, scene has {}",
                geometries.len(),
                scene.meshes().len()
            )));
        }

        let mut entries = Vec::with_capacity(scene.entry_count());
        for (mesh, mesh_geometries) in scene.meshes().iter().zip(geometries) {
            let mesh_name = mesh.name.as_deref().unwrap_or("mesh");
            if mesh_geometries.len() != mesh.submeshes.len() {
                return Err(RenderError::InvalidParameter(format!(
                    "mesh '{}' has {} submeshes but {} uploaded geometries",
                    mesh_name,
                    mesh.submeshes.len(),
                    mesh_geometries.len()
                )));
            }

            for node in &mesh.nodes {
                let node_name = node.name.as_deref().unwrap_or("node");
                for (submesh, geometry) in mesh.submeshes.iter().zip(mesh_geometries) {
                    entries.push(DrawEntry {
                        label: format!("{mesh_name}/{node_name}"),
                        transform: node.transform,
                        color: submesh.material.base_color,
                        geometry: *geometry,
                        depth_bias: node.depth_bias,
                        rasterizer_discard: node.rasterizer_discard,
                    });
                }
            }
        }

        log::debug!("draw list flattened to {} entries", entries.len());
        Ok(Self { entries })
    }

    /// Assemble a list from already-built entries, preserving their order.
    pub fn from_entries(entries: Vec<DrawEntry>) -> Self {
        Self { entries }
    }

    /// Entries in draw order.
    pub fn entries(&self) -> &[DrawEntry] {
        &self.entries
    }

    /// Number of object draws.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the scene contributed no object draws.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::BufferId;
    use marigold_core::material::Material;
    use marigold_core::mesh::{unit_cube, IndexFormat};
    use marigold_core::scene::{Background, Node, SceneMesh, Submesh};
    use marigold_core::texture::CpuTexture;
    use glam::Vec3;

    fn fake_geometry(index_count: u32) -> GpuGeometry {
        GpuGeometry {
            positions: BufferId::from_raw(0),
            normals: BufferId::from_raw(1),
            indices: BufferId::from_raw(2),
            index_format: IndexFormat::Uint16,
            index_count,
        }
    }

    fn scene_background() -> Background {
        Background::new(unit_cube(), CpuTexture::solid(2, 2, [128; 4]))
    }

    #[test]
    fn test_flatten_order_is_mesh_node_submesh() {
        let first = SceneMesh::new()
            .with_name("first")
            .with_node(Node::new(Mat4::from_translation(Vec3::X)).with_name("a"))
            .with_node(Node::new(Mat4::from_translation(Vec3::Y)).with_name("b"))
            .with_submesh(Submesh::new(unit_cube(), Material::default()));
        let second = SceneMesh::new()
            .with_name("second")
            .with_node(Node::new(Mat4::IDENTITY).with_name("c"))
            .with_submesh(Submesh::new(unit_cube(), Material::default()))
            .with_submesh(Submesh::new(unit_cube(), Material::default()));
        let scene = Scene::new(scene_background())
            .with_mesh(first)
            .with_mesh(second);

        let geometries = vec![
            vec![fake_geometry(36)],
            vec![fake_geometry(24), fake_geometry(12)],
        ];
        let list = DrawList::build(&scene, &geometries).unwrap();

        assert_eq!(list.len(), scene.entry_count());
        let labels: Vec<&str> = list.entries().iter().map(|e| e.label.as_str()).collect();
        assert_eq!(
            labels,
            ["first/a", "first/b", "second/c", "second/c"]
        );
        let counts: Vec<u32> = list
            .entries()
            .iter()
            .map(|e| e.geometry.index_count)
            .collect();
        assert_eq!(counts, [36, 36, 24, 12]);
    }

    #[test]
    fn test_node_toggles_reach_entries() {
        let mesh = SceneMesh::new()
            .with_node(Node::new(Mat4::IDENTITY).with_depth_bias(true))
            .with_node(Node::new(Mat4::IDENTITY).with_rasterizer_discard(true))
            .with_submesh(Submesh::new(unit_cube(), Material::default()));
        let scene = Scene::new(scene_background()).with_mesh(mesh);

        let list = DrawList::build(&scene, &[vec![fake_geometry(36)]]).unwrap();
        assert!(list.entries()[0].depth_bias);
        assert!(!list.entries()[0].rasterizer_discard);
        assert!(!list.entries()[1].depth_bias);
        assert!(list.entries()[1].rasterizer_discard);
    }

    #[test]
    fn test_mismatched_geometry_table_is_rejected() {
        let mesh = SceneMesh::new()
            .with_node(Node::default())
            .with_submesh(Submesh::new(unit_cube(), Material::default()));
        let scene = Scene::new(scene_background()).with_mesh(mesh);

        let err = DrawList::build(&scene, &[]).unwrap_err();
        assert!(matches!(err, RenderError::InvalidParameter(_)));

        let err = DrawList::build(&scene, &[vec![]]).unwrap_err();
        assert!(matches!(err, RenderError::InvalidParameter(_)));
    }
}
