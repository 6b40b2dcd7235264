use std::sync::atomic::{AtomicU64, Ordering};

use crate::loader::Ply;

static NEXT_MESH_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(u64);

impl MeshId {
    pub fn next() -> Self {
        Self(NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Indexed triangle mesh with xyz positions and st texture coordinates.
///
/// Renderers cache GPU buffers by [`MeshId`], so every clone gets an id of
/// its own. Equality only looks at the geometry.
#[derive(Debug)]
pub struct Mesh {
    id: MeshId,
    pub indices: Vec<u32>,
    pub vertices: Vec<f32>,
    pub tex_coords: Vec<f32>,
}

impl Mesh {
    pub fn new(indices: Vec<u32>, vertices: Vec<f32>, tex_coords: Vec<f32>) -> Self {
        Self {
            id: MeshId::next(),
            indices,
            vertices,
            tex_coords,
        }
    }

    /// Builds a mesh from parsed PLY data. Missing texture coordinates are
    /// zero filled so every vertex has one.
    pub fn from_ply(ply: &Ply) -> Self {
        let tex_coords = ply
            .tex_coords
            .clone()
            .unwrap_or_else(|| vec![0.0; ply.vertex_count() * 2]);
        Self::new(ply.indices.clone(), ply.vertices.clone(), tex_coords)
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }
}

impl Clone for Mesh {
    fn clone(&self) -> Self {
        Self::new(self.indices.clone(), self.vertices.clone(), self.tex_coords.clone())
    }
}

impl PartialEq for Mesh {
    fn eq(&self, other: &Self) -> bool {
        self.indices == other.indices
            && self.vertices == other.vertices
            && self.tex_coords == other.tex_coords
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_ply;

    #[test]
    fn missing_tex_coords_are_zero_filled() {
        let ply = parse_ply(
            "ply\nformat ascii 1.0\nelement vertex 3\nproperty float x\nproperty float y\nproperty float z\nelement face 1\nproperty list uchar int vertex_indices\nend_header\n0 0 0\n1 0 0\n0 1 0\n3 0 1 2\n",
        )
        .unwrap();
        let mesh = Mesh::from_ply(&ply);
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.tex_coords, vec![0.0; 6]);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }

    #[test]
    fn clones_get_their_own_id() {
        let mesh = Mesh::new(vec![0, 1, 2], vec![0.0; 9], vec![0.0; 6]);
        let mut copy = mesh.clone();
        assert_ne!(copy.id(), mesh.id());
        assert_eq!(copy, mesh);

        copy.vertices[0] = 1.0;
        assert_ne!(copy, mesh);
    }
}
