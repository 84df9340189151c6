//! Mesh records and CPU-side geometry.

use glam::Vec3;

use crate::handle::ResourceId;
use crate::resource::Resource;

/// One drawable range of a mesh: a vertex buffer, an index buffer and how many
/// indices to draw from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubMesh {
    pub vertex_buffer: ResourceId,
    pub index_buffer: ResourceId,
    pub index_count: u32,
}

/// A mesh as seen by the renderer: a list of submeshes whose buffers live in
/// the same [`ResourceTable`](crate::ResourceTable).
///
/// Submesh `i` is drawn with material `i` of the mesh renderer, clamped to the
/// last material when there are fewer materials than submeshes.
#[derive(Debug, Default)]
pub struct Mesh {
    pub submeshes: Vec<SubMesh>,
    id: ResourceId,
}

impl Mesh {
    pub fn new(submeshes: Vec<SubMesh>) -> Self {
        Self {
            submeshes,
            id: ResourceId::INVALID,
        }
    }

    /// Id this mesh was allocated under, `INVALID` before allocation.
    pub fn id(&self) -> ResourceId {
        self.id
    }
}

impl Resource for Mesh {
    fn on_allocated(&mut self, id: ResourceId) {
        self.id = id;
    }
}

/// Geometry waiting to be uploaded to GPU buffers.
#[derive(Debug, Default, Clone)]
pub struct MeshData {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tex_coords: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Unit cube centred on the origin, one quad per face with outward normals.
    pub fn cube() -> Self {
        const FACES: [(Vec3, Vec3, Vec3); 6] = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];

        let mut data = Self::default();
        for (normal, right, up) in FACES {
            let base = data.positions.len() as u32;
            let center = normal * 0.5;
            for (u, v) in [(0.0, 1.0), (1.0, 1.0), (1.0, 0.0), (0.0, 0.0)] {
                let offset = right * (u - 0.5) + up * (0.5 - v);
                data.positions.push(center + offset);
                data.normals.push(normal);
                data.tex_coords.push([u, v]);
            }
            data.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        data
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Axis-aligned bounds, `None` for empty geometry.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.positions.first()?;
        Some(
            self.positions
                .iter()
                .fold((first, first), |(min, max), p| (min.min(*p), max.max(*p))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_counts() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.triangle_count(), 12);
        assert_eq!(cube.normals.len(), cube.positions.len());
        assert!(cube.indices.iter().all(|&i| (i as usize) < cube.vertex_count()));
    }

    #[test]
    fn test_cube_bounds() {
        let (min, max) = MeshData::cube().bounds().unwrap();
        assert!(min.abs_diff_eq(Vec3::splat(-0.5), 1e-6));
        assert!(max.abs_diff_eq(Vec3::splat(0.5), 1e-6));
    }

    #[test]
    fn test_cube_faces_wind_outward() {
        let cube = MeshData::cube();
        for tri in cube.indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|k| cube.positions[tri[k] as usize]);
            let face_normal = (b - a).cross(c - a).normalize();
            assert!(face_normal.dot(cube.normals[tri[0] as usize]) > 0.99);
        }
    }

    #[test]
    fn test_empty_bounds() {
        assert!(MeshData::default().bounds().is_none());
    }
}
