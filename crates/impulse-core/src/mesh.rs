//! Narrow interfaces onto the mesh/asset layer.
//!
//! Collision shapes are derived from mesh geometry at load time. The only
//! writer back into a mesh is the soft body, which pushes deformed vertex
//! positions, normals and tangents once per step.

use std::collections::HashMap;
use std::sync::Arc;

use glam::{Vec3, Vec4};

use crate::error::MeshError;

// ---------------------------------------------------------------------------
// Bounds
// ---------------------------------------------------------------------------

/// Axis-aligned bounding box in system units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    /// An inverted box that any point expands.
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::MAX),
        max: Vec3::splat(f32::MIN),
    };

    #[must_use]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every point; `EMPTY` for no points.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Self {
        let mut bounds = Self::EMPTY;
        for p in points {
            bounds.add_point(*p);
        }
        bounds
    }

    pub fn add_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[must_use]
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Grow uniformly by `amount` on every side.
    #[must_use]
    pub fn expanded(&self, amount: f32) -> Self {
        Self {
            min: self.min - Vec3::splat(amount),
            max: self.max + Vec3::splat(amount),
        }
    }

    #[must_use]
    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }
}

// ---------------------------------------------------------------------------
// SubMesh
// ---------------------------------------------------------------------------

/// One surface of a renderable mesh.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubMesh {
    /// Vertex positions in mesh-local system units.
    pub positions: Vec<Vec3>,
    /// Triangle list indices into `positions`.
    pub indices: Vec<u32>,
    /// Vertex count before render-side splitting (seams, hard edges).
    pub original_vertex_count: usize,
    /// Surface material index, used for multi-material BVH shapes.
    pub material: u32,
}

impl SubMesh {
    /// Build a surface and validate its index buffer.
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>, material: u32) -> Result<Self, MeshError> {
        if indices.len() % 3 != 0 {
            return Err(MeshError::NotTriangulated(indices.len()));
        }
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= positions.len()) {
            return Err(MeshError::IndexOutOfRange {
                index,
                vertex_count: positions.len(),
            });
        }
        let original_vertex_count = positions.len();
        Ok(Self {
            positions,
            indices,
            original_vertex_count,
            material,
        })
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Iterate triangles as position triples.
    pub fn triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| {
            [
                self.positions[t[0] as usize],
                self.positions[t[1] as usize],
                self.positions[t[2] as usize],
            ]
        })
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Read-only view of a mesh used to build collision shapes.
pub trait CollisionMeshSource: Send + Sync {
    /// Asset name, used for cache keys and diagnostics.
    fn name(&self) -> &str;

    fn surface_count(&self) -> usize;

    fn surface(&self, index: usize) -> Option<&SubMesh>;

    /// Overall bounding box in mesh-local system units.
    fn bounds(&self) -> Bounds {
        let mut bounds = Bounds::EMPTY;
        for i in 0..self.surface_count() {
            if let Some(surface) = self.surface(i) {
                for p in &surface.positions {
                    bounds.add_point(*p);
                }
            }
        }
        bounds
    }

    /// Enclosed volume and its centroid, from signed tetrahedra against the
    /// origin. Open meshes give approximate results.
    fn volume_and_centroid(&self) -> (f32, Vec3) {
        let mut volume = 0.0;
        let mut weighted = Vec3::ZERO;
        for i in 0..self.surface_count() {
            let Some(surface) = self.surface(i) else {
                continue;
            };
            for [a, b, c] in surface.triangles() {
                let v = a.dot(b.cross(c)) / 6.0;
                volume += v;
                weighted += (a + b + c) * (v / 4.0);
            }
        }
        if volume.abs() <= f32::EPSILON {
            return (0.0, self.bounds().center());
        }
        (volume.abs(), weighted / volume)
    }
}

/// Loads collision meshes by asset name.
pub trait MeshProvider {
    fn load(&self, name: &str) -> Option<Arc<dyn CollisionMeshSource>>;
}

/// A render mesh whose vertex buffer can be rewritten in place.
pub trait DeformableMesh {
    fn vertex_count(&self) -> usize;

    /// Overwrite vertex attributes. Slices are `vertex_count()` long.
    fn write_vertices(&mut self, positions: &[Vec3], normals: &[Vec3], tangents: &[Vec4]);

    /// Replace the render bounding box (entity-local space).
    fn set_bounds(&mut self, bounds: Bounds);
}

// ---------------------------------------------------------------------------
// TriMesh
// ---------------------------------------------------------------------------

/// In-memory triangle mesh implementing every mesh interface.
#[derive(Debug, Clone, PartialEq)]
pub struct TriMesh {
    name: String,
    surfaces: Vec<SubMesh>,
    normals: Vec<Vec3>,
    tangents: Vec<Vec4>,
    render_bounds: Bounds,
}

impl TriMesh {
    pub fn new(name: impl Into<String>, surfaces: Vec<SubMesh>) -> Self {
        let vertex_count: usize = surfaces.iter().map(|s| s.positions.len()).sum();
        let render_bounds =
            Bounds::from_points(surfaces.iter().flat_map(|s| s.positions.iter()));
        Self {
            name: name.into(),
            surfaces,
            normals: vec![Vec3::Z; vertex_count],
            tangents: vec![Vec4::new(1.0, 0.0, 0.0, 1.0); vertex_count],
            render_bounds,
        }
    }

    /// Single-surface mesh from raw triangle data.
    pub fn from_triangles(
        name: impl Into<String>,
        positions: Vec<Vec3>,
        indices: Vec<u32>,
    ) -> Result<Self, MeshError> {
        Ok(Self::new(name, vec![SubMesh::new(positions, indices, 0)?]))
    }

    /// Closed box centred on the origin.
    pub fn cuboid(name: impl Into<String>, half_extents: Vec3) -> Self {
        let h = half_extents;
        let positions = vec![
            Vec3::new(-h.x, -h.y, -h.z),
            Vec3::new(h.x, -h.y, -h.z),
            Vec3::new(h.x, h.y, -h.z),
            Vec3::new(-h.x, h.y, -h.z),
            Vec3::new(-h.x, -h.y, h.z),
            Vec3::new(h.x, -h.y, h.z),
            Vec3::new(h.x, h.y, h.z),
            Vec3::new(-h.x, h.y, h.z),
        ];
        #[rustfmt::skip]
        let indices = vec![
            0, 2, 1, 0, 3, 2, // -z
            4, 5, 6, 4, 6, 7, // +z
            0, 1, 5, 0, 5, 4, // -y
            2, 3, 7, 2, 7, 6, // +y
            1, 2, 6, 1, 6, 5, // +x
            3, 0, 4, 3, 4, 7, // -x
        ];
        let original_vertex_count = positions.len();
        Self::new(
            name,
            vec![SubMesh {
                positions,
                indices,
                original_vertex_count,
                material: 0,
            }],
        )
    }

    /// Flat XY grid of `nx * ny` quads centred on the origin.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn grid(name: impl Into<String>, size_x: f32, size_y: f32, nx: u32, ny: u32) -> Self {
        let nx = nx.max(1);
        let ny = ny.max(1);
        let mut positions = Vec::with_capacity(((nx + 1) * (ny + 1)) as usize);
        for j in 0..=ny {
            for i in 0..=nx {
                positions.push(Vec3::new(
                    (i as f32 / nx as f32 - 0.5) * size_x,
                    (j as f32 / ny as f32 - 0.5) * size_y,
                    0.0,
                ));
            }
        }
        let mut indices = Vec::with_capacity((nx * ny * 6) as usize);
        for j in 0..ny {
            for i in 0..nx {
                let a = j * (nx + 1) + i;
                let b = a + 1;
                let c = a + nx + 1;
                let d = c + 1;
                indices.extend_from_slice(&[a, b, d, a, d, c]);
            }
        }
        let original_vertex_count = positions.len();
        Self::new(
            name,
            vec![SubMesh {
                positions,
                indices,
                original_vertex_count,
                material: 0,
            }],
        )
    }

    /// Concatenated vertex positions across all surfaces.
    pub fn positions(&self) -> Vec<Vec3> {
        self.surfaces
            .iter()
            .flat_map(|s| s.positions.iter().copied())
            .collect()
    }

    /// Concatenated indices, rebased onto [`positions`](Self::positions).
    #[allow(clippy::cast_possible_truncation)]
    pub fn indices(&self) -> Vec<u32> {
        let mut base = 0u32;
        let mut out = Vec::new();
        for surface in &self.surfaces {
            out.extend(surface.indices.iter().map(|i| i + base));
            base += surface.positions.len() as u32;
        }
        out
    }

    pub fn surfaces(&self) -> &[SubMesh] {
        &self.surfaces
    }

    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    pub fn tangents(&self) -> &[Vec4] {
        &self.tangents
    }

    pub fn render_bounds(&self) -> Bounds {
        self.render_bounds
    }
}

impl CollisionMeshSource for TriMesh {
    fn name(&self) -> &str {
        &self.name
    }

    fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    fn surface(&self, index: usize) -> Option<&SubMesh> {
        self.surfaces.get(index)
    }
}

impl DeformableMesh for TriMesh {
    fn vertex_count(&self) -> usize {
        self.normals.len()
    }

    fn write_vertices(&mut self, positions: &[Vec3], normals: &[Vec3], tangents: &[Vec4]) {
        let mut offset = 0;
        for surface in &mut self.surfaces {
            let n = surface.positions.len();
            if let Some(src) = positions.get(offset..offset + n) {
                surface.positions.copy_from_slice(src);
            }
            offset += n;
        }
        if normals.len() == self.normals.len() {
            self.normals.copy_from_slice(normals);
        }
        if tangents.len() == self.tangents.len() {
            self.tangents.copy_from_slice(tangents);
        }
    }

    fn set_bounds(&mut self, bounds: Bounds) {
        self.render_bounds = bounds;
    }
}

// ---------------------------------------------------------------------------
// MeshLibrary
// ---------------------------------------------------------------------------

/// Name-keyed in-memory [`MeshProvider`].
#[derive(Default)]
pub struct MeshLibrary {
    meshes: HashMap<String, Arc<dyn CollisionMeshSource>>,
}

impl MeshLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mesh under its own name, replacing any previous entry.
    pub fn insert(&mut self, mesh: impl CollisionMeshSource + 'static) {
        let name = mesh.name().to_owned();
        self.meshes.insert(name, Arc::new(mesh));
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.meshes.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

impl MeshProvider for MeshLibrary {
    fn load(&self, name: &str) -> Option<Arc<dyn CollisionMeshSource>> {
        self.meshes.get(name).cloned()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn submesh_rejects_bad_indices() {
        let err = SubMesh::new(vec![Vec3::ZERO; 3], vec![0, 1, 5], 0).unwrap_err();
        assert_eq!(
            err,
            MeshError::IndexOutOfRange {
                index: 5,
                vertex_count: 3
            }
        );
        let err = SubMesh::new(vec![Vec3::ZERO; 3], vec![0, 1], 0).unwrap_err();
        assert_eq!(err, MeshError::NotTriangulated(2));
    }

    #[test]
    fn cuboid_volume_and_centroid() {
        let mesh = TriMesh::cuboid("box", Vec3::new(1.0, 2.0, 3.0));
        let (volume, centroid) = mesh.volume_and_centroid();
        assert_relative_eq!(volume, 48.0, max_relative = 1e-5);
        assert!(centroid.length() < 1e-5);
    }

    #[test]
    fn offset_cuboid_centroid() {
        let base = TriMesh::cuboid("box", Vec3::ONE);
        let shifted: Vec<Vec3> = base
            .positions()
            .iter()
            .map(|p| *p + Vec3::new(0.0, 0.0, 5.0))
            .collect();
        let mesh = TriMesh::from_triangles("shifted", shifted, base.indices()).unwrap();
        let (volume, centroid) = mesh.volume_and_centroid();
        assert_relative_eq!(volume, 8.0, max_relative = 1e-5);
        assert_relative_eq!(centroid.z, 5.0, max_relative = 1e-5);
    }

    #[test]
    fn bounds_of_cuboid() {
        let mesh = TriMesh::cuboid("box", Vec3::new(1.0, 2.0, 3.0));
        let b = mesh.bounds();
        assert_eq!(b.min, Vec3::new(-1.0, -2.0, -3.0));
        assert_eq!(b.max, Vec3::new(1.0, 2.0, 3.0));
        assert!(b.contains(Vec3::ZERO));
        assert!(!b.contains(Vec3::new(0.0, 0.0, 4.0)));
    }

    #[test]
    fn empty_bounds() {
        let b = Bounds::from_points(std::iter::empty());
        assert!(b.is_empty());
    }

    #[test]
    fn grid_topology() {
        let mesh = TriMesh::grid("cloth", 2.0, 2.0, 2, 3);
        assert_eq!(mesh.positions().len(), 12);
        assert_eq!(mesh.indices().len(), 2 * 3 * 6);
        let (volume, _) = mesh.volume_and_centroid();
        assert_eq!(volume, 0.0);
    }

    #[test]
    fn write_vertices_updates_positions() {
        let mut mesh = TriMesh::grid("cloth", 1.0, 1.0, 1, 1);
        let moved: Vec<Vec3> = mesh.positions().iter().map(|p| *p + Vec3::Z).collect();
        let normals = vec![Vec3::X; 4];
        let tangents = vec![Vec4::Y; 4];
        mesh.write_vertices(&moved, &normals, &tangents);
        assert_eq!(mesh.positions(), moved);
        assert_eq!(mesh.normals(), normals.as_slice());
        mesh.set_bounds(Bounds::new(Vec3::ZERO, Vec3::ONE));
        assert_eq!(mesh.render_bounds().max, Vec3::ONE);
    }

    #[test]
    fn library_lookup() {
        let mut library = MeshLibrary::new();
        library.insert(TriMesh::cuboid("crate", Vec3::ONE));
        assert!(library.load("crate").is_some());
        assert!(library.load("barrel").is_none());
        assert!(library.remove("crate"));
        assert!(library.is_empty());
    }
}
