//! Reusable collision shapes.
//!
//! A [`Collider`] is independent of any world. Its backend shape is built in
//! physics units with the shape origin at the collider's centroid, so bodies
//! can place it relative to their centre of mass directly.

pub mod manager;

use std::f32::consts::{FRAC_PI_2, PI};
use std::sync::Arc;

use glam::{Mat3, Vec3};
use impulse_core::error::ColliderError;
use impulse_core::mesh::{Bounds, CollisionMeshSource};
use rapier3d::prelude::{vector, Isometry, Point, Real, SharedShape};

use crate::units::{self, point_to_physics, point_to_system, to_physics};

pub use manager::ColliderManager;

/// Default collision margin for mesh-derived hulls, in system units.
pub const DEFAULT_HULL_MARGIN: f32 = 1.0;

/// Sample count per sphere when building a multi-sphere hull with mixed radii.
const SPHERE_SAMPLES: usize = 48;

// ---------------------------------------------------------------------------
// ColliderType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColliderType {
    Box,
    Sphere,
    Capsule,
    Cylinder,
    Cone,
    MultiSphere,
    ConvexHull,
    Bvh,
}

// ---------------------------------------------------------------------------
// CollisionMesh
// ---------------------------------------------------------------------------

/// Derived geometry kept alongside hull and BVH shapes, in physics units.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollisionMesh {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<u32>,
    /// One entry per triangle; empty unless built with multiple materials.
    pub material_indices: Vec<u32>,
}

impl CollisionMesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// How a collider was built, so it can be rebuilt from source art.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Source {
    Procedural,
    Mesh {
        convex_hull: bool,
        decomposed: bool,
        multi_material: bool,
        margin: f32,
    },
}

// ---------------------------------------------------------------------------
// Collider
// ---------------------------------------------------------------------------

/// A collision shape plus its derived geometry.
#[derive(Clone)]
pub struct Collider {
    name: String,
    shape_type: ColliderType,
    shape: SharedShape,
    centroid: Vec3,
    volume: f32,
    model_scale: Vec3,
    collision_meshes: Vec<CollisionMesh>,
    source: Source,
}

impl std::fmt::Debug for Collider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collider")
            .field("name", &self.name)
            .field("shape_type", &self.shape_type)
            .field("centroid", &self.centroid)
            .field("volume", &self.volume)
            .field("model_scale", &self.model_scale)
            .field("collision_meshes", &self.collision_meshes.len())
            .finish_non_exhaustive()
    }
}

fn require_positive(shape: &'static str, what: &str, value: f32) -> Result<(), ColliderError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ColliderError::InvalidDimensions {
            shape,
            detail: format!("{what} must be > 0, got {value}"),
        })
    }
}

/// Parry cylinders and cones are Y-aligned; wrap them so the axis is Z.
fn z_aligned(shape: SharedShape) -> SharedShape {
    let y_to_z = Isometry::rotation(vector![FRAC_PI_2, 0.0, 0.0]);
    SharedShape::compound(vec![(y_to_z, shape)])
}

impl Collider {
    fn primitive(
        shape_type: ColliderType,
        shape: SharedShape,
        center: Vec3,
        volume: f32,
    ) -> Self {
        Self {
            name: manager::UNNAMED.to_owned(),
            shape_type,
            shape,
            centroid: center,
            volume,
            model_scale: Vec3::ONE,
            collision_meshes: Vec::new(),
            source: Source::Procedural,
        }
    }

    /// Box with half extents `extents`. A margin smaller than the smallest
    /// half extent rounds the edges without growing the box.
    pub fn create_box(center: Vec3, extents: Vec3, margin: f32) -> Result<Self, ColliderError> {
        for e in extents.to_array() {
            require_positive("box", "half extent", e)?;
        }
        let h = units::vec_to_physics(extents);
        let m = to_physics(margin.max(0.0));
        let shape = if m > 0.0 && m < h.min_element() {
            SharedShape::round_cuboid(h.x - m, h.y - m, h.z - m, m)
        } else {
            SharedShape::cuboid(h.x, h.y, h.z)
        };
        let volume = extents.x * extents.y * extents.z * 8.0;
        Ok(Self::primitive(ColliderType::Box, shape, center, volume))
    }

    pub fn create_sphere(center: Vec3, radius: f32) -> Result<Self, ColliderError> {
        require_positive("sphere", "radius", radius)?;
        let shape = SharedShape::ball(to_physics(radius));
        let volume = (4.0 / 3.0) * PI * radius * radius * radius;
        Ok(Self::primitive(ColliderType::Sphere, shape, center, volume))
    }

    /// Z-aligned capsule; `height` is the length of the cylindrical part.
    pub fn create_capsule(center: Vec3, radius: f32, height: f32) -> Result<Self, ColliderError> {
        require_positive("capsule", "radius", radius)?;
        require_positive("capsule", "height", height)?;
        let shape = SharedShape::capsule_z(to_physics(height * 0.5), to_physics(radius));
        let volume = PI * radius * radius * (height + radius * 4.0 / 3.0);
        Ok(Self::primitive(ColliderType::Capsule, shape, center, volume))
    }

    /// Z-aligned cylinder. The margin is added around the nominal size.
    pub fn create_cylinder(
        center: Vec3,
        radius: f32,
        height: f32,
        margin: f32,
    ) -> Result<Self, ColliderError> {
        require_positive("cylinder", "radius", radius)?;
        require_positive("cylinder", "height", height)?;
        let m = to_physics(margin.max(0.0));
        let (hh, r) = (to_physics(height * 0.5), to_physics(radius));
        let inner = if m > 0.0 {
            SharedShape::round_cylinder(hh, r, m)
        } else {
            SharedShape::cylinder(hh, r)
        };
        let volume = PI * radius * radius * height;
        Ok(Self::primitive(
            ColliderType::Cylinder,
            z_aligned(inner),
            center,
            volume,
        ))
    }

    /// Z-aligned cone with its apex towards +Z.
    pub fn create_cone(
        center: Vec3,
        radius: f32,
        height: f32,
        margin: f32,
    ) -> Result<Self, ColliderError> {
        require_positive("cone", "radius", radius)?;
        require_positive("cone", "height", height)?;
        let m = to_physics(margin.max(0.0));
        let (hh, r) = (to_physics(height * 0.5), to_physics(radius));
        let inner = if m > 0.0 {
            SharedShape::round_cone(hh, r, m)
        } else {
            SharedShape::cone(hh, r)
        };
        let volume = PI * radius * radius * height / 3.0;
        Ok(Self::primitive(ColliderType::Cone, z_aligned(inner), center, volume))
    }

    /// Convex hull of a set of spheres given by `centers` and `radii`.
    pub fn create_multi_sphere(
        center: Vec3,
        centers: &[Vec3],
        radii: &[f32],
    ) -> Result<Self, ColliderError> {
        if centers.is_empty() || centers.len() != radii.len() {
            return Err(ColliderError::InvalidDimensions {
                shape: "multi-sphere",
                detail: format!("{} centers for {} radii", centers.len(), radii.len()),
            });
        }
        for &r in radii {
            require_positive("multi-sphere", "radius", r)?;
        }

        let uniform = radii.iter().all(|&r| (r - radii[0]).abs() <= f32::EPSILON);
        let centers_3d: Vec<Point<Real>> = centers.iter().map(|c| point_to_physics(*c)).collect();
        // Rounded hulls need full-rank centres; otherwise sample the surfaces.
        let shape = if uniform && spans_volume(&centers_3d) {
            hull_shape(&centers_3d, to_physics(radii[0]))
        } else {
            let mut points = Vec::with_capacity(centers.len() * SPHERE_SAMPLES);
            for (c, &r) in centers.iter().zip(radii) {
                points.extend(
                    fibonacci_sphere(SPHERE_SAMPLES).map(|dir| point_to_physics(*c + dir * r)),
                );
            }
            hull_shape(&points, 0.0)
        };
        let shape = shape.ok_or_else(|| ColliderError::HullFailed("multi-sphere".into()))?;
        let volume = units::to_system(units::to_system(units::to_system(
            shape.mass_properties(1.0).mass(),
        )));
        Ok(Self::primitive(ColliderType::MultiSphere, shape, center, volume))
    }

    /// Convex hull of every original vertex of `mesh`, shrunk by `margin`
    /// and rounded back out by the same amount.
    pub fn create_convex_hull(
        mesh: &dyn CollisionMeshSource,
        scale: Vec3,
        margin: f32,
    ) -> Result<Self, ColliderError> {
        let (mesh_volume, mesh_centroid) = mesh.volume_and_centroid();
        let centroid = scale * mesh_centroid;
        let points = hull_input(mesh, scale, centroid);
        if points.len() < 4 {
            return Err(ColliderError::EmptyMesh(mesh.name().to_owned()));
        }

        let hull = hull_shape(&points, 0.0)
            .ok_or_else(|| ColliderError::HullFailed(mesh.name().to_owned()))?;
        let hull_points: Vec<Point<Real>> = hull
            .as_convex_polyhedron()
            .map(|poly| poly.points().to_vec())
            .unwrap_or(points);

        let m = to_physics(margin.max(0.0));
        let shrunk = shrink_towards_center(&hull_points, m);
        let shape = hull_shape(&shrunk, m)
            .ok_or_else(|| ColliderError::HullFailed(mesh.name().to_owned()))?;

        Ok(Self {
            name: mesh.name().to_owned(),
            shape_type: ColliderType::ConvexHull,
            shape,
            centroid,
            volume: scale.x * scale.y * scale.z * mesh_volume,
            model_scale: scale,
            collision_meshes: vec![CollisionMesh {
                vertices: shrunk.iter().map(|p| Vec3::new(p.x, p.y, p.z)).collect(),
                ..CollisionMesh::default()
            }],
            source: Source::Mesh {
                convex_hull: true,
                decomposed: false,
                multi_material: false,
                margin,
            },
        })
    }

    /// Approximate convex decomposition of a concave mesh into a compound
    /// of hulls.
    pub fn create_convex_decomp(
        mesh: &dyn CollisionMeshSource,
        scale: Vec3,
        margin: f32,
    ) -> Result<Self, ColliderError> {
        let (mesh_volume, mesh_centroid) = mesh.volume_and_centroid();
        let centroid = scale * mesh_centroid;
        let (vertices, triangles) = flatten_mesh(mesh, |p| point_to_physics(scale * p - centroid));
        if triangles.is_empty() {
            return Err(ColliderError::EmptyMesh(mesh.name().to_owned()));
        }
        if !spans_volume(&vertices) {
            return Err(ColliderError::DecompositionFailed(mesh.name().to_owned()));
        }

        let decomposed = SharedShape::convex_decomposition(&vertices, &triangles);
        let Some(compound) = decomposed.as_compound() else {
            return Err(ColliderError::DecompositionFailed(mesh.name().to_owned()));
        };

        let m = to_physics(margin.max(0.0));
        let mut parts = Vec::with_capacity(compound.shapes().len());
        let mut collision_meshes = Vec::with_capacity(compound.shapes().len());
        for (pos, part) in compound.shapes() {
            let Some(poly) = part.as_convex_polyhedron() else {
                continue;
            };
            let shrunk = shrink_towards_center(poly.points(), m);
            if let Some(rebuilt) = hull_shape(&shrunk, m) {
                collision_meshes.push(CollisionMesh {
                    vertices: shrunk.iter().map(|p| Vec3::new(p.x, p.y, p.z)).collect(),
                    ..CollisionMesh::default()
                });
                parts.push((*pos, rebuilt));
            }
        }
        if parts.is_empty() {
            return Err(ColliderError::DecompositionFailed(mesh.name().to_owned()));
        }
        tracing::debug!(name = mesh.name(), hulls = parts.len(), "convex decomposition");

        Ok(Self {
            name: mesh.name().to_owned(),
            shape_type: ColliderType::ConvexHull,
            shape: SharedShape::compound(parts),
            centroid,
            volume: scale.x * scale.y * scale.z * mesh_volume,
            model_scale: scale,
            collision_meshes,
            source: Source::Mesh {
                convex_hull: true,
                decomposed: true,
                multi_material: false,
                margin,
            },
        })
    }

    /// Static triangle mesh. With `multi_material`, every triangle records
    /// the material index of the surface it came from.
    pub fn create_bvh(
        mesh: &dyn CollisionMeshSource,
        scale: Vec3,
        multi_material: bool,
    ) -> Result<Self, ColliderError> {
        let mut collision_meshes = Vec::with_capacity(mesh.surface_count());
        let mut vertices = Vec::new();
        let mut triangles = Vec::new();

        for i in 0..mesh.surface_count() {
            let Some(surface) = mesh.surface(i) else {
                continue;
            };
            #[allow(clippy::cast_possible_truncation)]
            let base = vertices.len() as u32;
            let cmesh = CollisionMesh {
                vertices: surface
                    .positions
                    .iter()
                    .map(|p| units::vec_to_physics(scale * *p))
                    .collect(),
                indices: surface.indices.clone(),
                material_indices: if multi_material {
                    vec![surface.material; surface.triangle_count()]
                } else {
                    Vec::new()
                },
            };
            vertices.extend(cmesh.vertices.iter().map(|v| Point::new(v.x, v.y, v.z)));
            triangles.extend(
                surface
                    .indices
                    .chunks_exact(3)
                    .map(|t| [t[0] + base, t[1] + base, t[2] + base]),
            );
            collision_meshes.push(cmesh);
        }

        if triangles.is_empty() {
            return Err(ColliderError::EmptyMesh(mesh.name().to_owned()));
        }

        Ok(Self {
            name: mesh.name().to_owned(),
            shape_type: ColliderType::Bvh,
            shape: SharedShape::trimesh(vertices, triangles),
            centroid: Vec3::ZERO,
            volume: 0.0,
            model_scale: scale,
            collision_meshes,
            source: Source::Mesh {
                convex_hull: false,
                decomposed: false,
                multi_material,
                margin: 0.0,
            },
        })
    }

    /// Build from mesh art: a margin-shrunk hull when `convex_hull`, a BVH
    /// otherwise.
    pub fn load(
        mesh: &dyn CollisionMeshSource,
        convex_hull: bool,
        scale: Vec3,
    ) -> Result<Self, ColliderError> {
        if convex_hull {
            Self::create_convex_hull(mesh, scale, DEFAULT_HULL_MARGIN)
        } else {
            Self::create_bvh(mesh, scale, false)
        }
    }

    /// Rebuild in place from the original source description. The cache
    /// suffix (everything from the first `<`) is stripped from the stored
    /// name first.
    pub fn reload(&mut self, mesh: &dyn CollisionMeshSource) -> Result<(), ColliderError> {
        let Source::Mesh {
            convex_hull,
            decomposed,
            multi_material,
            margin,
        } = self.source
        else {
            return Err(ColliderError::NotReloadable(self.name.clone()));
        };
        let cache_name = std::mem::take(&mut self.name);
        let rebuilt = match (convex_hull, decomposed) {
            (true, true) => Self::create_convex_decomp(mesh, self.model_scale, margin),
            (true, false) => Self::create_convex_hull(mesh, self.model_scale, margin),
            _ => Self::create_bvh(mesh, self.model_scale, multi_material),
        };
        match rebuilt {
            Ok(rebuilt) => {
                *self = rebuilt;
                self.name = cache_name;
                Ok(())
            }
            Err(err) => {
                self.name = cache_name;
                Err(err)
            }
        }
    }

    /// Source asset name: the stored name with any cache suffix removed.
    pub fn source_name(&self) -> &str {
        base_name(&self.name)
    }

    /// Persisted collider cache. Not implemented; always returns `false`.
    pub fn write(&self, _path: &std::path::Path) -> bool {
        false
    }

    /// World-space bounds with the collider's nominal origin at `origin`.
    pub fn aabb(&self, origin: Vec3, axis: Mat3) -> Bounds {
        let pos = units::isometry_to_physics(origin + axis * self.centroid, axis);
        let aabb = self.shape.compute_aabb(&pos);
        Bounds::new(point_to_system(&aabb.mins), point_to_system(&aabb.maxs))
    }

    /// Radius of the bounding sphere around the centroid, in system units.
    pub fn bounding_radius(&self) -> f32 {
        units::to_system(self.shape.compute_local_bounding_sphere().radius())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn shape_type(&self) -> ColliderType {
        self.shape_type
    }

    pub fn shape(&self) -> &SharedShape {
        &self.shape
    }

    pub fn centroid(&self) -> Vec3 {
        self.centroid
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn model_scale(&self) -> Vec3 {
        self.model_scale
    }

    pub fn collision_meshes(&self) -> &[CollisionMesh] {
        &self.collision_meshes
    }

    pub fn is_convex(&self) -> bool {
        self.shape.is_convex()
    }

    /// Number of compound children, or 1 for a plain shape.
    pub fn child_count(&self) -> usize {
        self.shape.as_compound().map_or(1, |c| c.shapes().len())
    }

    /// Material index of triangle `triangle` for multi-material BVH shapes.
    pub fn triangle_material(&self, triangle: u32) -> u32 {
        let mut index = triangle as usize;
        for cmesh in &self.collision_meshes {
            let n = cmesh.triangle_count();
            if index < n {
                return cmesh.material_indices.get(index).copied().unwrap_or(0);
            }
            index -= n;
        }
        0
    }

    /// Per-triangle material table across all surfaces, `None` unless
    /// built with multiple materials.
    pub(crate) fn triangle_materials(&self) -> Option<Arc<[u32]>> {
        if self.collision_meshes.iter().all(|m| m.material_indices.is_empty()) {
            return None;
        }
        Some(
            self.collision_meshes
                .iter()
                .flat_map(|m| {
                    let n = m.triangle_count();
                    (0..n).map(move |t| m.material_indices.get(t).copied().unwrap_or(0))
                })
                .collect(),
        )
    }

    pub(crate) fn is_mesh_backed(&self) -> bool {
        matches!(self.source, Source::Mesh { .. })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Name with any `<...>` cache suffix removed.
pub(crate) fn base_name(name: &str) -> &str {
    name.find('<').map_or(name, |end| &name[..end])
}

/// Original (pre-split) vertices of every surface, scaled and recentred.
fn hull_input(mesh: &dyn CollisionMeshSource, scale: Vec3, centroid: Vec3) -> Vec<Point<Real>> {
    let mut points = Vec::new();
    for i in 0..mesh.surface_count() {
        if let Some(surface) = mesh.surface(i) {
            let n = surface.original_vertex_count.min(surface.positions.len());
            points.extend(
                surface.positions[..n]
                    .iter()
                    .map(|p| point_to_physics(scale * *p - centroid)),
            );
        }
    }
    points
}

/// Concatenate all surfaces into one vertex/triangle list.
fn flatten_mesh(
    mesh: &dyn CollisionMeshSource,
    transform: impl Fn(Vec3) -> Point<Real>,
) -> (Vec<Point<Real>>, Vec<[u32; 3]>) {
    let mut vertices = Vec::new();
    let mut triangles = Vec::new();
    for i in 0..mesh.surface_count() {
        let Some(surface) = mesh.surface(i) else {
            continue;
        };
        #[allow(clippy::cast_possible_truncation)]
        let base = vertices.len() as u32;
        vertices.extend(surface.positions.iter().map(|p| transform(*p)));
        triangles.extend(
            surface
                .indices
                .chunks_exact(3)
                .map(|t| [t[0] + base, t[1] + base, t[2] + base]),
        );
    }
    (vertices, triangles)
}

/// Pull every point `amount` towards the point cloud's centre, never past it.
fn shrink_towards_center(points: &[Point<Real>], amount: Real) -> Vec<Point<Real>> {
    if points.is_empty() || amount <= 0.0 {
        return points.to_vec();
    }
    #[allow(clippy::cast_precision_loss)]
    let center = points.iter().map(|p| p.coords).sum::<rapier3d::prelude::Vector<Real>>()
        / points.len() as Real;
    points
        .iter()
        .map(|p| {
            let offset = p.coords - center;
            let len = offset.norm();
            if len <= amount * 2.0 {
                *p
            } else {
                Point::from(center + offset * ((len - amount) / len))
            }
        })
        .collect()
}

/// True when `points` contain four non-coplanar points. The hull builder
/// panics on anything flatter.
fn spans_volume(points: &[Point<Real>]) -> bool {
    let Some(origin) = points.first() else {
        return false;
    };
    let extent = points
        .iter()
        .map(|p| (p - origin).norm())
        .fold(0.0, Real::max);
    let eps = extent * 1e-4;
    if eps.is_nan() || eps <= 0.0 {
        return false;
    }

    let farthest = |score: &dyn Fn(&Point<Real>) -> Real| {
        points
            .iter()
            .map(|p| (score(p), *p))
            .fold((0.0, *origin), |best, cur| if cur.0 > best.0 { cur } else { best })
    };

    let (d1, p1) = farthest(&|p: &Point<Real>| (p - origin).norm());
    if d1 <= eps {
        return false;
    }
    let axis = (p1 - origin) / d1;
    let (d2, p2) = farthest(&|p: &Point<Real>| (p - origin).cross(&axis).norm());
    if d2 <= eps {
        return false;
    }
    let normal = axis.cross(&(p2 - origin)).normalize();
    let (d3, _) = farthest(&|p: &Point<Real>| (p - origin).dot(&normal).abs());
    d3 > eps
}

/// Convex hull of `points`, rounded by `margin` when positive. `None` for
/// degenerate input.
fn hull_shape(points: &[Point<Real>], margin: Real) -> Option<SharedShape> {
    if !spans_volume(points) {
        return None;
    }
    if margin > 0.0 {
        SharedShape::round_convex_hull(points, margin)
    } else {
        SharedShape::convex_hull(points)
    }
}

/// Roughly uniform unit directions.
#[allow(clippy::cast_precision_loss)]
fn fibonacci_sphere(n: usize) -> impl Iterator<Item = Vec3> {
    let golden = PI * (3.0 - 5.0_f32.sqrt());
    (0..n).map(move |i| {
        let y = 1.0 - (i as f32 + 0.5) * 2.0 / n as f32;
        let r = (1.0 - y * y).max(0.0).sqrt();
        let theta = golden * i as f32;
        Vec3::new(theta.cos() * r, y, theta.sin() * r)
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
