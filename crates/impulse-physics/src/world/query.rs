//! Synchronous scene queries: rays, sweeps and overlaps.
//!
//! Queries see the world as of the last completed step plus any membership
//! changes since. Inputs and results are in system units.

use std::collections::{BTreeSet, HashSet};

use glam::{Mat3, Vec3};
use rapier3d::parry::query::{PointQueryWithLocation, ShapeCastHit, ShapeCastOptions};
use rapier3d::prelude::{
    Ball, Collider as BackendCollider, ColliderHandle, Cuboid, FeatureId, Isometry, QueryFilter,
    Ray, Real, Shape, Vector,
};

use super::PhysicsWorld;
use crate::collider::Collider;
use crate::filter::query_groups;
use crate::handles::CollidableHandle;
use crate::units::{
    from_na, isometry_to_physics, point_to_physics, point_to_system, to_physics, vector_to_physics,
};

/// Upper bound on hits gathered by one `convex_cast_all`.
const MAX_SWEEP_HITS: usize = 64;

/// A ray or sweep hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CastResult {
    pub hit: CollidableHandle,
    /// World-space hit point.
    pub end_pos: Vec3,
    /// Surface normal of the hit object, facing the caster.
    pub normal: Vec3,
    /// Position of the hit along `start..end`, in `[0, 1]`.
    pub fraction: f32,
    /// Material index of the hit triangle on multi-material meshes, zero
    /// elsewhere.
    pub surface_flags: u32,
}

impl PhysicsWorld {
    fn with_filter<R>(
        &self,
        me: Option<CollidableHandle>,
        mask: u32,
        exclude: &HashSet<ColliderHandle>,
        f: impl FnOnce(QueryFilter<'_>) -> R,
    ) -> R {
        let predicate = |handle: ColliderHandle, collider: &BackendCollider| {
            !exclude.contains(&handle)
                && (me.is_none() || CollidableHandle::from_user_data(collider.user_data) != me)
        };
        let layer = me.map_or(0, |h| self.member_layer(h));
        let filter = QueryFilter::new()
            .groups(query_groups(layer, mask))
            .exclude_sensors()
            .predicate(&predicate);
        f(filter)
    }

    fn owner(&self, collider: ColliderHandle) -> Option<CollidableHandle> {
        self.backend.owner_of(collider)
    }

    fn triangle_flags(&self, collider: ColliderHandle, triangle: u32) -> u32 {
        self.surface_materials
            .get(&collider)
            .filter(|table| !table.is_empty())
            .map_or(0, |table| table[triangle as usize % table.len()])
    }

    /// Material of the triangle nearest a world point on a mesh collider.
    fn flags_at(&self, collider: ColliderHandle, point: Vec3) -> u32 {
        if !self.surface_materials.contains_key(&collider) {
            return 0;
        }
        let Some(c) = self.backend.colliders.get(collider) else {
            return 0;
        };
        let Some(mesh) = c.shape().as_trimesh() else {
            return 0;
        };
        let local = c.position().inverse_transform_point(&point_to_physics(point));
        let (_, (triangle, _)) = mesh.project_local_point_and_get_location(&local, true);
        self.triangle_flags(collider, triangle)
    }

    // ---- Rays ----

    fn ray(start: Vec3, end: Vec3) -> Option<Ray> {
        let dir = vector_to_physics(end - start);
        (dir.norm_squared() > Real::EPSILON * Real::EPSILON)
            .then(|| Ray::new(point_to_physics(start), dir))
    }

    fn ray_hit(
        &self,
        ray: &Ray,
        collider: ColliderHandle,
        toi: Real,
        normal: Vector<Real>,
        feature: FeatureId,
    ) -> Option<CastResult> {
        let hit = self.owner(collider)?;
        let surface_flags = match feature {
            FeatureId::Face(triangle) => self.triangle_flags(collider, triangle),
            _ => 0,
        };
        Some(CastResult {
            hit,
            end_pos: point_to_system(&ray.point_at(toi)),
            normal: from_na(&normal),
            fraction: toi,
            surface_flags,
        })
    }

    /// Closest hit along the segment `start..end`, skipping `me`.
    pub fn ray_cast(
        &self,
        me: Option<CollidableHandle>,
        start: Vec3,
        end: Vec3,
        mask: u32,
    ) -> Option<CastResult> {
        let ray = Self::ray(start, end)?;
        let (collider, hit) = self.with_filter(me, mask, &HashSet::new(), |filter| {
            self.backend.query_pipeline.cast_ray_and_get_normal(
                &self.backend.bodies,
                &self.backend.colliders,
                &ray,
                1.0,
                true,
                filter,
            )
        })?;
        self.ray_hit(&ray, collider, hit.time_of_impact, hit.normal, hit.feature)
    }

    /// Every hit along the segment, nearest first.
    pub fn ray_cast_all(
        &self,
        me: Option<CollidableHandle>,
        start: Vec3,
        end: Vec3,
        mask: u32,
    ) -> Vec<CastResult> {
        let Some(ray) = Self::ray(start, end) else {
            return Vec::new();
        };
        let mut hits = Vec::new();
        self.with_filter(me, mask, &HashSet::new(), |filter| {
            self.backend.query_pipeline.intersections_with_ray(
                &self.backend.bodies,
                &self.backend.colliders,
                &ray,
                1.0,
                true,
                filter,
                |collider, hit| {
                    hits.extend(self.ray_hit(
                        &ray,
                        collider,
                        hit.time_of_impact,
                        hit.normal,
                        hit.feature,
                    ));
                    true
                },
            );
        });
        hits.sort_by(|a, b| a.fraction.total_cmp(&b.fraction));
        hits
    }

    // ---- Sweeps ----

    fn sweep(
        &self,
        me: Option<CollidableHandle>,
        shape: &dyn Shape,
        pose: &Isometry<Real>,
        delta: &Vector<Real>,
        mask: u32,
        exclude: &HashSet<ColliderHandle>,
    ) -> Option<(ColliderHandle, ShapeCastHit)> {
        let options = ShapeCastOptions {
            max_time_of_impact: 1.0,
            target_distance: 0.0,
            stop_at_penetration: true,
            compute_impact_geometry_on_penetration: true,
        };
        self.with_filter(me, mask, exclude, |filter| {
            self.backend.query_pipeline.cast_shape(
                &self.backend.bodies,
                &self.backend.colliders,
                pose,
                delta,
                shape,
                options,
                filter,
            )
        })
    }

    fn sweep_hit(&self, collider: ColliderHandle, hit: &ShapeCastHit) -> Option<CastResult> {
        let end_pos = point_to_system(&hit.witness1);
        Some(CastResult {
            hit: self.owner(collider)?,
            end_pos,
            normal: from_na(&hit.normal1),
            fraction: hit.time_of_impact,
            surface_flags: self.flags_at(collider, end_pos),
        })
    }

    /// Closest hit of `shape` moved from `start` to `end`. Returns `None`
    /// for zero-length sweeps.
    fn sweep_first(
        &self,
        me: Option<CollidableHandle>,
        shape: &dyn Shape,
        pose: Isometry<Real>,
        start: Vec3,
        end: Vec3,
        mask: u32,
    ) -> Option<CastResult> {
        let delta = vector_to_physics(end - start);
        if delta.norm_squared() <= Real::EPSILON * Real::EPSILON {
            return None;
        }
        let (collider, hit) = self.sweep(me, shape, &pose, &delta, mask, &HashSet::new())?;
        self.sweep_hit(collider, &hit)
    }

    fn sweep_all(
        &self,
        me: Option<CollidableHandle>,
        shape: &dyn Shape,
        pose: Isometry<Real>,
        start: Vec3,
        end: Vec3,
        mask: u32,
    ) -> Vec<CastResult> {
        let delta = vector_to_physics(end - start);
        let mut hits = Vec::new();
        if delta.norm_squared() <= Real::EPSILON * Real::EPSILON {
            return hits;
        }
        let mut seen = HashSet::new();
        while hits.len() < MAX_SWEEP_HITS {
            let Some((collider, hit)) = self.sweep(me, shape, &pose, &delta, mask, &seen) else {
                break;
            };
            seen.insert(collider);
            hits.extend(self.sweep_hit(collider, &hit));
        }
        hits.sort_by(|a, b| a.fraction.total_cmp(&b.fraction));
        hits
    }

    /// Convex shape of a collider placed at `start` with `axis`, or `None`
    /// (with a warning) for shapes that cannot be swept.
    fn sweep_shape<'a>(
        collider: &'a Collider,
        axis: Mat3,
        start: Vec3,
    ) -> Option<(&'a dyn Shape, Isometry<Real>)> {
        let mut pose = isometry_to_physics(start + axis * collider.centroid(), axis);
        let mut shape: &dyn Shape = &**collider.shape();
        if let Some(compound) = shape.as_compound() {
            let [(offset, child)] = compound.shapes() else {
                tracing::warn!(
                    collider = collider.name(),
                    children = compound.shapes().len(),
                    "cannot sweep a compound collider"
                );
                return None;
            };
            pose *= *offset;
            shape = &**child;
        }
        if !shape.is_convex() {
            tracing::warn!(collider = collider.name(), "cannot sweep a non-convex collider");
            return None;
        }
        Some((shape, pose))
    }

    /// Sweep `collider`, oriented by `axis`, from `start` to `end`.
    pub fn convex_cast(
        &self,
        me: Option<CollidableHandle>,
        collider: &Collider,
        axis: Mat3,
        start: Vec3,
        end: Vec3,
        mask: u32,
    ) -> Option<CastResult> {
        let (shape, pose) = Self::sweep_shape(collider, axis, start)?;
        self.sweep_first(me, shape, pose, start, end, mask)
    }

    /// Every collidable `collider` touches on its way from `start` to
    /// `end`, nearest first.
    pub fn convex_cast_all(
        &self,
        me: Option<CollidableHandle>,
        collider: &Collider,
        axis: Mat3,
        start: Vec3,
        end: Vec3,
        mask: u32,
    ) -> Vec<CastResult> {
        match Self::sweep_shape(collider, axis, start) {
            Some((shape, pose)) => self.sweep_all(me, shape, pose, start, end, mask),
            None => Vec::new(),
        }
    }

    /// `extents` are half extents.
    pub fn box_cast(
        &self,
        me: Option<CollidableHandle>,
        extents: Vec3,
        axis: Mat3,
        start: Vec3,
        end: Vec3,
        mask: u32,
    ) -> Option<CastResult> {
        let shape = Cuboid::new(vector_to_physics(extents.abs()));
        self.sweep_first(me, &shape, isometry_to_physics(start, axis), start, end, mask)
    }

    pub fn sphere_cast(
        &self,
        me: Option<CollidableHandle>,
        radius: f32,
        start: Vec3,
        end: Vec3,
        mask: u32,
    ) -> Option<CastResult> {
        let shape = Ball::new(to_physics(radius.abs()));
        self.sweep_first(me, &shape, isometry_to_physics(start, Mat3::IDENTITY), start, end, mask)
    }

    // ---- Overlaps ----

    fn overlapping(
        &self,
        shape: &dyn Shape,
        pose: &Isometry<Real>,
        mask: u32,
        first_only: bool,
    ) -> Vec<CollidableHandle> {
        let mut found = BTreeSet::new();
        self.with_filter(None, mask, &HashSet::new(), |filter| {
            self.backend.query_pipeline.intersections_with_shape(
                &self.backend.bodies,
                &self.backend.colliders,
                pose,
                shape,
                filter,
                |collider| {
                    if let Some(owner) = self.owner(collider) {
                        found.insert(owner);
                    }
                    !(first_only && !found.is_empty())
                },
            );
        });
        found.into_iter().collect()
    }

    /// Collidables overlapping an oriented box with half extents `extents`.
    pub fn overlap_box(
        &self,
        center: Vec3,
        extents: Vec3,
        axis: Mat3,
        mask: u32,
    ) -> Vec<CollidableHandle> {
        let shape = Cuboid::new(vector_to_physics(extents.abs()));
        self.overlapping(&shape, &isometry_to_physics(center, axis), mask, false)
    }

    pub fn overlap_sphere(&self, center: Vec3, radius: f32, mask: u32) -> Vec<CollidableHandle> {
        let shape = Ball::new(to_physics(radius.abs()));
        self.overlapping(&shape, &isometry_to_physics(center, Mat3::IDENTITY), mask, false)
    }

    pub fn check_box(&self, center: Vec3, extents: Vec3, axis: Mat3, mask: u32) -> bool {
        let shape = Cuboid::new(vector_to_physics(extents.abs()));
        !self
            .overlapping(&shape, &isometry_to_physics(center, axis), mask, true)
            .is_empty()
    }

    pub fn check_sphere(&self, center: Vec3, radius: f32, mask: u32) -> bool {
        let shape = Ball::new(to_physics(radius.abs()));
        !self
            .overlapping(&shape, &isometry_to_physics(center, Mat3::IDENTITY), mask, true)
            .is_empty()
    }
}
