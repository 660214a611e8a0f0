//! Sensor overlap and contact queries.
//!
//! Sensors never take part in the solver. They are tested against the
//! query pipeline as of the last step, using the sensor's own pending pose
//! so a sensor moved since then is checked where it now is.

use std::collections::BTreeSet;

use rapier3d::parry::query;
use rapier3d::prelude::{InteractionGroups, QueryFilter, RigidBodyHandle};

use super::ShapePart;
use crate::handles::CollidableHandle;
use crate::listener::Contact;
use crate::units::{point_to_system, to_system, vector_to_system};
use crate::world::backend::WorldBackend;

fn filter(body: RigidBodyHandle, groups: InteractionGroups) -> QueryFilter<'static> {
    QueryFilter::new()
        .exclude_rigid_body(body)
        .exclude_sensors()
        .groups(groups)
}

/// Distinct collidables overlapping any part of the sensor, in handle order.
pub(crate) fn overlaps(
    backend: &WorldBackend,
    body: RigidBodyHandle,
    parts: &[ShapePart],
    groups: InteractionGroups,
) -> Vec<CollidableHandle> {
    let Some(rb) = backend.bodies.get(body) else {
        return Vec::new();
    };
    let pose = *rb.next_position();
    let mut found = BTreeSet::new();
    for part in parts {
        backend.query_pipeline.intersections_with_shape(
            &backend.bodies,
            &backend.colliders,
            &(pose * part.offset),
            part.shape.as_ref(),
            filter(body, groups),
            |collider| {
                if let Some(owner) = backend.owner_of(collider) {
                    found.insert(owner);
                }
                true
            },
        );
    }
    found.into_iter().collect()
}

/// Penetrating contacts between the sensor and everything it overlaps.
/// Points lie on the other object; normals point towards the sensor.
pub(crate) fn contacts(
    backend: &WorldBackend,
    sensor: CollidableHandle,
    body: RigidBodyHandle,
    parts: &[ShapePart],
    groups: InteractionGroups,
) -> Vec<Contact> {
    let Some(rb) = backend.bodies.get(body) else {
        return Vec::new();
    };
    let pose = *rb.next_position();
    let mut out = Vec::new();
    for part in parts {
        let part_pose = pose * part.offset;
        backend.query_pipeline.intersections_with_shape(
            &backend.bodies,
            &backend.colliders,
            &part_pose,
            part.shape.as_ref(),
            filter(body, groups),
            |handle| {
                let (Some(collider), Some(other)) =
                    (backend.colliders.get(handle), backend.owner_of(handle))
                else {
                    return true;
                };
                let hit = query::contact(
                    &part_pose,
                    part.shape.as_ref(),
                    collider.position(),
                    collider.shape(),
                    0.0,
                );
                if let Ok(Some(c)) = hit {
                    if c.dist < 0.0 {
                        out.push(Contact {
                            this: sensor,
                            other,
                            point: point_to_system(&c.point2),
                            normal: -vector_to_system(&c.normal1).normalize_or_zero(),
                            distance: to_system(c.dist),
                            impulse: 0.0,
                        });
                    }
                }
                true
            },
        );
    }
    out
}
