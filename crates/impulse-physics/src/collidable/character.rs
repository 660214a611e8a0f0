//! Kinematic character movement.

use glam::Vec3;
use rapier3d::control::{CharacterAutostep, CharacterLength, KinematicCharacterController};
use rapier3d::prelude::{InteractionGroups, QueryFilter, RigidBodyHandle, Vector};

use super::{CollidableRef, ShapePart};
use crate::units::{to_physics, vector_to_physics, vector_to_system};
use crate::world::backend::WorldBackend;

/// Movement limits of a character, in system units and radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharacterDesc {
    /// Tallest ledge climbed without jumping.
    pub step_height: f32,
    pub max_slope_climb_angle: f32,
    /// Distance within which the character sticks to the ground when
    /// walking down; zero disables snapping.
    pub snap_to_ground: f32,
}

impl Default for CharacterDesc {
    fn default() -> Self {
        Self {
            step_height: 30.0,
            max_slope_climb_angle: 45f32.to_radians(),
            snap_to_ground: 20.0,
        }
    }
}

/// Controller and last grounded flag of a character collidable.
#[derive(Debug, Clone)]
pub struct CharacterState {
    controller: KinematicCharacterController,
    grounded: bool,
}

impl CharacterState {
    pub(crate) fn new(desc: &CharacterDesc) -> Self {
        let mut controller = KinematicCharacterController {
            up: Vector::z_axis(),
            max_slope_climb_angle: desc.max_slope_climb_angle,
            min_slope_slide_angle: desc.max_slope_climb_angle,
            ..KinematicCharacterController::default()
        };
        controller.autostep = (desc.step_height > 0.0).then(|| CharacterAutostep {
            max_height: CharacterLength::Absolute(to_physics(desc.step_height)),
            min_width: CharacterLength::Relative(0.5),
            include_dynamic_bodies: false,
        });
        controller.snap_to_ground = (desc.snap_to_ground > 0.0)
            .then(|| CharacterLength::Absolute(to_physics(desc.snap_to_ground)));
        Self {
            controller,
            grounded: false,
        }
    }

    /// Whether the last move ended standing on something.
    pub fn is_grounded(&self) -> bool {
        self.grounded
    }

    /// Slide the character's shape along `displacement` and queue the
    /// resulting pose for the next step. Returns the displacement actually
    /// taken, in system units.
    pub(crate) fn move_shape(
        &mut self,
        backend: &mut WorldBackend,
        body: RigidBodyHandle,
        part: &ShapePart,
        groups: InteractionGroups,
        displacement: Vec3,
        dt: f32,
    ) -> Option<Vec3> {
        let start = *backend.bodies.get(body)?.next_position();
        let filter = QueryFilter::new()
            .exclude_rigid_body(body)
            .exclude_sensors()
            .groups(groups);
        let movement = self.controller.move_shape(
            dt,
            &backend.bodies,
            &backend.colliders,
            &backend.query_pipeline,
            part.shape.as_ref(),
            &(start * part.offset),
            vector_to_physics(displacement),
            filter,
            |_| {},
        );
        self.grounded = movement.grounded;

        let mut target = start;
        target.translation.vector += movement.translation;
        backend.bodies.get_mut(body)?.set_next_kinematic_position(target);
        Some(vector_to_system(&movement.translation))
    }
}

impl CollidableRef<'_> {
    /// Always `false` for anything but a character.
    pub fn is_grounded(&self) -> bool {
        self.inner
            .rigid()
            .and_then(|r| r.character.as_ref())
            .is_some_and(CharacterState::is_grounded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn controller_is_z_up_in_physics_units() {
        let state = CharacterState::new(&CharacterDesc::default());
        assert_relative_eq!(state.controller.up.z, 1.0);
        match state.controller.autostep.map(|s| s.max_height) {
            Some(CharacterLength::Absolute(h)) => assert_relative_eq!(h, 0.3, max_relative = 1e-5),
            other => panic!("unexpected autostep {other:?}"),
        }
        assert!(!state.is_grounded());
    }

    #[test]
    fn zero_step_height_disables_autostep() {
        let state = CharacterState::new(&CharacterDesc {
            step_height: 0.0,
            snap_to_ground: 0.0,
            ..CharacterDesc::default()
        });
        assert!(state.controller.autostep.is_none());
        assert!(state.controller.snap_to_ground.is_none());
    }
}
