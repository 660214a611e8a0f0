//! Debug line rendering through rapier's `DebugRenderPipeline`.

use glam::Vec3;
use impulse_core::config::DebugDrawMode;
use rapier3d::pipeline::{
    DebugRenderBackend, DebugRenderMode, DebugRenderObject, DebugRenderPipeline, DebugRenderStyle,
};
use rapier3d::prelude::{Point, Real};

use super::PhysicsWorld;
use crate::units::point_to_system;

/// Receiver of debug lines in system units. Colors are HSLA.
pub trait DebugLineSink {
    fn draw_line(&mut self, from: Vec3, to: Vec3, color: [f32; 4]);
}

impl DebugLineSink for Vec<(Vec3, Vec3)> {
    fn draw_line(&mut self, from: Vec3, to: Vec3, _color: [f32; 4]) {
        self.push((from, to));
    }
}

struct SinkAdapter<'a> {
    sink: &'a mut dyn DebugLineSink,
}

impl DebugRenderBackend for SinkAdapter<'_> {
    fn draw_line(
        &mut self,
        _object: DebugRenderObject,
        a: Point<Real>,
        b: Point<Real>,
        color: [f32; 4],
    ) {
        self.sink
            .draw_line(point_to_system(&a), point_to_system(&b), color);
    }
}

/// Rapier render channels enabled by a draw mode.
pub(crate) fn render_mode(mode: DebugDrawMode) -> DebugRenderMode {
    let mut out = DebugRenderMode::empty();
    if mode.contains(DebugDrawMode::WIREFRAME) {
        out |= DebugRenderMode::COLLIDER_SHAPES;
    }
    if mode.contains(DebugDrawMode::AABB) {
        out |= DebugRenderMode::COLLIDER_AABBS;
    }
    if mode.contains(DebugDrawMode::CONTACT_POINTS) {
        out |= DebugRenderMode::CONTACTS;
    }
    if mode.contains(DebugDrawMode::NORMALS) {
        out |= DebugRenderMode::SOLVER_CONTACTS;
    }
    if mode.contains(DebugDrawMode::CONSTRAINTS) || mode.contains(DebugDrawMode::CONSTRAINT_LIMITS) {
        out |= DebugRenderMode::IMPULSE_JOINTS;
    }
    out
}

impl PhysicsWorld {
    /// Emit debug lines for the channels in the world's draw mode. Does
    /// nothing while the mode has no drawable channel.
    pub fn debug_draw(&self, sink: &mut dyn DebugLineSink) {
        let mode = render_mode(self.debug_draw_mode());
        if mode.is_empty() {
            return;
        }
        let mut pipeline = DebugRenderPipeline::new(DebugRenderStyle::default(), mode);
        let backend = &self.backend;
        pipeline.render(
            &mut SinkAdapter { sink },
            &backend.bodies,
            &backend.colliders,
            &backend.impulse_joints,
            &backend.multibody_joints,
            &backend.narrow_phase,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_mode_maps_to_render_channels() {
        assert!(render_mode(DebugDrawMode::NONE).is_empty());
        let mode = render_mode(DebugDrawMode::WIREFRAME | DebugDrawMode::CONSTRAINT_LIMITS);
        assert!(mode.contains(DebugRenderMode::COLLIDER_SHAPES));
        assert!(mode.contains(DebugRenderMode::IMPULSE_JOINTS));
        assert!(!mode.contains(DebugRenderMode::CONTACTS));
        // Flags without a drawable channel render nothing.
        assert!(render_mode(DebugDrawMode::NO_DEACTIVATION | DebugDrawMode::CCD).is_empty());
    }
}
