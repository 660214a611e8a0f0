//! Contact callbacks delivered during stepping.

use glam::Vec3;

use crate::handles::CollidableHandle;

/// One penetrating contact point, as seen from `this` collidable.
///
/// All quantities are in system units. `point` lies on the other object's
/// surface and `normal` points from the other object towards this one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub this: CollidableHandle,
    pub other: CollidableHandle,
    pub point: Vec3,
    pub normal: Vec3,
    /// Signed separation; negative while penetrating.
    pub distance: f32,
    /// Normal impulse applied by the solver this substep.
    pub impulse: f32,
}

/// Synchronous observer invoked once per penetrating contact point, every
/// substep, while the world is stepping.
pub trait CollisionListener {
    fn on_collision(&mut self, contact: &Contact);
}

impl<F> CollisionListener for F
where
    F: FnMut(&Contact),
{
    fn on_collision(&mut self, contact: &Contact) {
        self(contact);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_listeners() {
        let mut seen = Vec::new();
        {
            let mut listener = |c: &Contact| seen.push(c.other);
            let contact = Contact {
                this: CollidableHandle(0),
                other: CollidableHandle(7),
                point: Vec3::ZERO,
                normal: Vec3::Z,
                distance: -0.1,
                impulse: 2.0,
            };
            listener.on_collision(&contact);
        }
        assert_eq!(seen, vec![CollidableHandle(7)]);
    }
}
