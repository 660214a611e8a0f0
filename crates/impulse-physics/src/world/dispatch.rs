//! Contact delivery to collision listeners after each substep.

use crate::handles::CollidableHandle;
use crate::listener::Contact;
use crate::system::ObjectStore;
use crate::units::{from_na, point_to_system, to_system};

use super::backend::WorldBackend;

/// Walk every manifold in narrow-phase order and hand each penetrating
/// point to the listeners on both sides. Contacts are gathered before any
/// listener runs.
pub(crate) fn dispatch_contacts(backend: &WorldBackend, store: &mut ObjectStore) {
    let has_listener = |handle: CollidableHandle| {
        store
            .collidables
            .get(&handle)
            .is_some_and(|c| c.listener.is_some())
    };

    let mut pending: Vec<Contact> = Vec::new();
    for pair in backend.narrow_phase.contact_pairs() {
        let (Some(a), Some(b)) = (backend.owner_of(pair.collider1), backend.owner_of(pair.collider2))
        else {
            continue;
        };
        let (listen_a, listen_b) = (has_listener(a), has_listener(b));
        if !listen_a && !listen_b {
            continue;
        }
        let (Some(c1), Some(c2)) = (
            backend.colliders.get(pair.collider1),
            backend.colliders.get(pair.collider2),
        ) else {
            continue;
        };
        for manifold in &pair.manifolds {
            let normal = from_na(&manifold.data.normal);
            for point in manifold.points.iter().filter(|p| p.dist < 0.0) {
                let distance = to_system(point.dist);
                let impulse = to_system(point.data.impulse);
                if listen_a {
                    pending.push(Contact {
                        this: a,
                        other: b,
                        point: point_to_system(&(c2.position() * point.local_p2)),
                        normal: -normal,
                        distance,
                        impulse,
                    });
                }
                if listen_b {
                    pending.push(Contact {
                        this: b,
                        other: a,
                        point: point_to_system(&(c1.position() * point.local_p1)),
                        normal,
                        distance,
                        impulse,
                    });
                }
            }
        }
    }

    for contact in &pending {
        if let Some(listener) = store
            .collidables
            .get_mut(&contact.this)
            .and_then(|c| c.listener.as_mut())
        {
            listener.on_collision(contact);
        }
    }
}
