//! Contact recording for listener tests.

use std::cell::RefCell;
use std::rc::Rc;

use impulse_physics::listener::{CollisionListener, Contact};
use impulse_physics::CollidableHandle;

/// Shared view of the contacts a [`recording_listener`] has seen.
#[derive(Debug, Clone, Default)]
pub struct ContactLog {
    contacts: Rc<RefCell<Vec<Contact>>>,
}

impl ContactLog {
    pub fn len(&self) -> usize {
        self.contacts.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.borrow().is_empty()
    }

    /// Copy of every recorded contact, in delivery order.
    pub fn contacts(&self) -> Vec<Contact> {
        self.contacts.borrow().clone()
    }

    /// Whether any contact with `other` was recorded.
    pub fn touched(&self, other: CollidableHandle) -> bool {
        self.contacts.borrow().iter().any(|c| c.other == other)
    }

    pub fn clear(&self) {
        self.contacts.borrow_mut().clear();
    }
}

/// A listener that appends every contact to the returned log.
pub fn recording_listener() -> (Box<dyn CollisionListener>, ContactLog) {
    let log = ContactLog::default();
    let sink = Rc::clone(&log.contacts);
    let listener = move |contact: &Contact| sink.borrow_mut().push(*contact);
    (Box::new(listener), log)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
