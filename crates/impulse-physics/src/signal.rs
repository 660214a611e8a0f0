//! Per-substep hooks.

/// Identifies a connected callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(u64);

/// Callbacks fired once per internal substep with the substep length in
/// seconds.
#[derive(Default)]
pub struct StepSignal {
    slots: Vec<(SlotId, Box<dyn FnMut(f32)>)>,
    next: u64,
}

impl std::fmt::Debug for StepSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepSignal")
            .field("slots", &self.slots.len())
            .finish()
    }
}

impl StepSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, callback: impl FnMut(f32) + 'static) -> SlotId {
        let id = SlotId(self.next);
        self.next += 1;
        self.slots.push((id, Box::new(callback)));
        id
    }

    pub fn disconnect(&mut self, id: SlotId) -> bool {
        let before = self.slots.len();
        self.slots.retain(|(slot, _)| *slot != id);
        self.slots.len() != before
    }

    /// Call every slot in connection order.
    pub fn emit(&mut self, dt: f32) {
        for (_, callback) in &mut self.slots {
            callback(dt);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
