//! Reference-counted collider cache.

use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec3;
use impulse_core::error::ColliderError;
use impulse_core::mesh::MeshProvider;

use super::{base_name, Collider};
use crate::handles::ColliderId;

/// Name given to procedural colliders.
pub const UNNAMED: &str = "unnamed";

#[derive(Debug)]
struct Entry {
    collider: Collider,
    refcount: u32,
}

// ---------------------------------------------------------------------------
// ColliderManager
// ---------------------------------------------------------------------------

/// Name-keyed cache of shared colliders plus a slot array for unnamed ones.
///
/// Named entries are keyed by source name, scale and hull flag. Unnamed
/// entries are procedural shapes that can never be looked up again, so they
/// live in index-addressed slots whose free entries get reused.
#[derive(Default)]
pub struct ColliderManager {
    provider: Option<Arc<dyn MeshProvider>>,
    by_key: HashMap<String, u32>,
    named: HashMap<u32, Entry>,
    next_named: u32,
    unnamed: Vec<Option<Entry>>,
}

impl std::fmt::Debug for ColliderManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColliderManager")
            .field("has_provider", &self.provider.is_some())
            .field("named", &self.named.len())
            .field("unnamed", &self.unnamed_count())
            .finish()
    }
}

/// Cache key for a mesh-derived collider.
pub fn cache_key(name: &str, scale: Vec3, convex_hull: bool) -> String {
    let hull = if convex_hull { "<convex>" } else { "" };
    format!("{name}<{} {} {}>{hull}", scale.x, scale.y, scale.z)
}

impl ColliderManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the mesh source named colliders are loaded from.
    pub fn init(&mut self, provider: Arc<dyn MeshProvider>) {
        self.provider = Some(provider);
    }

    /// Drop every collider regardless of reference count.
    pub fn shutdown(&mut self) {
        let live = self.named.values().filter(|e| e.refcount > 0).count()
            + self.unnamed.iter().flatten().filter(|e| e.refcount > 0).count();
        if live > 0 {
            tracing::warn!(live, "collider manager shut down with referenced colliders");
        }
        self.by_key.clear();
        self.named.clear();
        self.unnamed.clear();
        self.provider = None;
    }

    // ---- Lookup ----

    /// Return the cached collider for `(name, scale, convex_hull)` with one
    /// more reference, loading it through the mesh provider on a miss.
    pub fn get_collider(
        &mut self,
        name: &str,
        scale: Vec3,
        convex_hull: bool,
    ) -> Result<ColliderId, ColliderError> {
        let key = cache_key(name, scale, convex_hull);
        if let Some(&id) = self.by_key.get(&key) {
            if let Some(entry) = self.named.get_mut(&id) {
                entry.refcount += 1;
                return Ok(ColliderId::Named(id));
            }
        }

        let mesh = self
            .provider
            .as_ref()
            .and_then(|p| p.load(name))
            .ok_or_else(|| ColliderError::MeshNotFound(name.to_owned()))?;
        let mut collider = Collider::load(mesh.as_ref(), convex_hull, scale)?;
        collider.set_name(key.clone());
        tracing::debug!(key = %key, shape = ?collider.shape_type(), "collider loaded");

        let id = self.next_named;
        self.next_named += 1;
        self.by_key.insert(key, id);
        self.named.insert(
            id,
            Entry {
                collider,
                refcount: 1,
            },
        );
        Ok(ColliderId::Named(id))
    }

    /// Cached collider for the key without touching its reference count.
    pub fn find_collider(&self, name: &str, scale: Vec3, convex_hull: bool) -> Option<ColliderId> {
        self.by_key
            .get(&cache_key(name, scale, convex_hull))
            .map(|&id| ColliderId::Named(id))
    }

    /// Store a procedural collider with one reference, reusing a free slot.
    pub fn alloc_unnamed_collider(&mut self, mut collider: Collider) -> ColliderId {
        collider.set_name(UNNAMED.to_owned());
        let entry = Entry {
            collider,
            refcount: 1,
        };
        #[allow(clippy::cast_possible_truncation)]
        if let Some(slot) = self.unnamed.iter().position(Option::is_none) {
            self.unnamed[slot] = Some(entry);
            ColliderId::Unnamed(slot as u32)
        } else {
            self.unnamed.push(Some(entry));
            ColliderId::Unnamed((self.unnamed.len() - 1) as u32)
        }
    }

    /// Add a reference to an existing collider.
    pub fn retain_collider(&mut self, id: ColliderId) -> bool {
        match self.entry_mut(id) {
            Some(entry) => {
                entry.refcount += 1;
                true
            }
            None => false,
        }
    }

    pub fn collider(&self, id: ColliderId) -> Option<&Collider> {
        self.entry(id).map(|e| &e.collider)
    }

    pub fn refcount(&self, id: ColliderId) -> Option<u32> {
        self.entry(id).map(|e| e.refcount)
    }

    // ---- Release / destroy ----

    /// Drop one reference. With `immediate_destroy`, an entry whose count
    /// reaches zero is destroyed right away; otherwise it stays cached until
    /// [`destroy_unused_colliders`](Self::destroy_unused_colliders).
    pub fn release_collider(&mut self, id: ColliderId, immediate_destroy: bool) -> bool {
        let Some(entry) = self.entry_mut(id) else {
            tracing::warn!(collider = %id, "releasing unknown collider");
            return false;
        };
        if entry.refcount == 0 {
            tracing::warn!(collider = %id, "releasing collider with no references");
            return false;
        }
        entry.refcount -= 1;
        if entry.refcount == 0 && immediate_destroy {
            self.remove(id);
        }
        true
    }

    /// Destroy an entry whatever its reference count.
    pub fn destroy_collider(&mut self, id: ColliderId) -> bool {
        let Some(entry) = self.entry(id) else {
            return false;
        };
        if entry.refcount > 0 {
            tracing::warn!(
                name = entry.collider.name(),
                refcount = entry.refcount,
                "destroying a collider that is still referenced"
            );
        }
        self.remove(id);
        true
    }

    /// Free every zero-reference entry. Returns how many were freed.
    pub fn destroy_unused_colliders(&mut self) -> usize {
        let unused_named: Vec<u32> = self
            .named
            .iter()
            .filter(|(_, e)| e.refcount == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut freed = unused_named.len();
        for id in unused_named {
            self.remove(ColliderId::Named(id));
        }
        for slot in &mut self.unnamed {
            if slot.as_ref().is_some_and(|e| e.refcount == 0) {
                *slot = None;
                freed += 1;
            }
        }
        tracing::debug!(freed, "unused colliders destroyed");
        freed
    }

    // ---- Reload ----

    /// Rebuild every cached collider whose source mesh is `name`. Returns
    /// how many were rebuilt.
    pub fn reload_collider(&mut self, name: &str) -> usize {
        let Some(provider) = self.provider.clone() else {
            tracing::warn!(name, "no mesh provider to reload collider from");
            return 0;
        };
        let Some(mesh) = provider.load(name) else {
            tracing::warn!(name, "collider source mesh not found");
            return 0;
        };

        let mut reloaded = 0;
        for entry in self.named.values_mut() {
            if base_name(entry.collider.name()) != name || !entry.collider.is_mesh_backed() {
                continue;
            }
            match entry.collider.reload(mesh.as_ref()) {
                Ok(()) => reloaded += 1,
                Err(err) => tracing::warn!(name, %err, "collider reload failed"),
            }
        }
        tracing::debug!(name, reloaded, "colliders reloaded");
        reloaded
    }

    // ---- Stats ----

    pub fn named_count(&self) -> usize {
        self.named.len()
    }

    pub fn unnamed_count(&self) -> usize {
        self.unnamed.iter().flatten().count()
    }

    // ---- Internals ----

    fn entry(&self, id: ColliderId) -> Option<&Entry> {
        match id {
            ColliderId::Named(id) => self.named.get(&id),
            ColliderId::Unnamed(slot) => self.unnamed.get(slot as usize)?.as_ref(),
        }
    }

    fn entry_mut(&mut self, id: ColliderId) -> Option<&mut Entry> {
        match id {
            ColliderId::Named(id) => self.named.get_mut(&id),
            ColliderId::Unnamed(slot) => self.unnamed.get_mut(slot as usize)?.as_mut(),
        }
    }

    fn remove(&mut self, id: ColliderId) {
        match id {
            ColliderId::Named(id) => {
                if let Some(entry) = self.named.remove(&id) {
                    self.by_key.remove(entry.collider.name());
                }
            }
            ColliderId::Unnamed(slot) => {
                if let Some(entry) = self.unnamed.get_mut(slot as usize) {
                    *entry = None;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
