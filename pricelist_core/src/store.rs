//! # Material Store
//!
//! The ordered, in-memory collection every view is drawn from. It changes in
//! exactly three ways:
//!
//! - [`MaterialStore::replace_all`] swaps in a full snapshot (remote sync and
//!   the local fallback load both arrive this way)
//! - [`MaterialStore::upsert_local`] / [`MaterialStore::remove_local`] patch
//!   the collection while the session runs without a remote
//!
//! Every change is announced to the registered [`StoreObserver`]s before the
//! mutating call returns, so views never lag the collection.
//!
//! Materials whose remote create failed are held apart in a pending list.
//! They are shown (flagged) next to the collection but never merged into it,
//! so a snapshot still replaces the collection entirely.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::errors::{PriceError, PriceResult};
use crate::material::{Material, MaterialDraft, MaterialId};

/// What just happened to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// A full snapshot replaced the collection
    Replaced,
    /// A material was inserted or updated locally
    Upserted(MaterialId),
    /// A material was removed locally
    Removed(MaterialId),
    /// The pending (unsynced) list changed
    PendingChanged,
}

/// Read-only view handed to observers.
#[derive(Debug, Clone, Copy)]
pub struct StoreView<'a> {
    pub materials: &'a [Material],
    pub pending: &'a [PendingMaterial],
}

/// Anything that must stay in step with the store (table, charts, summary).
pub trait StoreObserver: Send {
    fn on_change(&mut self, change: &StoreChange, view: StoreView<'_>);
}

/// A material the remote store has not accepted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMaterial {
    /// Client-side id, only meaningful on this machine
    pub local_id: MaterialId,
    pub draft: MaterialDraft,
    /// Why the last attempt failed
    pub last_error: String,
    pub attempts: u32,
}

impl PendingMaterial {
    /// Render-ready record carrying the local id.
    pub fn as_material(&self) -> Material {
        Material::from_draft(self.local_id.clone(), &self.draft)
    }
}

/// Ordered material collection plus pending outbox.
#[derive(Default)]
pub struct MaterialStore {
    materials: Vec<Material>,
    pending: Vec<PendingMaterial>,
    observers: Vec<Box<dyn StoreObserver>>,
}

impl MaterialStore {
    pub fn new() -> Self {
        MaterialStore::default()
    }

    /// Register an observer. It is called once immediately with the current state.
    pub fn subscribe(&mut self, mut observer: Box<dyn StoreObserver>) {
        observer.on_change(&StoreChange::Replaced, self.view());
        self.observers.push(observer);
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn pending(&self) -> &[PendingMaterial] {
        &self.pending
    }

    pub fn view(&self) -> StoreView<'_> {
        StoreView {
            materials: &self.materials,
            pending: &self.pending,
        }
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn find(&self, id: &MaterialId) -> Option<&Material> {
        self.materials.iter().find(|m| m.has_id(id))
    }

    /// Ids of every material in display order.
    pub fn ids(&self) -> Vec<MaterialId> {
        self.materials.iter().filter_map(|m| m.id.clone()).collect()
    }

    /// Atomically swap in a full snapshot.
    ///
    /// Nothing from the previous collection survives. A repeated id keeps its
    /// first occurrence.
    pub fn replace_all(&mut self, snapshot: Vec<Material>) {
        let mut seen = HashSet::new();
        let mut materials = Vec::with_capacity(snapshot.len());
        for material in snapshot {
            if let Some(id) = &material.id {
                if !seen.insert(id.clone()) {
                    warn!("dropping duplicate material id {} from snapshot", id);
                    continue;
                }
            }
            materials.push(material);
        }

        debug!("store replaced with {} materials", materials.len());
        self.materials = materials;
        self.notify(StoreChange::Replaced);
    }

    /// Insert or update a material by id. Only used without a remote.
    pub fn upsert_local(&mut self, material: Material) -> PriceResult<()> {
        let id = material
            .id
            .clone()
            .ok_or_else(|| PriceError::validation("id", "", "Material has no id"))?;

        match self.materials.iter_mut().find(|m| m.has_id(&id)) {
            Some(existing) => *existing = material,
            None => self.materials.insert(0, material),
        }

        self.notify(StoreChange::Upserted(id));
        Ok(())
    }

    /// Remove a material by id. Only used without a remote.
    pub fn remove_local(&mut self, id: &MaterialId) -> Option<Material> {
        let index = self.materials.iter().position(|m| m.has_id(id))?;
        let removed = self.materials.remove(index);
        self.notify(StoreChange::Removed(id.clone()));
        Some(removed)
    }

    /// Hold a draft the remote rejected. Returns its local id.
    pub fn push_pending(&mut self, draft: MaterialDraft, error: &PriceError) -> MaterialId {
        let local_id = MaterialId::local();
        self.pending.push(PendingMaterial {
            local_id: local_id.clone(),
            draft,
            last_error: error.to_string(),
            attempts: 1,
        });
        self.notify(StoreChange::PendingChanged);
        local_id
    }

    /// Take every pending draft out of the outbox, e.g. to retry them.
    pub fn take_pending(&mut self) -> Vec<PendingMaterial> {
        let taken = std::mem::take(&mut self.pending);
        if !taken.is_empty() {
            self.notify(StoreChange::PendingChanged);
        }
        taken
    }

    /// Put a draft back after another failed attempt.
    pub fn requeue_pending(&mut self, mut pending: PendingMaterial, error: &PriceError) {
        pending.attempts += 1;
        pending.last_error = error.to_string();
        self.pending.push(pending);
        self.notify(StoreChange::PendingChanged);
    }

    /// Drop a pending draft without sending it.
    pub fn discard_pending(&mut self, local_id: &MaterialId) -> Option<PendingMaterial> {
        let index = self.pending.iter().position(|p| &p.local_id == local_id)?;
        let removed = self.pending.remove(index);
        self.notify(StoreChange::PendingChanged);
        Some(removed)
    }

    fn notify(&mut self, change: StoreChange) {
        let view = StoreView {
            materials: &self.materials,
            pending: &self.pending,
        };
        for observer in self.observers.iter_mut() {
            observer.on_change(&change, view);
        }
    }
}
