//! # Remote Sync Adapter
//!
//! The bridge between the [`MaterialStore`](crate::store::MaterialStore) and a
//! remote document collection.
//!
//! ## Contract
//!
//! - [`RemoteStore::subscribe`] starts a standing watch. Every remote change,
//!   whoever caused it, delivers a complete ordered list of materials as a
//!   [`SyncEvent::Snapshot`]. Snapshots are full state, never diffs, so a
//!   missed intermediate state is harmless.
//! - A watch that breaks delivers exactly one [`SyncEvent::Failed`] and then
//!   closes. Adapters never reconnect on their own.
//! - `create`, `update` and `delete` are independent calls. Their effect is
//!   visible to the caller only through a later snapshot.
//!
//! ## Backends
//!
//! - [`memory::InMemoryRemote`] - process-local collection with failure injection
//! - [`firestore::FirestoreRemote`] - Firestore REST API with a polling watch

pub mod firestore;
pub mod memory;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::{PriceError, PriceResult};
use crate::material::{Material, MaterialDraft, MaterialId, MaterialPatch};

pub use firestore::{FirestoreConfig, FirestoreRemote};
pub use memory::InMemoryRemote;

/// One delivery from a remote watch.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The full current collection
    Snapshot(Vec<Material>),
    /// The watch failed; nothing follows on this channel
    Failed(PriceError),
}

/// Receiving end of a remote watch
pub type SyncReceiver = mpsc::UnboundedReceiver<SyncEvent>;

/// A remote, possibly eventually-consistent, material collection.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Establish a watch over the collection.
    ///
    /// Fails with [`PriceError::Subscription`] if the watch cannot be set up.
    async fn subscribe(&self) -> PriceResult<SyncReceiver>;

    /// Create a document; the store assigns the id.
    async fn create(&self, draft: &MaterialDraft) -> PriceResult<MaterialId>;

    /// Write the fields named by the patch.
    async fn update(&self, id: &MaterialId, patch: &MaterialPatch) -> PriceResult<()>;

    async fn delete(&self, id: &MaterialId) -> PriceResult<()>;
}

/// Snapshot order: most recently updated first, undated last, then by id.
pub fn order_snapshot(materials: &mut [Material]) {
    materials.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}
