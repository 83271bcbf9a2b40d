//! In-process remote collection.
//!
//! Behaves like a document store with a change feed: ids are assigned by the
//! store, every mutation fans a full snapshot out to every open watch, and
//! failures can be injected to exercise the fallback paths.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::{order_snapshot, RemoteStore, SyncEvent, SyncReceiver};
use crate::errors::{PriceError, PriceResult};
use crate::material::{Material, MaterialDraft, MaterialId, MaterialPatch};

#[derive(Default)]
struct Collection {
    documents: HashMap<MaterialId, Material>,
    watchers: Vec<mpsc::UnboundedSender<SyncEvent>>,
    failing_writes: Option<String>,
    failing_ids: HashSet<MaterialId>,
    failing_subscribe: Option<String>,
    writes: usize,
}

impl Collection {
    fn snapshot(&self) -> Vec<Material> {
        let mut list: Vec<Material> = self.documents.values().cloned().collect();
        order_snapshot(&mut list);
        list
    }

    fn broadcast(&mut self) {
        let snapshot = self.snapshot();
        self.watchers
            .retain(|watcher| watcher.send(SyncEvent::Snapshot(snapshot.clone())).is_ok());
        debug!(
            "broadcast snapshot of {} materials to {} watchers",
            snapshot.len(),
            self.watchers.len()
        );
    }

    fn check_write(&self, operation: &str, id: Option<&MaterialId>) -> PriceResult<()> {
        if let Some(reason) = &self.failing_writes {
            return Err(PriceError::remote(operation, reason.clone()));
        }
        if let Some(id) = id {
            if self.failing_ids.contains(id) {
                return Err(PriceError::remote(operation, format!("write to {} rejected", id)));
            }
        }
        Ok(())
    }
}

/// A remote collection that lives in this process.
#[derive(Default)]
pub struct InMemoryRemote {
    collection: RwLock<Collection>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        InMemoryRemote::default()
    }

    /// Start with existing documents. Records without an id get a fresh one.
    pub fn seeded(materials: Vec<Material>) -> Self {
        let mut collection = Collection::default();
        for mut material in materials {
            let id = material.id.clone().unwrap_or_else(new_document_id);
            material.id = Some(id.clone());
            collection.documents.insert(id, material);
        }
        InMemoryRemote {
            collection: RwLock::new(collection),
        }
    }

    /// Current documents in snapshot order.
    pub async fn documents(&self) -> Vec<Material> {
        self.collection.read().await.snapshot()
    }

    /// Number of successful writes so far.
    pub async fn write_count(&self) -> usize {
        self.collection.read().await.writes
    }

    /// Make every write fail with `reason`, or succeed again with `None`.
    pub async fn fail_writes(&self, reason: Option<&str>) {
        self.collection.write().await.failing_writes = reason.map(str::to_string);
    }

    /// Make writes to one document fail.
    pub async fn fail_writes_to(&self, id: &MaterialId) {
        self.collection.write().await.failing_ids.insert(id.clone());
    }

    /// Make the next subscribe calls fail with `reason`.
    pub async fn fail_subscribe(&self, reason: Option<&str>) {
        self.collection.write().await.failing_subscribe = reason.map(str::to_string);
    }

    /// Break every open watch: each receives one failure and is closed.
    pub async fn break_watches(&self, reason: &str) {
        let mut collection = self.collection.write().await;
        for watcher in collection.watchers.drain(..) {
            let _ = watcher.send(SyncEvent::Failed(PriceError::subscription(reason)));
        }
    }

    /// Number of watches still open.
    pub async fn watcher_count(&self) -> usize {
        let mut collection = self.collection.write().await;
        collection.watchers.retain(|w| !w.is_closed());
        collection.watchers.len()
    }
}

fn new_document_id() -> MaterialId {
    MaterialId::new(Uuid::new_v4().simple().to_string())
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn subscribe(&self) -> PriceResult<SyncReceiver> {
        let mut collection = self.collection.write().await;
        if let Some(reason) = &collection.failing_subscribe {
            return Err(PriceError::subscription(reason.clone()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(SyncEvent::Snapshot(collection.snapshot()));
        collection.watchers.push(tx);
        Ok(rx)
    }

    async fn create(&self, draft: &MaterialDraft) -> PriceResult<MaterialId> {
        let mut collection = self.collection.write().await;
        collection.check_write("create", None)?;

        let id = new_document_id();
        collection
            .documents
            .insert(id.clone(), Material::from_draft(id.clone(), draft));
        collection.writes += 1;
        collection.broadcast();
        Ok(id)
    }

    async fn update(&self, id: &MaterialId, patch: &MaterialPatch) -> PriceResult<()> {
        let mut collection = self.collection.write().await;
        collection.check_write("update", Some(id))?;

        let document = collection
            .documents
            .get_mut(id)
            .ok_or_else(|| PriceError::remote("update", format!("No document to update: {}", id)))?;
        patch.apply_to(document);
        collection.writes += 1;
        collection.broadcast();
        Ok(())
    }

    async fn delete(&self, id: &MaterialId) -> PriceResult<()> {
        let mut collection = self.collection.write().await;
        collection.check_write("delete", Some(id))?;

        collection.documents.remove(id);
        collection.writes += 1;
        collection.broadcast();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::material::FieldUpdate;

    fn draft(name: &str) -> MaterialDraft {
        MaterialDraft::new(
            name,
            "unit",
            Decimal::from(1000),
            Decimal::from(30),
            Decimal::from(15)).stamped(Utc::now(),
        )
    }

    fn expect_snapshot(event: Option<SyncEvent>) -> Vec<Material> {
        match event {
            Some(SyncEvent::Snapshot(list)) => list,
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_subscribe_delivers_initial_and_full_snapshots() {
        let remote = InMemoryRemote::new();
        let mut rx = remote.subscribe().await.unwrap();
        assert!(expect_snapshot(rx.recv().await).is_empty());

        let a = remote.create(&draft("A")).await.unwrap();
        let b = remote.create(&draft("B")).await.unwrap();
        assert_eq!(expect_snapshot(rx.recv().await).len(), 1);
        let full = expect_snapshot(rx.recv().await);
        assert_eq!(full.len(), 2);
        assert!(full.iter().any(|m| m.has_id(&a)));
        assert!(full.iter().any(|m| m.has_id(&b)));

        remote.delete(&a).await.unwrap();
        let after_delete = expect_snapshot(rx.recv().await);
        assert_eq!(after_delete.len(), 1);
        assert!(after_delete[0].has_id(&b));
    }

    #[tokio::test]
    async fn test_update_applies_patch() {
        let remote = InMemoryRemote::new();
        let id = remote.create(&draft("A")).await.unwrap();
        remote
            .update(&id, &MaterialPatch::single(FieldUpdate::Markup(Decimal::from(50)), Utc::now()))
            .await
            .unwrap();

        let docs = remote.documents().await;
        assert_eq!(docs[0].markup, Decimal::from(50));
        assert_eq!(remote.write_count().await, 2);

        let missing = remote
            .update(&MaterialId::new("nope"), &MaterialPatch::new(vec![], Utc::now()))
            .await;
        assert!(matches!(missing, Err(PriceError::Remote { .. })));
    }

    #[tokio::test]
    async fn test_failed_writes_change_nothing() {
        let remote = InMemoryRemote::new();
        remote.fail_writes(Some("offline")).await;
        assert!(remote.create(&draft("A")).await.is_err());
        assert!(remote.documents().await.is_empty());

        remote.fail_writes(None).await;
        let id = remote.create(&draft("A")).await.unwrap();
        remote.fail_writes_to(&id).await;
        assert!(remote.delete(&id).await.is_err());
        assert_eq!(remote.documents().await.len(), 1);
    }

    #[tokio::test]
    async fn test_broken_watch_fails_exactly_once() {
        let remote = InMemoryRemote::new();
        let mut rx = remote.subscribe().await.unwrap();
        expect_snapshot(rx.recv().await);

        remote.break_watches("connection reset").await;
        let failure = rx.recv().await;
        assert!(matches!(failure, Some(SyncEvent::Failed(PriceError::Subscription { .. }))));
        assert!(rx.recv().await.is_none());
        assert_eq!(remote.watcher_count().await, 0);

        // Writes keep working but nobody is notified
        remote.create(&draft("A")).await.unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_failure() {
        let remote = InMemoryRemote::new();
        remote.fail_subscribe(Some("permission denied")).await;
        assert!(matches!(remote.subscribe().await, Err(PriceError::Subscription { .. })));
    }
}
