//! # Command Layer
//!
//! [`PriceListApp`] is the session context: it owns the [`MaterialStore`], the
//! optional remote adapter, the local fallback store and the operator
//! settings, and exposes one method per user command.
//!
//! ## Sync modes
//!
//! - [`SyncMode::Remote`]: writes go to the remote store only. The collection
//!   changes when the next snapshot arrives through
//!   [`PriceListApp::apply_sync_event`], and every applied snapshot is mirrored
//!   to local storage.
//! - [`SyncMode::LocalOnly`]: entered at start without a remote, or for the
//!   rest of the session after the remote watch fails. Writes patch the store
//!   directly and are persisted to local storage.
//!
//! Every command validates its input before any remote call, reports its
//! outcome through the [`Notifier`] and returns it. Failures never end the
//! session.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use pricelist_core::app::{AutoConfirm, PriceListApp};
//! use pricelist_core::local::{LocalFallbackStore, MemoryStorage};
//! use pricelist_core::presentation::{Notifier, StatusMessage};
//! use pricelist_core::validation::MaterialInput;
//!
//! struct Quiet;
//! impl Notifier for Quiet {
//!     fn notify(&self, _message: StatusMessage) {}
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let local = LocalFallbackStore::new(Box::new(MemoryStorage::new()));
//! let mut app = PriceListApp::new(None, local, Arc::new(AutoConfirm(true)), Arc::new(Quiet));
//! app.start().await;
//!
//! app.add_material(&MaterialInput::new("Freon R32", "120000", "kg")).await.unwrap();
//! assert_eq!(app.materials().len(), 1);
//! # });
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::join_all;
use rust_decimal::Decimal;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, error, info, warn};

use crate::errors::{PriceError, PriceResult};
use crate::local::LocalFallbackStore;
use crate::material::{FieldUpdate, Material, MaterialDraft, MaterialId, MaterialPatch};
use crate::presentation::{Dashboard, Notifier, StatusMessage};
use crate::remote::{RemoteStore, SyncEvent, SyncReceiver};
use crate::settings::PricingSettings;
use crate::store::{MaterialStore, PendingMaterial, StoreObserver};
use crate::transfer::{self, ExportDocument, ImportBundle};
use crate::validation::{
    self, find_duplicate_name, validate_new_material, validate_settings, EditableField,
    MaterialInput,
};

/// Where writes currently go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Remote,
    LocalOnly,
}

/// Asks the operator a yes/no question.
#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, question: &str) -> bool;
}

/// Answers every question the same way.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

#[async_trait]
impl Confirm for AutoConfirm {
    async fn confirm(&self, _question: &str) -> bool {
        self.0
    }
}

/// Result of an add command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// Written; in remote mode it appears with the next snapshot
    Created(MaterialId),
    /// The remote write failed; held in the pending list under a local id
    Pending(MaterialId),
    /// The operator declined the duplicate-name confirmation
    Cancelled,
}

/// Result of a command that issues one independent write per material.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkOutcome {
    /// Ids written successfully
    pub succeeded: Vec<MaterialId>,
    /// Target (id or name) and error of every failed write
    pub failed: Vec<(String, PriceError)>,
    pub cancelled: bool,
}

impl BulkOutcome {
    fn cancelled() -> Self {
        BulkOutcome {
            cancelled: true,
            ..BulkOutcome::default()
        }
    }

    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.failed.is_empty()
    }

    fn record(&mut self, target: String, result: PriceResult<MaterialId>) {
        match result {
            Ok(id) => self.succeeded.push(id),
            Err(e) => self.failed.push((target, e)),
        }
    }

    fn summary(&self, action: &str) -> StatusMessage {
        if self.failed.is_empty() {
            StatusMessage::success(format!("{} {} materials", action, self.succeeded.len()))
        } else {
            StatusMessage::error(format!(
                "{} {} of {} materials; {} failed: {}",
                action,
                self.succeeded.len(),
                self.attempted(),
                self.failed.len(),
                self.failed[0].1
            ))
        }
    }
}

/// The four materials offered to an empty price list.
pub fn sample_drafts() -> Vec<MaterialDraft> {
    vec![
        MaterialDraft::new(
            "AC Split 1 PK",
            "unit",
            Decimal::from(2_500_000),
            Decimal::from(30),
            Decimal::from(15),
        ),
        MaterialDraft::new(
            "Pipa Tembaga 1/2\"",
            "meter",
            Decimal::from(85_000),
            Decimal::from(25),
            Decimal::from(15),
        ),
        MaterialDraft::new(
            "Freon R32",
            "kg",
            Decimal::from(120_000),
            Decimal::from(35),
            Decimal::from(15),
        ),
        MaterialDraft::new(
            "Kabel NYM 3x2.5",
            "meter",
            Decimal::from(15_000),
            Decimal::from(20),
            Decimal::from(15),
        ),
    ]
}

/// One price list session.
pub struct PriceListApp {
    store: MaterialStore,
    remote: Option<Arc<dyn RemoteStore>>,
    local: LocalFallbackStore,
    settings: PricingSettings,
    mode: SyncMode,
    sync_events: Option<SyncReceiver>,
    confirm: Arc<dyn Confirm>,
    notifier: Arc<dyn Notifier>,
}

impl PriceListApp {
    /// Create a session. Settings are loaded from local storage right away;
    /// materials arrive on [`PriceListApp::start`].
    pub fn new(
        remote: Option<Arc<dyn RemoteStore>>,
        local: LocalFallbackStore,
        confirm: Arc<dyn Confirm>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let settings = local.load_settings();
        let mode = if remote.is_some() {
            SyncMode::Remote
        } else {
            SyncMode::LocalOnly
        };

        PriceListApp {
            store: MaterialStore::new(),
            remote,
            local,
            settings,
            mode,
            sync_events: None,
            confirm,
            notifier,
        }
    }

    /// Open the remote watch, or load local data when there is no remote.
    ///
    /// A failed subscribe switches the session to local-only mode.
    pub async fn start(&mut self) {
        let Some(remote) = self.remote.clone() else {
            info!("no remote configured, working from local storage");
            self.load_local();
            return;
        };

        match remote.subscribe().await {
            Ok(events) => {
                info!("subscribed to {} remote", remote.name());
                self.notifier.notify(StatusMessage::info("Loading materials..."));
                self.sync_events = Some(events);
            }
            Err(e) => self.fall_back_to_local(e),
        }
    }

    /// Stop using the remote for the rest of the session and reload local data.
    pub fn fall_back_to_local(&mut self, reason: PriceError) {
        warn!("remote sync unavailable, falling back to local storage: {}", reason);
        self.mode = SyncMode::LocalOnly;
        self.sync_events = None;
        self.notifier.notify(StatusMessage::error(format!(
            "Remote sync unavailable, working offline: {}",
            reason
        )));
        self.load_local();
    }

    fn load_local(&mut self) {
        match self.local.load() {
            Ok(materials) => {
                info!("loaded {} materials from local storage", materials.len());
                self.store.replace_all(materials);
            }
            Err(e) => {
                error!("could not load local data: {}", e);
                self.notifier
                    .notify(StatusMessage::error(format!("Could not load local data: {}", e)));
            }
        }
    }

    /// Wait for the next remote event. Never resolves without an open watch.
    ///
    /// A watch that closes without reporting a failure is reported as one.
    pub async fn next_sync_event(&mut self) -> SyncEvent {
        match self.sync_events.as_mut() {
            Some(events) => match events.recv().await {
                Some(event) => event,
                None => SyncEvent::Failed(PriceError::subscription("Remote watch closed")),
            },
            None => std::future::pending().await,
        }
    }

    /// Apply one remote event to the session.
    pub fn apply_sync_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::Snapshot(materials) => {
                if self.mode != SyncMode::Remote {
                    debug!("ignoring snapshot while working offline");
                    return;
                }
                debug!("applying snapshot of {} materials", materials.len());
                self.store.replace_all(materials);
                if let Err(e) = self.local.save(self.store.materials()) {
                    warn!("could not mirror snapshot to local storage: {}", e);
                }
            }
            SyncEvent::Failed(e) => self.fall_back_to_local(e),
        }
    }

    /// Apply every remote event that has already arrived. Returns how many.
    pub fn drain_sync_events(&mut self) -> usize {
        let mut applied = 0;
        while let Some(events) = self.sync_events.as_mut() {
            let event = match events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    SyncEvent::Failed(PriceError::subscription("Remote watch closed"))
                }
            };
            self.apply_sync_event(event);
            applied += 1;
        }
        applied
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Add a material with the current default markup and margin.
    ///
    /// A name that already exists needs confirmation. When the remote create
    /// fails the material is kept in the pending list.
    pub async fn add_material(&mut self, input: &MaterialInput) -> PriceResult<AddOutcome> {
        let result = self.try_add_material(input).await;
        self.report_failure("add material", &result);
        result
    }

    async fn try_add_material(&mut self, input: &MaterialInput) -> PriceResult<AddOutcome> {
        let draft = validate_new_material(input, &self.settings)?.stamped(Utc::now());

        if let Some(existing) = find_duplicate_name(self.store.materials(), &draft.name) {
            let question = format!(
                "A material named '{}' already exists. Add it anyway?",
                existing.name
            );
            if !self.confirm.confirm(&question).await {
                self.notifier.notify(StatusMessage::info("Add cancelled"));
                return Ok(AddOutcome::Cancelled);
            }
        }

        let Some(remote) = self.active_remote() else {
            let id = MaterialId::local();
            self.store.upsert_local(Material::from_draft(id.clone(), &draft))?;
            self.persist_local();
            info!("added material {} locally", id);
            self.notifier.notify(StatusMessage::success("Material added"));
            return Ok(AddOutcome::Created(id));
        };

        match remote.create(&draft).await {
            Ok(id) => {
                info!("created material {} ({})", id, draft.name);
                self.notifier.notify(StatusMessage::success("Material added"));
                Ok(AddOutcome::Created(id))
            }
            Err(e) => {
                error!("remote create of '{}' failed: {}", draft.name, e);
                let local_id = self.store.push_pending(draft, &e);
                self.notifier.notify(StatusMessage::error(format!(
                    "Could not save to remote, kept as unsynced: {}",
                    e
                )));
                Ok(AddOutcome::Pending(local_id))
            }
        }
    }

    /// Change one field of a material from raw operator text.
    ///
    /// A rejected value leaves the stored material untouched.
    pub async fn edit_field(
        &mut self,
        id: &MaterialId,
        field: EditableField,
        raw: &str,
    ) -> PriceResult<()> {
        let result = match field.parse_value(raw) {
            Ok(update) => self.write_patch(id, MaterialPatch::single(update, Utc::now())).await,
            Err(e) => Err(e),
        };
        self.report_failure("update material", &result);
        result
    }

    /// Replace name, real price and unit in one update.
    pub async fn edit_material(
        &mut self,
        id: &MaterialId,
        name: &str,
        real_price: &str,
        unit: &str,
    ) -> PriceResult<()> {
        let result = match Self::full_edit(name, real_price, unit) {
            Ok(updates) => self.write_patch(id, MaterialPatch::new(updates, Utc::now())).await,
            Err(e) => Err(e),
        };
        self.report_failure("update material", &result);
        result
    }

    fn full_edit(name: &str, real_price: &str, unit: &str) -> PriceResult<Vec<FieldUpdate>> {
        Ok(vec![
            FieldUpdate::Name(validation::validate_name(name)?),
            FieldUpdate::RealPrice(validation::validate_real_price(real_price)?),
            FieldUpdate::Unit(validation::validate_unit(unit)?),
        ])
    }

    async fn write_patch(&mut self, id: &MaterialId, patch: MaterialPatch) -> PriceResult<()> {
        self.check_not_pending(id)?;
        let mut material = self
            .store
            .find(id)
            .cloned()
            .ok_or_else(|| PriceError::not_found(id.as_str()))?;

        match self.active_remote() {
            Some(remote) => remote.update(id, &patch).await?,
            None => {
                patch.apply_to(&mut material);
                self.store.upsert_local(material)?;
                self.persist_local();
            }
        }

        info!("updated {} of material {}", patch.field_paths().join(", "), id);
        self.notifier.notify(StatusMessage::success("Material updated"));
        Ok(())
    }

    /// Delete one material after confirmation. Returns false when declined.
    ///
    /// Pending materials are dropped from the pending list.
    pub async fn delete_material(&mut self, id: &MaterialId) -> PriceResult<bool> {
        let result = self.try_delete_material(id).await;
        self.report_failure("delete material", &result);
        result
    }

    async fn try_delete_material(&mut self, id: &MaterialId) -> PriceResult<bool> {
        let name = match self.store.find(id) {
            Some(material) => material.name.clone(),
            None => match self.store.pending().iter().find(|p| &p.local_id == id) {
                Some(pending) => pending.draft.name.clone(),
                None => return Err(PriceError::not_found(id.as_str())),
            },
        };

        let question = format!("Delete '{}'?", name);
        if !self.confirm.confirm(&question).await {
            return Ok(false);
        }

        if self.store.discard_pending(id).is_some() {
            info!("discarded unsynced material {}", id);
        } else {
            match self.active_remote() {
                Some(remote) => remote.delete(id).await?,
                None => {
                    self.store.remove_local(id);
                    self.persist_local();
                }
            }
            info!("deleted material {}", id);
        }

        self.notifier.notify(StatusMessage::success("Material deleted"));
        Ok(true)
    }

    /// Set markup and profit margin on every material, after confirmation.
    ///
    /// The two values also become the new defaults. Each material is written
    /// independently, so some writes may fail while others succeed.
    pub async fn apply_margins(
        &mut self,
        markup: &str,
        profit_margin: &str,
    ) -> PriceResult<BulkOutcome> {
        let result = self.try_apply_margins(markup, profit_margin).await;
        self.report_failure("apply margins", &result);
        result
    }

    async fn try_apply_margins(
        &mut self,
        markup: &str,
        profit_margin: &str,
    ) -> PriceResult<BulkOutcome> {
        let settings = validate_settings(markup, profit_margin)?;

        let ids = self.store.ids();
        if ids.is_empty() {
            self.store_settings(settings)?;
            self.notifier.notify(StatusMessage::info("No materials to update"));
            return Ok(BulkOutcome::default());
        }

        let question = format!(
            "Apply markup {}% and profit margin {}% to all {} materials?",
            settings.default_markup.normalize(),
            settings.profit_margin.normalize(),
            ids.len()
        );
        if !self.confirm.confirm(&question).await {
            return Ok(BulkOutcome::cancelled());
        }
        self.store_settings(settings)?;

        let patch = MaterialPatch::new(
            vec![
                FieldUpdate::Markup(settings.default_markup),
                FieldUpdate::ProfitMargin(settings.profit_margin),
            ],
            Utc::now(),
        );

        let mut outcome = BulkOutcome::default();
        match self.active_remote() {
            Some(remote) => {
                let remote = remote.as_ref();
                let patch = &patch;
                let results = join_all(ids.iter().map(|id| async move {
                    (id, remote.update(id, patch).await.map(|_| id.clone()))
                }))
                .await;
                for (id, result) in results {
                    if let Err(e) = &result {
                        error!("applying margins to {} failed: {}", id, e);
                    }
                    outcome.record(id.to_string(), result);
                }
            }
            None => {
                for id in &ids {
                    if let Some(mut material) = self.store.find(id).cloned() {
                        patch.apply_to(&mut material);
                        let result = self.store.upsert_local(material).map(|_| id.clone());
                        outcome.record(id.to_string(), result);
                    }
                }
                self.persist_local();
            }
        }

        info!(
            "applied margins to {} of {} materials",
            outcome.succeeded.len(),
            outcome.attempted()
        );
        self.notifier.notify(outcome.summary("Applied margins to"));
        Ok(outcome)
    }

    /// Delete every material (and every pending one).
    ///
    /// With `ask` the operator must confirm first. Deletes are independent.
    pub async fn clear_all(&mut self, ask: bool) -> PriceResult<BulkOutcome> {
        let result = self.try_clear_all(ask).await;
        self.report_failure("clear data", &result);
        if let Ok(outcome) = &result {
            if !outcome.cancelled {
                self.notifier.notify(outcome.summary("Deleted"));
            }
        }
        result
    }

    async fn try_clear_all(&mut self, ask: bool) -> PriceResult<BulkOutcome> {
        if ask {
            let question = "Delete all data? This cannot be undone!";
            if !self.confirm.confirm(question).await {
                return Ok(BulkOutcome::cancelled());
            }
        }

        let discarded = self.store.take_pending();
        if !discarded.is_empty() {
            info!("discarded {} unsynced materials", discarded.len());
        }

        let ids = self.store.ids();
        let mut outcome = BulkOutcome::default();
        match self.active_remote() {
            Some(remote) => {
                let remote = remote.as_ref();
                let results = join_all(ids.iter().map(|id| async move {
                    (id, remote.delete(id).await.map(|_| id.clone()))
                }))
                .await;
                for (id, result) in results {
                    if let Err(e) = &result {
                        error!("deleting {} failed: {}", id, e);
                    }
                    outcome.record(id.to_string(), result);
                }
            }
            None => {
                for id in &ids {
                    self.store.remove_local(id);
                    outcome.succeeded.push(id.clone());
                }
                self.persist_local();
            }
        }

        info!("cleared {} of {} materials", outcome.succeeded.len(), outcome.attempted());
        Ok(outcome)
    }

    /// Build the export document for the current collection and settings.
    pub fn export_document(&self) -> ExportDocument {
        transfer::build_export(self.store.materials(), &self.settings, Utc::now())
    }

    /// Write an export file named `pricelist-YYYY-MM-DD.json` into `dir`.
    pub fn export_to(&self, dir: &Path) -> PriceResult<PathBuf> {
        let document = self.export_document();
        let path = dir.join(transfer::export_file_name(document.export_date));
        let result = transfer::write_export(&document, &path).map(|_| path);
        self.report_failure("export data", &result);

        if let Ok(path) = &result {
            info!("exported {} materials to {}", document.materials.len(), path.display());
            self.notifier
                .notify(StatusMessage::success(format!("Data exported to {}", path.display())));
        }
        result
    }

    /// Import a transfer document given as text.
    ///
    /// A malformed document is rejected before anything is deleted. After
    /// confirmation, existing data is cleared and every record is created as
    /// a new material with a fresh id.
    pub async fn import(&mut self, text: &str) -> PriceResult<BulkOutcome> {
        let result = match transfer::parse_import(text) {
            Ok(bundle) => self.import_bundle(bundle).await,
            Err(e) => Err(e),
        };
        self.report_failure("import data", &result);
        result
    }

    /// Import a transfer file from disk.
    pub async fn import_file(&mut self, path: &Path) -> PriceResult<BulkOutcome> {
        let result = match transfer::read_import(path) {
            Ok(bundle) => self.import_bundle(bundle).await,
            Err(e) => Err(e),
        };
        self.report_failure("import data", &result);
        result
    }

    async fn import_bundle(&mut self, bundle: ImportBundle) -> PriceResult<BulkOutcome> {
        let question = format!(
            "Import {} materials? All existing data will be replaced.",
            bundle.len()
        );
        if !self.confirm.confirm(&question).await {
            return Ok(BulkOutcome::cancelled());
        }

        let cleared = self.try_clear_all(false).await?;
        if !cleared.failed.is_empty() {
            warn!("{} materials could not be deleted before import", cleared.failed.len());
        }

        let now = Utc::now();
        let drafts = bundle
            .drafts
            .into_iter()
            .map(|mut draft| {
                draft.imported_at = Some(now);
                draft.created_at.get_or_insert(now);
                draft.updated_at.get_or_insert(now);
                draft
            })
            .collect();
        let outcome = self.create_all(drafts).await;

        if let Some(settings) = bundle.settings {
            self.store_settings(settings)?;
        }

        info!("imported {} of {} materials", outcome.succeeded.len(), outcome.attempted());
        self.notifier.notify(outcome.summary("Imported"));
        Ok(outcome)
    }

    /// Create the sample materials. Only allowed on an empty price list.
    pub async fn add_sample_data(&mut self) -> PriceResult<BulkOutcome> {
        let result = if self.store.is_empty() {
            let now = Utc::now();
            let drafts = sample_drafts().into_iter().map(|d| d.stamped(now)).collect();
            let outcome = self.create_all(drafts).await;
            self.notifier.notify(outcome.summary("Added sample data:"));
            Ok(outcome)
        } else {
            Err(PriceError::validation(
                "materials",
                self.store.len().to_string(),
                "Sample data can only be added to an empty price list",
            ))
        };
        self.report_failure("add sample data", &result);
        result
    }

    /// Create several materials with independent writes.
    ///
    /// Remote creates that fail land in the pending list.
    async fn create_all(&mut self, drafts: Vec<MaterialDraft>) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();

        match self.active_remote() {
            Some(remote) => {
                let remote = remote.as_ref();
                let results = join_all(drafts.into_iter().map(|draft| async move {
                    let result = remote.create(&draft).await;
                    (draft, result)
                }))
                .await;

                for (draft, result) in results {
                    if let Err(e) = &result {
                        error!("remote create of '{}' failed: {}", draft.name, e);
                        self.store.push_pending(draft.clone(), e);
                    }
                    outcome.record(draft.name, result);
                }
            }
            None => {
                // upsert_local puts new entries first; go backwards to keep the given order
                for draft in drafts.into_iter().rev() {
                    let id = MaterialId::local();
                    let result = self
                        .store
                        .upsert_local(Material::from_draft(id.clone(), &draft))
                        .map(|_| id);
                    outcome.record(draft.name, result);
                }
                outcome.succeeded.reverse();
                self.persist_local();
            }
        }

        outcome
    }

    /// Validate and save new default markup and profit margin.
    pub fn set_settings(
        &mut self,
        markup: &str,
        profit_margin: &str,
    ) -> PriceResult<PricingSettings> {
        let result = validate_settings(markup, profit_margin).and_then(|settings| {
            self.store_settings(settings)?;
            Ok(settings)
        });
        self.report_failure("save settings", &result);
        if result.is_ok() {
            self.notifier.notify(StatusMessage::success("Settings saved"));
        }
        result
    }

    fn store_settings(&mut self, settings: PricingSettings) -> PriceResult<()> {
        self.settings = settings;
        self.local.save_settings(&settings)?;
        debug!(
            "settings saved: markup {}%, profit margin {}%",
            settings.default_markup, settings.profit_margin
        );
        Ok(())
    }

    /// Send every pending material again.
    ///
    /// Offline, pending materials become ordinary local materials instead.
    pub async fn retry_pending(&mut self) -> PriceResult<BulkOutcome> {
        let pending = self.store.take_pending();
        if pending.is_empty() {
            self.notifier.notify(StatusMessage::info("Nothing to retry"));
            return Ok(BulkOutcome::default());
        }

        let mut outcome = BulkOutcome::default();
        match self.active_remote() {
            Some(remote) => {
                let remote = remote.as_ref();
                let results = join_all(pending.into_iter().map(|item: PendingMaterial| async move {
                    let result = remote.create(&item.draft).await;
                    (item, result)
                }))
                .await;

                for (item, result) in results {
                    match &result {
                        Ok(id) => info!("pending material {} synced as {}", item.local_id, id),
                        Err(e) => {
                            warn!("pending material {} still failing: {}", item.local_id, e);
                            self.store.requeue_pending(item.clone(), e);
                        }
                    }
                    outcome.record(item.local_id.to_string(), result);
                }
            }
            None => {
                for item in pending {
                    let result = self
                        .store
                        .upsert_local(item.as_material())
                        .map(|_| item.local_id.clone());
                    outcome.record(item.local_id.to_string(), result);
                }
                self.persist_local();
            }
        }

        self.notifier.notify(outcome.summary("Synced"));
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn materials(&self) -> &[Material] {
        self.store.materials()
    }

    pub fn pending(&self) -> &[PendingMaterial] {
        self.store.pending()
    }

    pub fn store(&self) -> &MaterialStore {
        &self.store
    }

    pub fn settings(&self) -> PricingSettings {
        self.settings
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Render-ready view of the current state.
    pub fn dashboard(&self) -> Dashboard {
        Dashboard::build(self.store.view())
    }

    /// Register a view that follows every store change.
    pub fn subscribe_view(&mut self, observer: Box<dyn StoreObserver>) {
        self.store.subscribe(observer);
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn active_remote(&self) -> Option<Arc<dyn RemoteStore>> {
        match self.mode {
            SyncMode::Remote => self.remote.clone(),
            SyncMode::LocalOnly => None,
        }
    }

    fn check_not_pending(&self, id: &MaterialId) -> PriceResult<()> {
        if self.store.pending().iter().any(|p| &p.local_id == id) {
            return Err(PriceError::validation(
                "id",
                id.as_str(),
                "Material is not synced yet; retry or delete it first",
            ));
        }
        Ok(())
    }

    /// Save the collection after a local-only change.
    fn persist_local(&mut self) {
        if self.mode != SyncMode::LocalOnly {
            return;
        }
        if let Err(e) = self.local.save(self.store.materials()) {
            error!("could not save to local storage: {}", e);
            self.notifier
                .notify(StatusMessage::error(format!("Could not save locally: {}", e)));
        }
    }

    fn report_failure<T>(&self, action: &str, result: &PriceResult<T>) {
        if let Err(e) = result {
            if e.is_recoverable() {
                error!(code = e.error_code(), "{} failed: {}", action, e);
            } else {
                warn!(code = e.error_code(), "{} rejected: {}", action, e);
            }
            self.notifier.notify(StatusMessage::error(e.to_string()));
        }
    }
}
