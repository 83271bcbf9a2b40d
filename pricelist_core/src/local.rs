//! # Local Fallback Store
//!
//! Keeps a copy of the material collection and the operator settings in
//! local key-value storage, and is the whole data source while the remote
//! store is unavailable.
//!
//! ## Storage
//!
//! [`KeyValueStorage`] is a small string key-value interface. Two
//! implementations are provided:
//!
//! - [`FileStorage`]: one JSON file per key in a data directory, written
//!   atomically (`.tmp`, fsync, rename) and guarded by an exclusive lock file
//!   so two sessions cannot write the same cache
//! - [`MemoryStorage`]: a shared in-memory map, for tests
//!
//! ## Keys
//!
//! - `materials`: `{ "version", "savedAt", "materials": [...] }` (a bare array
//!   is also read)
//! - `settings`: `{ "defaultMarkup", "profitMargin" }`
//!
//! No merge logic: a save replaces the whole list, a load returns it as is.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{PriceError, PriceResult};
use crate::material::{Material, MaterialId};
use crate::schema::{validate_version, SCHEMA_VERSION};
use crate::settings::PricingSettings;

/// Storage key for the material list
pub const MATERIALS_KEY: &str = "materials";

/// Storage key for the operator settings
pub const SETTINGS_KEY: &str = "settings";

const LOCK_FILE_NAME: &str = ".pricelist.lock";

/// String key-value storage, the shape of browser local storage.
pub trait KeyValueStorage: Send {
    fn get(&self, key: &str) -> PriceResult<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> PriceResult<()>;
    fn remove(&mut self, key: &str) -> PriceResult<()>;
}

/// In-memory storage. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned map is still a valid map
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> PriceResult<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> PriceResult<()> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> PriceResult<()> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Lock file metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub locked_at: DateTime<Utc>,
}

/// File-per-key storage in a directory, held under an exclusive lock.
pub struct FileStorage {
    dir: PathBuf,
    lock_path: PathBuf,
    /// Keeps the OS-level lock for as long as the storage is open
    _lock_file: File,
    pub lock: LockInfo,
}

impl FileStorage {
    /// Open (creating if needed) a storage directory and lock it.
    ///
    /// Fails with [`PriceError::StorageLocked`] if another live process holds it.
    pub fn open(dir: impl AsRef<Path>) -> PriceResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| io_error("create dir", &dir, e))?;

        let lock_path = dir.join(LOCK_FILE_NAME);
        if let Ok(existing) = read_lock_info(&lock_path) {
            if !is_lock_stale(&existing) {
                return Err(PriceError::StorageLocked {
                    path: dir.display().to_string(),
                    pid: existing.pid,
                    locked_at: existing.locked_at.to_rfc3339(),
                });
            }
            debug!("taking over stale lock from pid {}", existing.pid);
        }

        // Only the holder of the OS lock may rewrite the lock info
        let mut lock_file = OpenOptions::new()
            .write(true)
            .read(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| io_error("create lock", &lock_path, e))?;

        lock_file.try_lock_exclusive().map_err(|_| PriceError::StorageLocked {
            path: dir.display().to_string(),
            pid: 0,
            locked_at: "unknown".to_string(),
        })?;

        let lock = LockInfo {
            pid: std::process::id(),
            locked_at: Utc::now(),
        };
        let lock_json = serde_json::to_string_pretty(&lock)?;
        lock_file
            .set_len(0)
            .and_then(|_| lock_file.write_all(lock_json.as_bytes()))
            .and_then(|_| lock_file.sync_all())
            .map_err(|e| io_error("write lock", &lock_path, e))?;

        Ok(FileStorage {
            dir,
            lock_path,
            _lock_file: lock_file,
            lock,
        })
    }

    fn path_for(&self, key: &str) -> PriceResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(PriceError::storage(
                "resolve",
                key,
                "Keys may only contain letters, digits, '_' and '-'",
            ));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl Drop for FileStorage {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
        // OS lock is released when _lock_file is dropped
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> PriceResult<Option<String>> {
        let path = self.path_for(key)?;
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PriceError::storage("open", key, e.to_string())),
        };

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| PriceError::storage("read", key, e.to_string()))?;
        Ok(Some(contents))
    }

    fn set(&mut self, key: &str, value: &str) -> PriceResult<()> {
        let path = self.path_for(key)?;
        write_atomic(&path, value.as_bytes())
    }

    fn remove(&mut self, key: &str) -> PriceResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PriceError::storage("remove", key, e.to_string())),
        }
    }
}

/// Write to `<path>.tmp`, fsync, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> PriceResult<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut tmp_file =
        File::create(&tmp_path).map_err(|e| io_error("create temp file", &tmp_path, e))?;

    tmp_file
        .write_all(contents)
        .map_err(|e| io_error("write temp file", &tmp_path, e))?;

    tmp_file
        .sync_all()
        .map_err(|e| io_error("sync temp file", &tmp_path, e))?;

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        io_error("rename to final", path, e)
    })
}

fn io_error(operation: &str, path: &Path, e: std::io::Error) -> PriceError {
    PriceError::storage(operation, path.display().to_string(), e.to_string())
}

fn read_lock_info(lock_path: &Path) -> PriceResult<LockInfo> {
    let contents =
        fs::read_to_string(lock_path).map_err(|e| io_error("read lock", lock_path, e))?;
    Ok(serde_json::from_str(&contents)?)
}

/// A lock is stale when its process is gone or it is more than a day old.
fn is_lock_stale(info: &LockInfo) -> bool {
    #[cfg(unix)]
    {
        if fs::metadata(format!("/proc/{}", info.pid)).is_err() {
            return true;
        }
    }

    (Utc::now() - info.locked_at).num_hours() > 24
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedMaterials {
    version: String,
    saved_at: DateTime<Utc>,
    materials: Vec<Material>,
}

/// Persists the collection and settings to local storage.
pub struct LocalFallbackStore {
    storage: Box<dyn KeyValueStorage>,
}

impl LocalFallbackStore {
    pub fn new(storage: Box<dyn KeyValueStorage>) -> Self {
        LocalFallbackStore { storage }
    }

    /// Serialize and store the whole collection.
    pub fn save(&mut self, materials: &[Material]) -> PriceResult<()> {
        let cached = CachedMaterials {
            version: SCHEMA_VERSION.to_string(),
            saved_at: Utc::now(),
            materials: materials.to_vec(),
        };
        let json = serde_json::to_string(&cached)?;
        self.storage.set(MATERIALS_KEY, &json)?;
        debug!("saved {} materials to local storage", materials.len());
        Ok(())
    }

    /// Load the stored collection, empty when nothing was saved.
    ///
    /// Records saved without an id get a local one so they can be edited.
    pub fn load(&self) -> PriceResult<Vec<Material>> {
        let Some(json) = self.storage.get(MATERIALS_KEY)? else {
            return Ok(Vec::new());
        };

        let value: Value = serde_json::from_str(&json)?;
        let mut materials: Vec<Material> = match value {
            Value::Array(_) => serde_json::from_value(value)?,
            _ => {
                let cached: CachedMaterials = serde_json::from_value(value)?;
                validate_version(&cached.version)?;
                cached.materials
            }
        };

        for material in materials.iter_mut().filter(|m| m.id.is_none()) {
            material.id = Some(MaterialId::local());
        }
        Ok(materials)
    }

    pub fn clear(&mut self) -> PriceResult<()> {
        self.storage.remove(MATERIALS_KEY)
    }

    pub fn save_settings(&mut self, settings: &PricingSettings) -> PriceResult<()> {
        let json = serde_json::to_string(settings)?;
        self.storage.set(SETTINGS_KEY, &json)
    }

    /// Load settings; missing or unreadable settings give the defaults.
    pub fn load_settings(&self) -> PricingSettings {
        match self.storage.get(SETTINGS_KEY) {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!("ignoring unreadable settings: {}", e);
                PricingSettings::default()
            }),
            Ok(None) => PricingSettings::default(),
            Err(e) => {
                warn!("could not read settings: {}", e);
                PricingSettings::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::MaterialDraft;
    use rust_decimal::Decimal;
    use std::env::temp_dir;

    fn temp_storage_dir(name: &str) -> PathBuf {
        temp_dir().join(format!("pricelist_test_{}_{}", name, std::process::id()))
    }

    fn material(id: &str, name: &str) -> Material {
        Material::from_draft(
            MaterialId::new(id),
            &MaterialDraft::new(
                name,
                "meter",
                Decimal::from(85000),
                Decimal::from(25),
                Decimal::from(15),
            ),
        )
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let mut local = LocalFallbackStore::new(Box::new(MemoryStorage::new()));
        assert!(local.load().unwrap().is_empty());

        let list = vec![material("a", "Pipa"), material("b", "Kabel")];
        local.save(&list).unwrap();
        assert_eq!(local.load().unwrap(), list);

        local.save(&list[..1]).unwrap();
        assert_eq!(local.load().unwrap().len(), 1);

        local.clear().unwrap();
        assert!(local.load().unwrap().is_empty());
    }

    #[test]
    fn test_load_bare_array_assigns_local_ids() {
        let storage = MemoryStorage::new();
        let mut raw = storage.clone();
        let legacy =
            r#"[{"name":"Freon R32","unit":"kg","realPrice":120000,"markup":35,"profitMargin":15}]"#;
        raw.set(MATERIALS_KEY, legacy).unwrap();

        let local = LocalFallbackStore::new(Box::new(storage));
        let loaded = local.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].id.as_ref().unwrap().is_local());
    }

    #[test]
    fn test_load_rejects_incompatible_version() {
        let storage = MemoryStorage::new();
        let mut raw = storage.clone();
        let newer = r#"{"version":"2.0.0","savedAt":"2024-01-01T00:00:00Z","materials":[]}"#;
        raw.set(MATERIALS_KEY, newer).unwrap();

        let local = LocalFallbackStore::new(Box::new(storage));
        assert!(matches!(local.load(), Err(PriceError::VersionMismatch { .. })));
    }

    #[test]
    fn test_settings_roundtrip_and_defaults() {
        let mut local = LocalFallbackStore::new(Box::new(MemoryStorage::new()));
        assert_eq!(local.load_settings(), PricingSettings::default());

        let settings = PricingSettings::new(Decimal::from(40), Decimal::from(10));
        local.save_settings(&settings).unwrap();
        assert_eq!(local.load_settings(), settings);
    }

    #[test]
    fn test_file_storage_roundtrip() {
        let dir = temp_storage_dir("roundtrip");
        {
            let mut storage = FileStorage::open(&dir).unwrap();
            assert_eq!(storage.get("settings").unwrap(), None);

            storage.set("settings", "{\"defaultMarkup\":30}").unwrap();
            assert_eq!(storage.get("settings").unwrap().as_deref(), Some("{\"defaultMarkup\":30}"));
            assert!(!dir.join("settings.json.tmp").exists());

            storage.remove("settings").unwrap();
            assert_eq!(storage.get("settings").unwrap(), None);
            assert!(storage.set("../escape", "x").is_err());
        }
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_file_storage_lock() {
        let dir = temp_storage_dir("lock");
        let first = FileStorage::open(&dir).unwrap();
        assert_eq!(first.lock.pid, std::process::id());
        assert!(dir.join(LOCK_FILE_NAME).exists());

        // Same live pid holds it
        assert!(matches!(FileStorage::open(&dir), Err(PriceError::StorageLocked { .. })));

        drop(first);
        assert!(!dir.join(LOCK_FILE_NAME).exists());
        let reopened = FileStorage::open(&dir).unwrap();
        drop(reopened);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_failed_open_keeps_holder_lock_info() {
        let dir = temp_storage_dir("lock_race");
        let holder = FileStorage::open(&dir).unwrap();

        // Lock info that looks stale, while the OS lock is still held
        let lock_path = dir.join(LOCK_FILE_NAME);
        let old = LockInfo {
            pid: std::process::id(),
            locked_at: Utc::now() - chrono::Duration::days(2),
        };
        let old_json = serde_json::to_string(&old).unwrap();
        fs::write(&lock_path, &old_json).unwrap();

        assert!(matches!(FileStorage::open(&dir), Err(PriceError::StorageLocked { .. })));
        assert_eq!(fs::read_to_string(&lock_path).unwrap(), old_json);

        drop(holder);
        let reopened = FileStorage::open(&dir).unwrap();
        drop(reopened);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_local_store_on_files() {
        let dir = temp_storage_dir("fallback");
        {
            let mut local = LocalFallbackStore::new(Box::new(FileStorage::open(&dir).unwrap()));
            local.save(&[material("a", "Pipa")]).unwrap();
        }
        {
            let local = LocalFallbackStore::new(Box::new(FileStorage::open(&dir).unwrap()));
            let loaded = local.load().unwrap();
            assert_eq!(loaded.len(), 1);
            assert_eq!(loaded[0].name, "Pipa");
        }
        let _ = fs::remove_dir_all(&dir);
    }
}
