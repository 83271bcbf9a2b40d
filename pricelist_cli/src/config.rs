//! Session configuration from the environment.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use pricelist_core::remote::FirestoreConfig;

const DEFAULT_COLLECTION: &str = "materials";
const DEFAULT_POLL_MS: u64 = 2000;
const DEFAULT_DATA_DIR: &str = ".pricelist";

/// Which remote the session syncs with.
#[derive(Debug, Clone)]
pub enum RemoteChoice {
    Firestore(FirestoreConfig),
    /// Process-local collection, gone when the session ends
    Memory,
    /// Local storage only
    Off,
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub remote: RemoteChoice,
    pub data_dir: PathBuf,
}

impl CliConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let project_id = var("FIRESTORE_PROJECT_ID");
        let choice = var("PRICELIST_REMOTE")
            .map(|v| v.to_ascii_lowercase())
            .unwrap_or_else(|| if project_id.is_some() { "firestore" } else { "off" }.to_string());

        let remote = match choice.as_str() {
            "firestore" => {
                let project_id = project_id
                    .context("FIRESTORE_PROJECT_ID is required for the firestore remote")?;
                let collection =
                    var("FIRESTORE_COLLECTION").unwrap_or_else(|| DEFAULT_COLLECTION.to_string());
                let poll_ms = match var("PRICELIST_POLL_MS") {
                    Some(raw) => raw.parse::<u64>().with_context(|| {
                        format!("PRICELIST_POLL_MS must be a number of milliseconds, got '{}'", raw)
                    })?,
                    None => DEFAULT_POLL_MS,
                };
                if poll_ms == 0 {
                    bail!("PRICELIST_POLL_MS must be greater than zero");
                }

                let mut config = FirestoreConfig::new(project_id, collection);
                config.api_key = var("FIRESTORE_API_KEY");
                config.poll_interval = Duration::from_millis(poll_ms);
                RemoteChoice::Firestore(config)
            }
            "memory" => RemoteChoice::Memory,
            "off" | "none" | "local" => RemoteChoice::Off,
            other => bail!("PRICELIST_REMOTE must be firestore, memory or off, got '{}'", other),
        };

        let data_dir = var("PRICELIST_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        Ok(CliConfig { remote, data_dir })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<CliConfig> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        CliConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_to_local_only() {
        let defaults = config(&[]).unwrap();
        assert!(matches!(defaults.remote, RemoteChoice::Off));
        assert_eq!(defaults.data_dir, PathBuf::from(".pricelist"));

        let memory = config(&[("PRICELIST_REMOTE", "memory")]).unwrap();
        assert!(matches!(memory.remote, RemoteChoice::Memory));
    }

    #[test]
    fn test_project_id_selects_firestore() {
        let config = config(&[
            ("FIRESTORE_PROJECT_ID", "nala-aircon"),
            ("FIRESTORE_API_KEY", "key123"),
            ("PRICELIST_POLL_MS", "500"),
        ])
        .unwrap();

        let RemoteChoice::Firestore(firestore) = config.remote else {
            panic!("expected firestore");
        };
        assert_eq!(firestore.project_id, "nala-aircon");
        assert_eq!(firestore.collection, "materials");
        assert_eq!(firestore.api_key.as_deref(), Some("key123"));
        assert_eq!(firestore.poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_invalid_values() {
        assert!(config(&[("PRICELIST_REMOTE", "firestore")]).is_err());
        assert!(config(&[("PRICELIST_REMOTE", "postgres")]).is_err());
        assert!(config(&[("FIRESTORE_PROJECT_ID", "p"), ("PRICELIST_POLL_MS", "soon")]).is_err());
        assert!(config(&[("FIRESTORE_PROJECT_ID", "p"), ("PRICELIST_POLL_MS", "0")]).is_err());
    }

    #[test]
    fn test_off_and_data_dir() {
        let config =
            config(&[("PRICELIST_REMOTE", "OFF"), ("PRICELIST_DATA_DIR", "/tmp/prices")]).unwrap();
        assert!(matches!(config.remote, RemoteChoice::Off));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/prices"));
    }
}
