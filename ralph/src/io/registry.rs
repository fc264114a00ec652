//! Daemon registry: which (project, branch) keys have a detached run.
//!
//! Entries live as one JSON file per key in a shared temp directory so every
//! `ralph` process on the machine sees the same view. Liveness is not stored;
//! callers check the recorded pid against the process table.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::paths::{create_dir, write_atomic};

/// Directory name under the system temp dir.
pub const REGISTRY_DIR_NAME: &str = "ralph-daemons";

/// One registered daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub pid: u32,
    pub log_path: PathBuf,
    pub project: String,
    pub branch: String,
    /// RFC 3339 timestamp of the spawn.
    pub started_at: String,
    /// OS start time of the process (seconds since the epoch), used to tell
    /// a recycled pid from the daemon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_start: Option<u64>,
}

/// Storage for registry entries keyed by `registry_key(project, branch)`.
pub trait Registry {
    fn get(&self, key: &str) -> Result<Option<RegistryEntry>>;
    fn put(&self, key: &str, entry: &RegistryEntry) -> Result<()>;
    /// Remove `key`; absent keys are not an error.
    fn remove(&self, key: &str) -> Result<()>;
    /// All entries, sorted by key.
    fn entries(&self) -> Result<Vec<(String, RegistryEntry)>>;
}

/// Registry backed by `<dir>/<key>.json` files.
#[derive(Debug, Clone)]
pub struct FileRegistry {
    dir: PathBuf,
}

impl FileRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Registry in `$TMPDIR/ralph-daemons`.
    pub fn system() -> Self {
        Self::new(std::env::temp_dir().join(REGISTRY_DIR_NAME))
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn read_entry(path: &Path) -> Result<RegistryEntry> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
    }
}

impl Registry for FileRegistry {
    fn get(&self, key: &str) -> Result<Option<RegistryEntry>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        match Self::read_entry(&path) {
            Ok(entry) => Ok(Some(entry)),
            Err(err) => {
                // Unreadable entries are treated as stale.
                warn!(err = %format!("{err:#}"), "discarding corrupt registry entry");
                self.remove(key)?;
                Ok(None)
            }
        }
    }

    fn put(&self, key: &str, entry: &RegistryEntry) -> Result<()> {
        create_dir(&self.dir)?;
        let mut payload = serde_json::to_string_pretty(entry).context("serialize registry entry")?;
        payload.push('\n');
        debug!(key, pid = entry.pid, "registering daemon");
        write_atomic(&self.entry_path(key), &payload)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.entry_path(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(key, "registry entry removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
        }
    }

    fn entries(&self) -> Result<Vec<(String, RegistryEntry)>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for dirent in
            fs::read_dir(&self.dir).with_context(|| format!("read {}", self.dir.display()))?
        {
            let path = dirent
                .with_context(|| format!("read {}", self.dir.display()))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match Self::read_entry(&path) {
                Ok(entry) => entries.push((key.to_string(), entry)),
                Err(err) => warn!(err = %format!("{err:#}"), "skipping corrupt registry entry"),
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}

/// In-process registry for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    entries: Mutex<BTreeMap<String, RegistryEntry>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, RegistryEntry>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("registry lock poisoned"))
    }
}

impl Registry for MemoryRegistry {
    fn get(&self, key: &str) -> Result<Option<RegistryEntry>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn put(&self, key: &str, entry: &RegistryEntry) -> Result<()> {
        self.lock()?.insert(key.to_string(), entry.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(String, RegistryEntry)>> {
        Ok(self
            .lock()?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
