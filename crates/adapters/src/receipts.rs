//! Receipt persistence: `.ai/guardrails/installed/<component>.json`.
//!
//! Receipts are the sole source of truth for "is this component current?"
//! The filesystem alone cannot answer that question (spec §3).

use std::path::{Path, PathBuf};

use guardrails_domain::receipt::Receipt;
use thiserror::Error;

use crate::fs as fs_adapter;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error reading/writing receipt at {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize receipt at {path:?}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Fs(#[from] fs_adapter::Error),
}

/// A store rooted at `<target_root>/.ai/guardrails/installed/`.
#[derive(Debug, Clone)]
pub struct ReceiptStore {
    root: PathBuf,
}

impl ReceiptStore {
    pub fn new(target_root: impl Into<PathBuf>) -> Self {
        Self {
            root: target_root.into().join(".ai/guardrails/installed"),
        }
    }

    fn path_for(&self, component: &str) -> PathBuf {
        self.root.join(format!("{component}.json"))
    }

    pub fn get(&self, component: &str) -> Result<Option<Receipt>, Error> {
        let path = self.path_for(component);
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs_err::read(&path).map_err(|e| Error::Io {
            path: path.clone(),
            source: e.into(),
        })?;
        let receipt = serde_json::from_slice(&bytes).map_err(|e| Error::Serde { path, source: e })?;
        Ok(Some(receipt))
    }

    /// Write the receipt via write-temp -> fsync -> rename, as required
    /// for the receipt file itself (spec §4.3 step 5).
    pub fn put(&self, receipt: &Receipt) -> Result<(), Error> {
        let path = self.path_for(&receipt.component);
        let bytes = receipt
            .to_canonical_bytes()
            .map_err(|e| Error::Serde { path: path.clone(), source: e })?;

        fs_adapter::atomic_write(&path, &bytes, 0o644)?;
        Ok(())
    }

    pub fn delete(&self, component: &str) -> Result<(), Error> {
        let path = self.path_for(component);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| Error::Io { path, source: e })?;
        }
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<Receipt>, Error> {
        if !self.root.exists() {
            return Ok(vec![]);
        }

        let mut receipts = vec![];
        for entry in std::fs::read_dir(&self.root).map_err(|e| Error::Io {
            path: self.root.clone(),
            source: e,
        })? {
            let entry = entry.map_err(|e| Error::Io {
                path: self.root.clone(),
                source: e,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs_err::read(&path).map_err(|e| Error::Io {
                path: path.clone(),
                source: e.into(),
            })?;
            let receipt = serde_json::from_slice(&bytes).map_err(|e| Error::Serde { path, source: e })?;
            receipts.push(receipt);
        }

        receipts.sort_by(|a: &Receipt, b: &Receipt| a.component.cmp(&b.component));
        Ok(receipts)
    }

    /// True when a current receipt exists for `component` with the given
    /// `manifest_digest` and every recorded file still matches on disk.
    pub fn is_current(&self, component: &str, manifest_digest: &str, target_root: &Path) -> Result<bool, Error> {
        let Some(receipt) = self.get(component)? else {
            return Ok(false);
        };

        if receipt.manifest_digest != manifest_digest {
            return Ok(false);
        }

        for file in &receipt.installed_files {
            let path = target_root.join(&file.path);
            match crate::hashing::sha256_file(&path) {
                Ok(actual) if actual == file.sha256 => {}
                _ => return Ok(false),
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{DateTime, Utc};
    use tempfile::tempdir;

    fn sample_receipt() -> Receipt {
        Receipt {
            component: "core".into(),
            plugin_id: None,
            manifest_digest: "abc123".into(),
            installed_files: vec![],
            source_digests: vec![],
            installed_at: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
            engine_version: "0.1.0".into(),
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = ReceiptStore::new(dir.path());
        let receipt = sample_receipt();

        store.put(&receipt).unwrap();
        let loaded = store.get("core").unwrap().unwrap();
        assert_eq!(loaded.manifest_digest, receipt.manifest_digest);
    }

    #[test]
    fn get_missing_component_is_none() {
        let dir = tempdir().unwrap();
        let store = ReceiptStore::new(dir.path());
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn delete_removes_receipt() {
        let dir = tempdir().unwrap();
        let store = ReceiptStore::new(dir.path());
        store.put(&sample_receipt()).unwrap();
        store.delete("core").unwrap();
        assert!(store.get("core").unwrap().is_none());
    }

    #[test]
    fn is_current_false_when_digest_differs() {
        let dir = tempdir().unwrap();
        let store = ReceiptStore::new(dir.path());
        store.put(&sample_receipt()).unwrap();
        assert!(!store.is_current("core", "different", dir.path()).unwrap());
    }
}
