//! Receipts: the sole source of truth for "is this component current?".
//! Persisted at `.ai/guardrails/installed/<component>.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded installed file: its destination path, content hash, mode,
/// and size at the time of promotion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledFile {
    pub path: String,
    pub sha256: String,
    pub mode: u32,
    pub size: u64,
}

/// One recorded source file's content hash, used by the Planner to decide
/// whether a component's sources have changed since the last install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDigest {
    pub src_path: String,
    pub sha256: String,
}

/// The persisted record of what was installed for a component, and from
/// which sources. Field order here is the canonical on-disk JSON key
/// order — do not reorder without considering `manifest_digest` stability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub component: String,
    pub plugin_id: Option<String>,
    pub manifest_digest: String,
    pub installed_files: Vec<InstalledFile>,
    pub source_digests: Vec<SourceDigest>,
    pub installed_at: DateTime<Utc>,
    pub engine_version: String,
}

impl Receipt {
    /// Canonical UTF-8 JSON bytes for this receipt: stable key order (via
    /// field declaration order), LF line endings, trailing newline — as
    /// required by the fs adapter's atomic write path.
    pub fn to_canonical_bytes(&self) -> serde_json::Result<Vec<u8>> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        Ok(text.into_bytes())
    }

    pub fn find_file(&self, path: &str) -> Option<&InstalledFile> {
        self.installed_files.iter().find(|f| f.path == path)
    }
}
