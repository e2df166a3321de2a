//! Plan values: the pure output of the Planner, consumed by the Installer.

use serde::{Deserialize, Serialize};

/// The kind of action the Planner has chosen for a single source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionKind {
    Copy,
    Merge,
    Template,
    Skip,
}

/// Why the Planner chose this action, for logs and the `Reason` field of
/// user-visible reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reason {
    New,
    HashDiff,
    Unchanged,
    Drift,
}

/// A single file-level action within a component's plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAction {
    pub kind: ActionKind,
    pub src_path: String,
    pub dst_path: String,
    pub mode: Option<u32>,
    pub reason: Reason,
}

/// The ordered set of actions for one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentPlan {
    pub name: String,
    pub plugin_id: Option<String>,
    pub manifest_digest: String,
    pub actions: Vec<FileAction>,
}

impl ComponentPlan {
    /// True when every action is a no-op `SKIP(unchanged)`.
    pub fn is_unchanged(&self) -> bool {
        self.actions
            .iter()
            .all(|a| a.kind == ActionKind::Skip && a.reason == Reason::Unchanged)
    }
}

/// The full install plan: ordered by installation order. A byte-identical
/// serialization is produced for identical inputs (see `guardrails-planner`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallPlan {
    pub components: Vec<ComponentPlan>,
}

impl InstallPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Canonical JSON serialization used to assert determinism (property 1
    /// in the testable-properties list): two plans built from identical
    /// inputs must serialize to identical bytes.
    pub fn canonical_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
