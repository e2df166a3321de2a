//! The composed target structure schema: the merged expectation of which
//! paths must (and must not) exist in the target repository, produced by
//! the Resolver from the core manifest plus every enabled plugin's
//! structure schema.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use crate::manifest::MergeStrategy;

/// Which plugin(s) contributed a composed schema entry, and under which
/// strategy it was admitted. `core` is used for the core manifest itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub contributors: Vec<String>,
    pub strategy: MergeStrategy,
}

/// A single composed entry: whether the path is required, which strategy
/// governs overlap, and which plugin(s) it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub required: bool,
    pub merge_strategy: MergeStrategy,
    pub owner_plugin: Option<String>,
    pub description: Option<String>,
    pub provenance: Provenance,
}

/// A mapping from target path to its composed schema entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetStructureSchema {
    pub entries: BTreeMap<String, SchemaEntry>,
}

impl TargetStructureSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required_paths(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.required)
            .map(|(path, _)| path.as_str())
    }
}

/// Result of composing per-plugin structure schemas under a policy:
/// the merged schema plus any unresolved conflicts found along the way.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositionResult {
    pub schema: TargetStructureSchema,
    pub conflicts: Vec<SchemaConflict>,
}

/// A strict-policy overlap between two or more plugins at the same path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaConflict {
    pub path: String,
    pub plugins: Vec<String>,
}
