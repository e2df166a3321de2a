//! Reports returned by the Installer and the Doctor.

use serde::{Deserialize, Serialize};

use crate::error::ErrorReport;

/// Outcome of executing one component's plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentOutcome {
    Installed,
    Skipped,
    RolledBack,
    DryRun,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentResult {
    pub component: String,
    pub outcome: ComponentOutcome,
    pub files_written: usize,
    pub error: Option<ErrorReport>,
}

/// Result of `Installer::execute`: per-component outcomes plus whether the
/// run as a whole stopped early.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub results: Vec<ComponentResult>,
    pub aborted: bool,
}

impl ExecutionReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.results.iter().all(|r| r.error.is_none())
    }
}

/// One diagnosed drift/staleness/dirtiness finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Finding {
    Drift {
        component: String,
        path: String,
        expected_sha256: String,
        actual_sha256: String,
    },
    Missing {
        component: String,
        path: String,
    },
    Stale {
        component: String,
    },
    MissingReceipt {
        component: String,
    },
    SchemaViolation {
        path: String,
        detail: String,
    },
    Dirty {
        path: String,
    },
}

/// Result of `Doctor::diagnose` / `Doctor::repair`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    pub findings: Vec<Finding>,
    pub repaired: Vec<String>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}
