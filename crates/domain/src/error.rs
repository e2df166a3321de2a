//! The engine-wide error taxonomy. Every public operation returns
//! `Result<_, EngineError>`; narrower adapter/component errors convert into
//! it via `#[from]`, the same way `moss::client::Error` aggregates
//! `db::meta::Error`, `db::layout::Error`, and `std::io::Error`.

use std::path::PathBuf;

use thiserror::Error;

/// One typed, machine-parseable error kind. Every variant maps to exactly
/// one recommended remediation phrase via [`EngineError::remediation`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("manifest schema error: {0}")]
    ManifestSchema(String),

    #[error("dependency error: {0}")]
    Dep(DepError),

    #[error("conflict: {0}")]
    Conflict(ConflictError),

    #[error("validation error: {0}")]
    Validation(ValidationError),

    #[error("drift detected: {0}")]
    Drift(DriftError),

    #[error("safety error: {0}")]
    Safety(SafetyError),

    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("busy: {0}")]
    Busy(String),
}

impl EngineError {
    /// The single recommended remediation phrase for this error kind,
    /// surfaced in the user-visible report (spec §7).
    pub fn remediation(&self) -> &'static str {
        match self {
            EngineError::ManifestSchema(_) => "fix the manifest to satisfy the schema and retry",
            EngineError::Dep(DepError::Cycle { .. }) => "break the dependency cycle named in the error",
            EngineError::Dep(DepError::Missing { .. }) => "declare the missing dependency or remove the reference",
            EngineError::Dep(DepError::UnsatisfiedStructure { .. }) => {
                "enable the plugin providing the required path, or relax the requirement"
            }
            EngineError::Conflict(_) => "resolve the conflicting paths via an override policy or rename one plugin's files",
            EngineError::Validation(ValidationError::NoFilesMatched { .. }) => {
                "fix the component's file pattern so it matches at least one file"
            }
            EngineError::Validation(ValidationError::UndefinedVariable { .. }) => {
                "define the missing template variable in the plugin configuration"
            }
            EngineError::Validation(ValidationError::CommandFailed { .. }) => "inspect and fix the validation command",
            EngineError::Validation(ValidationError::SchemaUnsatisfied { .. }) => {
                "enable the plugin providing the required path, or fix the merge that dropped it"
            }
            EngineError::Drift(_) => "run doctor.repair to reconcile the drifted file",
            EngineError::Safety(_) => "inspect the flagged directory manually before retrying",
            EngineError::Io { .. } => "check filesystem permissions and available space",
            EngineError::Busy(_) => "wait for the other run to finish, or confirm no process is stuck holding the lock",
        }
    }
}

#[derive(Debug, Error)]
pub enum DepError {
    #[error("component {component:?} depends on unknown component {dependency:?}")]
    Missing { component: String, dependency: String },

    #[error("dependency cycle detected starting at {start:?}: {}", path.join(" -> "))]
    Cycle { start: String, path: Vec<String> },

    #[error("plugin {plugin:?} requires path {path:?} which no enabled plugin provides")]
    UnsatisfiedStructure { plugin: String, path: String },
}

#[derive(Debug, Error)]
pub enum ConflictError {
    #[error("strict conflict at {path:?} between plugins {}", plugins.join(", "))]
    StrictOverlap { path: String, plugins: Vec<String> },

    #[error("component {component:?} declared in more than one manifest")]
    DuplicateComponent { component: String },
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("component {component:?} pattern {pattern:?} resolved to zero files")]
    NoFilesMatched { component: String, pattern: String },

    #[error("undefined template variable {variable:?} in {path:?}")]
    UndefinedVariable { path: String, variable: String },

    #[error("validation command for component {component:?} failed: {detail}")]
    CommandFailed { component: String, detail: String },

    #[error("composed schema path {path:?} would be unsatisfied after installing {component:?}")]
    SchemaUnsatisfied { component: String, path: String },
}

#[derive(Debug, Error)]
pub enum DriftError {
    #[error("receipt for {component:?} recorded sha256 {expected} for {path:?}, found {actual}")]
    HashMismatch {
        component: String,
        path: String,
        expected: String,
        actual: String,
    },

    #[error("receipt for {component:?} recorded {path:?}, which is missing on disk")]
    MissingFile { component: String, path: String },
}

#[derive(Debug, Error)]
pub enum SafetyError {
    #[error("refusing to remove {path:?}: sentinel {sentinel:?} not found")]
    MissingSentinel { path: PathBuf, sentinel: &'static str },

    #[error("staging directory for {component:?} already exists and is owned by pid {pid}")]
    StageConflict { component: String, pid: u32 },
}

/// A structured, user-visible report of one error, per spec §7.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorReport {
    pub component: Option<String>,
    pub kind: String,
    pub path: Option<String>,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub remediation: String,
}

impl From<&EngineError> for ErrorReport {
    fn from(error: &EngineError) -> Self {
        let kind = match error {
            EngineError::ManifestSchema(_) => "ManifestSchemaError",
            EngineError::Dep(_) => "DepError",
            EngineError::Conflict(_) => "ConflictError",
            EngineError::Validation(_) => "ValidationError",
            EngineError::Drift(_) => "DriftError",
            EngineError::Safety(_) => "SafetyError",
            EngineError::Io { .. } => "IOError",
            EngineError::Busy(_) => "BusyError",
        };

        let (component, path, expected, actual) = match error {
            EngineError::Dep(DepError::Missing { component, .. }) => (Some(component.clone()), None, None, None),
            EngineError::Dep(DepError::UnsatisfiedStructure { plugin, path }) => {
                (Some(plugin.clone()), Some(path.clone()), None, None)
            }
            EngineError::Conflict(ConflictError::StrictOverlap { path, .. }) => (None, Some(path.clone()), None, None),
            EngineError::Conflict(ConflictError::DuplicateComponent { component }) => {
                (Some(component.clone()), None, None, None)
            }
            EngineError::Validation(ValidationError::NoFilesMatched { component, pattern }) => {
                (Some(component.clone()), Some(pattern.clone()), None, None)
            }
            EngineError::Validation(ValidationError::UndefinedVariable { path, variable }) => {
                (None, Some(path.clone()), Some(variable.clone()), None)
            }
            EngineError::Validation(ValidationError::CommandFailed { component, .. }) => {
                (Some(component.clone()), None, None, None)
            }
            EngineError::Validation(ValidationError::SchemaUnsatisfied { component, path }) => {
                (Some(component.clone()), Some(path.clone()), None, None)
            }
            EngineError::Drift(DriftError::HashMismatch {
                component,
                path,
                expected,
                actual,
            }) => (
                Some(component.clone()),
                Some(path.clone()),
                Some(expected.clone()),
                Some(actual.clone()),
            ),
            EngineError::Drift(DriftError::MissingFile { component, path }) => {
                (Some(component.clone()), Some(path.clone()), None, None)
            }
            EngineError::Safety(SafetyError::MissingSentinel { path, .. }) => {
                (None, Some(path.display().to_string()), None, None)
            }
            EngineError::Safety(SafetyError::StageConflict { component, .. }) => {
                (Some(component.clone()), None, None, None)
            }
            EngineError::Io { path, .. } => (None, Some(path.display().to_string()), None, None),
            _ => (None, None, None, None),
        };

        Self {
            component,
            kind: kind.to_string(),
            path,
            expected,
            actual,
            remediation: error.remediation().to_string(),
        }
    }
}
