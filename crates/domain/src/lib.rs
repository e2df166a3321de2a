//! Shared domain types for the configuration installer: manifests, the
//! composed target structure schema, install plans, receipts, reports, and
//! the engine-wide error taxonomy.
//!
//! This crate is pure: no I/O, no adapters. Everything here is a plain
//! value type that the Resolver, Planner, Installer, and Doctor crates
//! construct, compare, and serialize.

pub mod error;
pub mod manifest;
pub mod plan;
pub mod report;
pub mod schema;
pub mod receipt;

pub use error::EngineError;
pub use manifest::{Component, ComponentName, CoreManifest, PluginId, PluginManifest, Profile};
pub use plan::{ActionKind, ComponentPlan, FileAction, InstallPlan, Reason};
pub use receipt::Receipt;
pub use report::{ExecutionReport, Finding, Report};
pub use schema::TargetStructureSchema;
