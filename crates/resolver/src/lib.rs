//! Loads the core manifest and every enabled plugin's manifest, validates
//! them, composes the target structure schema, and produces a
//! deterministically-ordered [`ResolvedSpec`] ready for the Planner.

mod compose;
mod order;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use guardrails_adapters::schema::{validate_core_manifest, validate_plugin_manifest};
use guardrails_domain::error::{ConflictError, EngineError, ValidationError};
use guardrails_domain::manifest::{Component, ComponentName, PluginId, Profile, StructureSchema, Validation};
use guardrails_domain::schema::TargetStructureSchema;

pub use compose::{check_structure_constraints, compose_target_schema, ConflictOrDep, ResolverCallback};
pub use order::resolve_order;

/// Identifies a component uniquely across the core manifest and every
/// enabled plugin. Core-declared components carry no `plugin_id`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentRef {
    pub plugin_id: Option<PluginId>,
    pub name: ComponentName,
}

impl ComponentRef {
    /// The identity used for graph nodes and receipt keys:
    /// `"<plugin_id>/<name>"`, or bare `name` for core components.
    pub fn qualified(&self) -> String {
        match &self.plugin_id {
            Some(plugin_id) => format!("{plugin_id}/{}", self.name),
            None => self.name.clone(),
        }
    }
}

impl std::fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.qualified())
    }
}

/// A component with its file patterns resolved to concrete paths on disk,
/// ready for the Planner to read and hash.
#[derive(Debug, Clone)]
pub struct ResolvedComponent {
    pub component_ref: ComponentRef,
    pub base_dir: PathBuf,
    pub files: Vec<PathBuf>,
    pub target_prefix: Option<String>,
    pub dependencies: Vec<ComponentRef>,
    pub install_order: u8,
    pub required: bool,
    pub post_install: Vec<String>,
    pub validation: Option<Validation>,
    pub manifest_digest: String,
}

/// A digest component: the subset of a component's definition that
/// determines whether a reinstall is needed, serialized with a stable
/// field order so its sha256 is reproducible across runs.
#[derive(Debug, Clone, serde::Serialize)]
struct ComponentDigestInput<'a> {
    name: &'a str,
    files: &'a [PathBuf],
    target_prefix: &'a Option<String>,
    dependencies: &'a [String],
    post_install: &'a [String],
}

/// The fully resolved, ordered, composed specification the Planner acts on.
#[derive(Debug, Clone)]
pub struct ResolvedSpec {
    pub components: Vec<ResolvedComponent>,
    pub schema: TargetStructureSchema,
    pub profiles: Vec<Profile>,
}

impl ResolvedSpec {
    pub fn component(&self, component_ref: &ComponentRef) -> Option<&ResolvedComponent> {
        self.components.iter().find(|c| &c.component_ref == component_ref)
    }

    /// The components belonging to `profile`, in resolved order.
    pub fn profile_components(&self, profile_name: &str) -> Option<Vec<&ResolvedComponent>> {
        let profile = self.profiles.iter().find(|p| p.name == profile_name)?;
        let wanted: BTreeSet<&str> = profile.components.iter().map(|s| s.as_str()).collect();
        Some(self.components.iter().filter(|c| wanted.contains(c.component_ref.name.as_str())).collect())
    }
}

/// A plugin root directory (the path a `PluginRef` in the core manifest
/// points at) plus the plugin's parsed identifier.
pub struct PluginSource {
    pub id: PluginId,
    pub dir: PathBuf,
}

/// Read just the core manifest's `plugins` list and turn each entry into a
/// [`PluginSource`] rooted at `plugins_base`. Callers use this to build the
/// `plugin_dirs` argument to [`load_manifests`] without duplicating its
/// parsing logic.
pub fn plugin_sources(core_manifest_path: &Path, plugins_base: &Path) -> Result<Vec<PluginSource>, EngineError> {
    let bytes = std::fs::read(core_manifest_path).map_err(|e| EngineError::Io {
        path: core_manifest_path.to_path_buf(),
        source: e,
    })?;
    let core_manifest = validate_core_manifest(&bytes).map_err(|e| EngineError::ManifestSchema(e.to_string()))?;
    Ok(core_manifest
        .plugins
        .into_iter()
        .map(|plugin_ref| PluginSource {
            id: plugin_ref.id,
            dir: plugins_base.join(plugin_ref.path),
        })
        .collect())
}

/// Load the core manifest at `core_manifest_path`, plus every plugin's
/// `plugin.yaml` under the directories in `plugin_dirs`, validate both,
/// resolve each component's file globs, compose the target structure
/// schema, and produce a dependency-ordered [`ResolvedSpec`]. `callback`
/// resolves INTERACTIVE structure-entry conflicts; pass `None` to fall
/// back to UNION when none is configured.
pub fn load_manifests(
    core_manifest_path: &Path,
    plugin_dirs: &[PluginSource],
    callback: Option<&dyn ResolverCallback>,
) -> Result<ResolvedSpec, EngineError> {
    let core_bytes = std::fs::read(core_manifest_path).map_err(|e| EngineError::Io {
        path: core_manifest_path.to_path_buf(),
        source: e,
    })?;
    let core_manifest = validate_core_manifest(&core_bytes).map_err(|e| EngineError::ManifestSchema(e.to_string()))?;
    let core_base = core_manifest_path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();

    let mut resolved = vec![];
    let mut structures: Vec<(String, StructureSchema)> = vec![];
    let mut seen_names: BTreeSet<String> = BTreeSet::new();

    for component in &core_manifest.components {
        let component_ref = ComponentRef {
            plugin_id: None,
            name: component.name.clone(),
        };
        if !seen_names.insert(component_ref.qualified()) {
            return Err(EngineError::Conflict(ConflictError::DuplicateComponent {
                component: component_ref.qualified(),
            }));
        }
        resolved.push(resolve_component(component_ref, component, &core_base, None)?);
    }

    for plugin in plugin_dirs {
        let manifest_path = plugin.dir.join("plugin.yaml");
        let bytes = std::fs::read(&manifest_path).map_err(|e| EngineError::Io {
            path: manifest_path.clone(),
            source: e,
        })?;
        let plugin_manifest =
            validate_plugin_manifest(&bytes).map_err(|e| EngineError::ManifestSchema(e.to_string()))?;

        if let Some(structure) = &plugin_manifest.structure {
            structures.push((plugin.id.clone(), structure.clone()));
        }

        for component in &plugin_manifest.components {
            let component_ref = ComponentRef {
                plugin_id: Some(plugin.id.clone()),
                name: component.name.clone(),
            };
            if !seen_names.insert(component_ref.qualified()) {
                return Err(EngineError::Conflict(ConflictError::DuplicateComponent {
                    component: component_ref.qualified(),
                }));
            }
            resolved.push(resolve_component(
                component_ref,
                component,
                &plugin.dir,
                Some(plugin.id.clone()),
            )?);
        }
    }

    let order_input: Vec<(ComponentRef, u8, Vec<ComponentRef>)> = resolved
        .iter()
        .map(|c| (c.component_ref.clone(), c.install_order, c.dependencies.clone()))
        .collect();
    let order = resolve_order(&order_input).map_err(EngineError::Dep)?;

    let mut by_ref: std::collections::HashMap<ComponentRef, ResolvedComponent> =
        resolved.into_iter().map(|c| (c.component_ref.clone(), c)).collect();
    let ordered_components = order
        .into_iter()
        .map(|component_ref| by_ref.remove(&component_ref).expect("resolve_order is a permutation of its input"))
        .collect();

    let composition = compose_target_schema(&structures, callback);
    if let Some(conflict) = composition.conflicts.first() {
        return Err(EngineError::Conflict(ConflictError::StrictOverlap {
            path: conflict.path.clone(),
            plugins: conflict.plugins.clone(),
        }));
    }
    if let Err(mut errors) = check_structure_constraints(&composition.schema, &structures) {
        match errors.remove(0) {
            ConflictOrDep::Dep(e) => return Err(EngineError::Dep(e)),
            ConflictOrDep::Conflict(e) => return Err(EngineError::Conflict(e)),
        }
    }

    Ok(ResolvedSpec {
        components: ordered_components,
        schema: composition.schema,
        profiles: core_manifest.profiles,
    })
}

fn resolve_component(
    component_ref: ComponentRef,
    component: &Component,
    base_dir: &Path,
    _plugin_id: Option<PluginId>,
) -> Result<ResolvedComponent, EngineError> {
    let mut files = vec![];
    for pattern in &component.files {
        let full_pattern = base_dir.join(pattern);
        let matches: Vec<PathBuf> = glob::glob(&full_pattern.to_string_lossy())
            .map_err(|e| EngineError::ManifestSchema(format!("invalid glob pattern {pattern:?}: {e}")))?
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .collect();

        if matches.is_empty() {
            return Err(EngineError::Validation(ValidationError::NoFilesMatched {
                component: component_ref.qualified(),
                pattern: pattern.clone(),
            }));
        }
        files.extend(matches);
    }
    files.sort();

    let dependencies = component
        .dependencies
        .iter()
        .map(|name| ComponentRef {
            plugin_id: component_ref.plugin_id.clone(),
            name: name.clone(),
        })
        .collect();

    let digest_input = ComponentDigestInput {
        name: &component_ref.name,
        files: &files,
        target_prefix: &component.target_prefix,
        dependencies: &component.dependencies,
        post_install: &component.post_install,
    };
    let manifest_digest =
        guardrails_adapters::hashing::manifest_digest(&digest_input).map_err(|e| EngineError::ManifestSchema(e.to_string()))?;

    Ok(ResolvedComponent {
        component_ref,
        base_dir: base_dir.to_path_buf(),
        files,
        target_prefix: component.target_prefix.clone(),
        dependencies,
        install_order: component.install_order,
        required: component.required,
        post_install: component.post_install.clone(),
        validation: component.validation.clone(),
        manifest_digest,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use guardrails_domain::manifest::CoreManifest;
    use tempfile::tempdir;

    fn write_core_manifest(dir: &Path, yaml: &str) -> PathBuf {
        let path = dir.join("core.yaml");
        std::fs::write(&path, yaml).unwrap();
        path
    }

    #[test]
    fn load_manifests_resolves_globs_and_orders_components() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("guardrails.yaml"), b"root: true\n").unwrap();

        let manifest_path = write_core_manifest(
            dir.path(),
            r#"
components:
  - name: base
    files: ["guardrails.yaml"]
    install_order: 0
  - name: extra
    files: ["guardrails.yaml"]
    dependencies: [base]
    install_order: 1
profiles:
  - name: minimal
    components: [base]
"#,
        );

        let spec = load_manifests(&manifest_path, &[], None).unwrap();
        let names: Vec<&str> = spec.components.iter().map(|c| c.component_ref.name.as_str()).collect();
        assert_eq!(names, vec!["base", "extra"]);
        assert_eq!(spec.components[0].files.len(), 1);
    }

    #[test]
    fn load_manifests_errors_on_unmatched_glob() {
        let dir = tempdir().unwrap();
        let manifest_path = write_core_manifest(
            dir.path(),
            r#"
components:
  - name: base
    files: ["missing/*.yaml"]
"#,
        );

        let result = load_manifests(&manifest_path, &[], None);
        assert!(matches!(
            result,
            Err(EngineError::Validation(ValidationError::NoFilesMatched { .. }))
        ));
    }

    #[test]
    fn core_manifest_type_is_reexported_for_callers() {
        let _manifest: CoreManifest = CoreManifest::default();
    }
}
