//! Compose each enabled plugin's structure schema into a single
//! [`TargetStructureSchema`] under the UNION/OVERRIDE/STRICT/INTERACTIVE
//! policy: directories default to UNION, files default to STRICT, either
//! may be overridden per-entry via `merge_strategy`.

use guardrails_domain::error::{ConflictError, DepError};
use guardrails_domain::manifest::{MergeStrategy, StructureEntry, StructureSchema};
use guardrails_domain::schema::{CompositionResult, Provenance, SchemaConflict, SchemaEntry, TargetStructureSchema};

/// The shell-provided hook for resolving an INTERACTIVE merge conflict.
/// The core never prompts a terminal itself — it asks the callback, which
/// may consult the user, and falls back to `UNION` when no callback is
/// configured at all (`compose_target_schema`'s `callback: None`).
pub trait ResolverCallback {
    /// `path` is the conflicting structure entry; `contributors` are the
    /// plugins that have already contributed to it, in contribution order.
    /// Returning `Interactive` again is treated the same as `Union`.
    fn resolve_conflict(&self, path: &str, contributors: &[String], incoming_plugin: &str) -> MergeStrategy;
}

fn default_strategy(path: &str) -> MergeStrategy {
    if path.ends_with('/') {
        MergeStrategy::Union
    } else {
        MergeStrategy::Strict
    }
}

/// Compose the `provides` entries of every `(plugin_id, schema)` pair, in
/// the order given (which should already reflect install order — the
/// first contributor wins ties under OVERRIDE). `callback` resolves
/// INTERACTIVE conflicts; `None` falls back to UNION, per the composition
/// policy.
pub fn compose_target_schema(plugins: &[(String, StructureSchema)], callback: Option<&dyn ResolverCallback>) -> CompositionResult {
    let mut schema = TargetStructureSchema::new();
    let mut conflicts = vec![];

    for (plugin_id, structure) in plugins {
        for entry in &structure.provides {
            admit_entry(&mut schema, &mut conflicts, plugin_id, entry, callback);
        }
    }

    CompositionResult { schema, conflicts }
}

fn admit_entry(
    schema: &mut TargetStructureSchema,
    conflicts: &mut Vec<SchemaConflict>,
    plugin_id: &str,
    entry: &StructureEntry,
    callback: Option<&dyn ResolverCallback>,
) {
    let strategy = entry.merge_strategy.unwrap_or_else(|| default_strategy(&entry.path));

    match schema.entries.get_mut(&entry.path) {
        None => {
            schema.entries.insert(
                entry.path.clone(),
                SchemaEntry {
                    required: entry.required,
                    merge_strategy: strategy,
                    owner_plugin: Some(plugin_id.to_string()),
                    description: entry.description.clone(),
                    provenance: Provenance {
                        contributors: vec![plugin_id.to_string()],
                        strategy,
                    },
                },
            );
        }
        Some(existing) => {
            existing.required = existing.required || entry.required;
            existing.provenance.contributors.push(plugin_id.to_string());

            let effective = if strategy == MergeStrategy::Interactive {
                match callback {
                    Some(cb) => cb.resolve_conflict(&entry.path, &existing.provenance.contributors, plugin_id),
                    None => MergeStrategy::Union,
                }
            } else {
                strategy
            };

            match effective {
                MergeStrategy::Union | MergeStrategy::Interactive => {}
                MergeStrategy::Override => {
                    existing.owner_plugin = Some(plugin_id.to_string());
                    existing.merge_strategy = effective;
                }
                MergeStrategy::Strict => {
                    if existing.owner_plugin.as_deref() != Some(plugin_id) {
                        conflicts.push(SchemaConflict {
                            path: entry.path.clone(),
                            plugins: existing.provenance.contributors.clone(),
                        });
                    }
                }
            }
        }
    }
}

/// Check every plugin's `requires` entries against the composed schema,
/// and every `conflicts` entry against paths another plugin provides.
pub fn check_structure_constraints(
    schema: &TargetStructureSchema,
    plugins: &[(String, StructureSchema)],
) -> Result<(), Vec<ConflictOrDep>> {
    let mut errors = vec![];

    for (plugin_id, structure) in plugins {
        for required in &structure.requires {
            if !schema.entries.contains_key(&required.path) {
                errors.push(ConflictOrDep::Dep(DepError::UnsatisfiedStructure {
                    plugin: plugin_id.clone(),
                    path: required.path.clone(),
                }));
            }
        }

        for conflicting in &structure.conflicts {
            if let Some(entry) = schema.entries.get(&conflicting.path) {
                if entry.owner_plugin.as_deref() != Some(plugin_id.as_str()) {
                    errors.push(ConflictOrDep::Conflict(ConflictError::StrictOverlap {
                        path: conflicting.path.clone(),
                        plugins: entry.provenance.contributors.clone(),
                    }));
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[derive(Debug)]
pub enum ConflictOrDep {
    Dep(DepError),
    Conflict(ConflictError),
}
