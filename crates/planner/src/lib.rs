//! Pure planning: turn a [`ResolvedSpec`] plus the current receipt store
//! into an [`InstallPlan`] with no filesystem writes and no shelling out.
//! Given identical inputs, `plan` produces byte-identical
//! `InstallPlan::canonical_json()` output — this is asserted directly in
//! tests, not just hoped for.

use std::path::{Path, PathBuf};

use guardrails_adapters::hashing::sha256_file;
use guardrails_adapters::receipts::ReceiptStore;
use guardrails_domain::error::EngineError;
use guardrails_domain::plan::{ActionKind, ComponentPlan, FileAction, InstallPlan, Reason};
use guardrails_resolver::{ResolvedComponent, ResolvedSpec};

/// Build the full install plan for every component in `resolved`, in
/// resolved (dependency-respecting) order.
pub fn plan(resolved: &ResolvedSpec, target_root: &Path, receipts: &ReceiptStore, force: bool) -> Result<InstallPlan, EngineError> {
    let mut components = vec![];
    for component in &resolved.components {
        components.push(plan_component(component, target_root, receipts, force)?);
    }
    Ok(InstallPlan { components })
}

fn plan_component(
    component: &ResolvedComponent,
    target_root: &Path,
    receipts: &ReceiptStore,
    force: bool,
) -> Result<ComponentPlan, EngineError> {
    let key = component.component_ref.qualified();
    let receipt = receipts.get(&key).map_err(|e| EngineError::Io {
        path: target_root.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
    })?;

    // Manifest-digest short-circuit: if the component's definition hasn't
    // changed since the receipt was recorded, every file is unchanged
    // without re-hashing a single one.
    if !force {
        if let Some(receipt) = &receipt {
            if receipt.manifest_digest == component.manifest_digest {
                let actions = component
                    .files
                    .iter()
                    .map(|src| {
                        let dst_path = dst_path_for(component, src);
                        FileAction {
                            kind: ActionKind::Skip,
                            src_path: src.display().to_string(),
                            dst_path,
                            mode: None,
                            reason: Reason::Unchanged,
                        }
                    })
                    .collect();
                return Ok(ComponentPlan {
                    name: component.component_ref.name.clone(),
                    plugin_id: component.component_ref.plugin_id.clone(),
                    manifest_digest: component.manifest_digest.clone(),
                    actions: sorted_by_dst(actions),
                });
            }
        }
    }

    let mut actions = vec![];
    for src in &component.files {
        actions.push(plan_file(component, src, target_root, receipt.as_ref())?);
    }

    Ok(ComponentPlan {
        name: component.component_ref.name.clone(),
        plugin_id: component.component_ref.plugin_id.clone(),
        manifest_digest: component.manifest_digest.clone(),
        actions: sorted_by_dst(actions),
    })
}

fn sorted_by_dst(mut actions: Vec<FileAction>) -> Vec<FileAction> {
    actions.sort_by(|a, b| a.dst_path.cmp(&b.dst_path));
    actions
}

fn src_rel(component: &ResolvedComponent, src: &Path) -> String {
    src.strip_prefix(&component.base_dir)
        .unwrap_or(src)
        .to_string_lossy()
        .replace('\\', "/")
}

/// A filename's `.example.<ext>`/`.template.<ext>` marker, if any. The
/// marker must sit directly before the final extension segment:
/// `config.example.yaml` carries `Example("yaml")`, `hook.template.sh`
/// carries `Template`, `hook.sh` carries `None`.
enum Marker {
    Example { ext: String },
    Template,
    None,
}

fn marker_for(filename: &str) -> Marker {
    let parts: Vec<&str> = filename.split('.').collect();
    if parts.len() >= 3 {
        let ext = parts[parts.len() - 1];
        match parts[parts.len() - 2] {
            "example" => return Marker::Example { ext: ext.to_string() },
            "template" => return Marker::Template,
            _ => {}
        }
    }
    Marker::None
}

/// Strip the `.example` segment out of a filename: `config.example.yaml`
/// installs as `config.yaml`. A `.template.<ext>` marker is left untouched
/// — the destination keeps its full `.template.<ext>` suffix.
fn strip_example_marker(filename: &str) -> String {
    let parts: Vec<&str> = filename.split('.').collect();
    if parts.len() >= 3 && parts[parts.len() - 2] == "example" {
        let mut kept = parts;
        kept.remove(kept.len() - 2);
        return kept.join(".");
    }
    filename.to_string()
}

fn dst_path_for(component: &ResolvedComponent, src: &Path) -> String {
    let rel = src_rel(component, src);
    let dir = Path::new(&rel).parent().map(|p| p.to_string_lossy().to_string()).unwrap_or_default();
    let filename = Path::new(&rel).file_name().unwrap_or_default().to_string_lossy().to_string();
    let stripped_name = strip_example_marker(&filename);

    let relative = if dir.is_empty() {
        stripped_name
    } else {
        format!("{dir}/{stripped_name}")
    };

    match &component.target_prefix {
        Some(prefix) => format!("{}/{relative}", prefix.trim_end_matches('/')),
        None => relative,
    }
}

fn is_structured_ext(ext: &str) -> bool {
    matches!(ext.to_ascii_lowercase().as_str(), "yaml" | "yml" | "json")
}

fn classify_action(component: &ResolvedComponent, src: &Path, tgt_exists: bool) -> Result<ActionKind, EngineError> {
    let _ = (component, tgt_exists);
    let filename = src.file_name().unwrap_or_default().to_string_lossy();

    match marker_for(&filename) {
        Marker::Example { ext } => {
            if is_structured_ext(&ext) {
                Ok(ActionKind::Merge)
            } else {
                Ok(ActionKind::Copy)
            }
        }
        Marker::Template => Ok(ActionKind::Copy),
        Marker::None => {
            let contents = std::fs::read_to_string(src).unwrap_or_default();
            if contents.contains("${") {
                Ok(ActionKind::Template)
            } else {
                Ok(ActionKind::Copy)
            }
        }
    }
}

fn plan_file(
    component: &ResolvedComponent,
    src: &Path,
    target_root: &Path,
    receipt: Option<&guardrails_domain::receipt::Receipt>,
) -> Result<FileAction, EngineError> {
    let dst_path = dst_path_for(component, src);
    let tgt_path: PathBuf = target_root.join(&dst_path);

    let src_sha = sha256_file(src).map_err(|e| EngineError::Io {
        path: src.to_path_buf(),
        source: e,
    })?;
    let tgt_sha = if tgt_path.exists() {
        Some(sha256_file(&tgt_path).map_err(|e| EngineError::Io {
            path: tgt_path.clone(),
            source: e,
        })?)
    } else {
        None
    };

    let receipt_file = receipt.and_then(|r| r.find_file(&dst_path));
    let receipt_src_sha = receipt.and_then(|r| {
        r.source_digests
            .iter()
            .find(|s| s.src_path == src_rel(component, src))
            .map(|s| s.sha256.clone())
    });

    let reason = match (&tgt_sha, receipt_file) {
        (None, _) => Reason::New,
        (Some(tgt_sha), Some(receipt_file)) if *tgt_sha != receipt_file.sha256 => Reason::Drift,
        (Some(_), _) if receipt_src_sha.as_deref() != Some(src_sha.as_str()) => Reason::HashDiff,
        _ => Reason::Unchanged,
    };

    let kind = if reason == Reason::Unchanged {
        ActionKind::Skip
    } else {
        classify_action(component, src, tgt_path.exists())?
    };

    Ok(FileAction {
        kind,
        src_path: src.display().to_string(),
        dst_path,
        mode: None,
        reason,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use guardrails_resolver::ComponentRef;
    use tempfile::tempdir;

    fn component(dir: &Path, files: Vec<PathBuf>) -> ResolvedComponent {
        ResolvedComponent {
            component_ref: ComponentRef {
                plugin_id: None,
                name: "core".into(),
            },
            base_dir: dir.to_path_buf(),
            files,
            target_prefix: None,
            dependencies: vec![],
            install_order: 0,
            required: true,
            post_install: vec![],
            validation: None,
            manifest_digest: "digest-1".into(),
        }
    }

    #[test]
    fn new_file_plans_as_copy_new() {
        let src_dir = tempdir().unwrap();
        let target_dir = tempdir().unwrap();
        let file = src_dir.path().join("a.txt");
        std::fs::write(&file, b"hello").unwrap();

        let comp = component(src_dir.path(), vec![file]);
        let receipts = ReceiptStore::new(target_dir.path());
        let plan = plan_component(&comp, target_dir.path(), &receipts, false).unwrap();

        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].kind, ActionKind::Copy);
        assert_eq!(plan.actions[0].reason, Reason::New);
    }

    #[test]
    fn unchanged_manifest_digest_short_circuits_without_hashing() {
        let src_dir = tempdir().unwrap();
        let target_dir = tempdir().unwrap();
        let file = src_dir.path().join("a.txt");
        std::fs::write(&file, b"hello").unwrap();

        let comp = component(src_dir.path(), vec![file]);
        let receipts = ReceiptStore::new(target_dir.path());
        receipts
            .put(&guardrails_domain::receipt::Receipt {
                component: "core".into(),
                plugin_id: None,
                manifest_digest: "digest-1".into(),
                installed_files: vec![],
                source_digests: vec![],
                installed_at: chrono::DateTime::<chrono::Utc>::from_timestamp(0, 0).unwrap(),
                engine_version: "0.1.0".into(),
            })
            .unwrap();

        let plan = plan_component(&comp, target_dir.path(), &receipts, false).unwrap();
        assert!(plan.is_unchanged());
    }

    #[test]
    fn example_yaml_suffix_is_stripped_and_plans_as_merge() {
        let src_dir = tempdir().unwrap();
        let target_dir = tempdir().unwrap();
        let file = src_dir.path().join("config.example.yaml");
        std::fs::write(&file, b"key: value\n").unwrap();

        let comp = component(src_dir.path(), vec![file]);
        let receipts = ReceiptStore::new(target_dir.path());
        let plan = plan_component(&comp, target_dir.path(), &receipts, false).unwrap();

        assert_eq!(plan.actions[0].dst_path, "config.yaml");
        assert_eq!(plan.actions[0].kind, ActionKind::Merge);
    }

    #[test]
    fn example_non_structured_suffix_is_stripped_and_plans_as_copy() {
        let src_dir = tempdir().unwrap();
        let target_dir = tempdir().unwrap();
        let file = src_dir.path().join("notes.example.txt");
        std::fs::write(&file, b"hello\n").unwrap();

        let comp = component(src_dir.path(), vec![file]);
        let receipts = ReceiptStore::new(target_dir.path());
        let plan = plan_component(&comp, target_dir.path(), &receipts, false).unwrap();

        assert_eq!(plan.actions[0].dst_path, "notes.txt");
        assert_eq!(plan.actions[0].kind, ActionKind::Copy);
    }

    #[test]
    fn template_suffix_is_preserved_and_plans_as_copy() {
        let src_dir = tempdir().unwrap();
        let target_dir = tempdir().unwrap();
        let file = src_dir.path().join("hook.template.sh");
        std::fs::write(&file, b"#!/bin/sh\necho hi\n").unwrap();

        let comp = component(src_dir.path(), vec![file]);
        let receipts = ReceiptStore::new(target_dir.path());
        let plan = plan_component(&comp, target_dir.path(), &receipts, false).unwrap();

        assert_eq!(plan.actions[0].dst_path, "hook.template.sh");
        assert_eq!(plan.actions[0].kind, ActionKind::Copy);
    }

    #[test]
    fn placeholder_content_plans_as_template() {
        let src_dir = tempdir().unwrap();
        let target_dir = tempdir().unwrap();
        let file = src_dir.path().join("greeting.txt");
        std::fs::write(&file, b"hello ${name}\n").unwrap();

        let comp = component(src_dir.path(), vec![file]);
        let receipts = ReceiptStore::new(target_dir.path());
        let plan = plan_component(&comp, target_dir.path(), &receipts, false).unwrap();

        assert_eq!(plan.actions[0].dst_path, "greeting.txt");
        assert_eq!(plan.actions[0].kind, ActionKind::Template);
    }

    #[test]
    fn identical_inputs_produce_byte_identical_plans() {
        let src_dir = tempdir().unwrap();
        let target_dir = tempdir().unwrap();
        let file = src_dir.path().join("a.yaml");
        std::fs::write(&file, b"a: 1\n").unwrap();

        let comp = component(src_dir.path(), vec![file]);
        let receipts = ReceiptStore::new(target_dir.path());

        let plan_a = plan_component(&comp, target_dir.path(), &receipts, false).unwrap();
        let plan_b = plan_component(&comp, target_dir.path(), &receipts, false).unwrap();

        let install_a = InstallPlan { components: vec![plan_a] };
        let install_b = InstallPlan { components: vec![plan_b] };
        assert_eq!(install_a.canonical_json().unwrap(), install_b.canonical_json().unwrap());
    }
}
