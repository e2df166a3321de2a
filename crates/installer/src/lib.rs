//! Transactional execution of an [`InstallPlan`]: each component is
//! staged, verified, backed up, promoted, and receipted as one unit — on
//! any failure mid-transaction the already-staged/promoted files for that
//! component are rolled back from the backup copy, and any file promoted
//! fresh (no prior version to restore) is removed outright.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use guardrails_adapters::fs::{self as fs_adapter, BACKUP_SENTINEL, STAGE_SENTINEL};
use guardrails_adapters::hashing::{sha256_file, sha256_hex};
use guardrails_adapters::receipts::ReceiptStore;
use guardrails_adapters::yaml_ops;
use guardrails_domain::error::{DriftError, EngineError, ValidationError};
use guardrails_domain::plan::{ActionKind, ComponentPlan, InstallPlan, Reason};
use guardrails_domain::receipt::{InstalledFile, Receipt, SourceDigest};
use guardrails_domain::report::{ComponentOutcome, ComponentResult, ExecutionReport};
use guardrails_domain::schema::TargetStructureSchema;

const LOCK_FILE: &str = ".ai/guardrails/.lock";
const STAGING_ROOT: &str = ".ai/guardrails/.staging";
const BACKUP_ROOT: &str = ".ai/guardrails/.backup";

/// Execute `plan` against `target_root`. Acquires the advisory run lock
/// for the duration of the call; returns `EngineError::Busy` immediately
/// if another run already holds it.
pub fn execute(
    plan: &InstallPlan,
    target_root: &Path,
    receipts: &ReceiptStore,
    schema: &TargetStructureSchema,
    vars: &BTreeMap<String, String>,
    dry_run: bool,
    force: bool,
) -> Result<ExecutionReport, EngineError> {
    let _lock = fs_adapter::Lock::try_acquire(&target_root.join(LOCK_FILE))
        .map_err(|e| EngineError::Busy(e.to_string()))?;

    let mut report = ExecutionReport::new();

    for component_plan in &plan.components {
        if component_plan.is_unchanged() && !force {
            report.results.push(ComponentResult {
                component: component_plan.name.clone(),
                outcome: ComponentOutcome::Skipped,
                files_written: 0,
                error: None,
            });
            continue;
        }

        if dry_run {
            let files_written = component_plan.actions.iter().filter(|a| a.kind != ActionKind::Skip).count();
            report.results.push(ComponentResult {
                component: component_plan.name.clone(),
                outcome: ComponentOutcome::DryRun,
                files_written,
                error: None,
            });
            continue;
        }

        match execute_component(component_plan, target_root, receipts, schema, vars) {
            Ok(files_written) => {
                report.results.push(ComponentResult {
                    component: component_plan.name.clone(),
                    outcome: ComponentOutcome::Installed,
                    files_written,
                    error: None,
                });
            }
            Err(error) => {
                tracing::warn!(component = %component_plan.name, error = %error, "component install failed, rolled back");
                let fatal = false; // required-component escalation happens one level up, in the orchestrator, which knows Component::required.
                report.results.push(ComponentResult {
                    component: component_plan.name.clone(),
                    outcome: ComponentOutcome::RolledBack,
                    files_written: 0,
                    error: Some((&error).into()),
                });
                if fatal {
                    report.aborted = true;
                    break;
                }
            }
        }
    }

    Ok(report)
}

fn qualified(component_plan: &ComponentPlan) -> String {
    match &component_plan.plugin_id {
        Some(plugin_id) => format!("{plugin_id}/{}", component_plan.name),
        None => component_plan.name.clone(),
    }
}

fn execute_component(
    component_plan: &ComponentPlan,
    target_root: &Path,
    receipts: &ReceiptStore,
    schema: &TargetStructureSchema,
    vars: &BTreeMap<String, String>,
) -> Result<usize, EngineError> {
    let key = qualified(component_plan);
    let staging_dir = target_root.join(STAGING_ROOT).join(&key);
    let backup_dir = target_root.join(BACKUP_ROOT).join(&key);

    let result = run_transaction(component_plan, target_root, &staging_dir, &backup_dir, schema, vars);

    match result {
        Ok(written) => {
            let receipt = build_receipt(component_plan, target_root, &written)?;
            receipts.put(&receipt).map_err(to_io_error)?;
            let _ = fs_adapter::safe_rmtree(&staging_dir, STAGE_SENTINEL);
            let _ = fs_adapter::safe_rmtree(&backup_dir, BACKUP_SENTINEL);
            Ok(written.len())
        }
        Err(error) => {
            rollback(component_plan, target_root, &backup_dir, &staging_dir);
            Err(error)
        }
    }
}

/// One source file rendered into the staging directory, with enough state
/// to back it up (or not) and promote it.
struct Staged {
    dst_path: String,
    staged_path: PathBuf,
    target_path: PathBuf,
    had_prior_target: bool,
}

fn run_transaction(
    component_plan: &ComponentPlan,
    target_root: &Path,
    staging_dir: &Path,
    backup_dir: &Path,
    schema: &TargetStructureSchema,
    vars: &BTreeMap<String, String>,
) -> Result<Vec<(String, PathBuf)>, EngineError> {
    let key = qualified(component_plan);
    fs_adapter::stage(staging_dir, &component_plan.name, STAGE_SENTINEL).map_err(to_io_error)?;

    let active_actions: Vec<_> = component_plan.actions.iter().filter(|a| a.kind != ActionKind::Skip).collect();
    if active_actions.is_empty() {
        return Ok(vec![]);
    }

    fs_adapter::stage(backup_dir, &component_plan.name, BACKUP_SENTINEL).map_err(to_io_error)?;

    // 1. Stage: render every active action's content into the staging dir.
    let mut staged = vec![];
    for action in &active_actions {
        let target_path = target_root.join(&action.dst_path);
        let staged_path = staging_dir.join(&action.dst_path);

        let content = render_content(action.kind, &action.src_path, &target_path, vars)?;
        fs_adapter::atomic_write(&staged_path, &content, 0o644).map_err(to_io_error)?;

        // Verify: the staged bytes on disk must hash to what we just rendered.
        let expected_sha = sha256_hex(&content);
        let actual_sha = sha256_file(&staged_path).map_err(|e| io_error(&staged_path, e))?;
        if actual_sha != expected_sha {
            return Err(EngineError::Drift(DriftError::HashMismatch {
                component: key.clone(),
                path: action.dst_path.clone(),
                expected: expected_sha,
                actual: actual_sha,
            }));
        }

        staged.push(Staged {
            dst_path: action.dst_path.clone(),
            had_prior_target: target_path.exists(),
            staged_path,
            target_path,
        });
    }

    // 2. Verify: composed-schema constraints must still hold once this
    // component's files land — check against the tree as it stands today
    // plus the paths this transaction is about to add.
    let pending: std::collections::HashSet<&str> = staged.iter().map(|s| s.dst_path.as_str()).collect();
    let existing = existing_relative_paths(target_root);
    for required in schema.required_paths() {
        if !path_satisfied(required, &existing, &pending) {
            return Err(EngineError::Validation(ValidationError::SchemaUnsatisfied {
                component: key.clone(),
                path: required.to_string(),
            }));
        }
    }

    // 3. Backup: anything a promote is about to overwrite.
    for action in &staged {
        if action.had_prior_target {
            let backup_path = backup_dir.join(&action.dst_path);
            let bytes = std::fs::read(&action.target_path).map_err(|e| io_error(&action.target_path, e))?;
            fs_adapter::atomic_write(&backup_path, &bytes, 0o644).map_err(to_io_error)?;
        }
    }

    // 4. Promote.
    for action in &staged {
        fs_adapter::promote_file(&action.staged_path, &action.target_path).map_err(to_io_error)?;
    }

    Ok(staged.into_iter().map(|s| (s.dst_path, s.staged_path)).collect())
}

/// Every path already present under `root`, as both plain files
/// (`"docs/setup.md"`) and directories (`"docs/"`), relative to `root` with
/// forward slashes — the same shape composed-schema entries use.
fn existing_relative_paths(root: &Path) -> std::collections::HashSet<String> {
    let mut out = std::collections::HashSet::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(relative) = path.strip_prefix(root) else { continue };
            let relative = relative.to_string_lossy().replace('\\', "/");
            if path.is_dir() {
                out.insert(format!("{relative}/"));
                stack.push(path);
            } else {
                out.insert(relative);
            }
        }
    }
    out
}

/// Is `required` satisfied by what's already on disk, or by one of this
/// transaction's pending destination paths? Directory entries (trailing
/// `/`) are satisfied by any path under them; file entries need an exact
/// match.
fn path_satisfied(required: &str, existing: &std::collections::HashSet<String>, pending: &std::collections::HashSet<&str>) -> bool {
    if let Some(prefix) = required.strip_suffix('/') {
        let prefix = format!("{prefix}/");
        existing.iter().any(|p| p.starts_with(&prefix)) || pending.iter().any(|p| p.starts_with(&prefix))
    } else {
        existing.contains(required) || pending.contains(required)
    }
}

fn render_content(
    kind: ActionKind,
    src_path: &str,
    target_path: &Path,
    vars: &BTreeMap<String, String>,
) -> Result<Vec<u8>, EngineError> {
    let source_bytes = std::fs::read(src_path).map_err(|e| io_error(Path::new(src_path), e))?;

    match kind {
        ActionKind::Copy => Ok(source_bytes),
        ActionKind::Template => {
            let source_text = String::from_utf8_lossy(&source_bytes).into_owned();
            let rendered = yaml_ops::template(&source_text, vars).map_err(|e| {
                EngineError::Validation(guardrails_domain::error::ValidationError::UndefinedVariable {
                    path: src_path.to_string(),
                    variable: e.to_string(),
                })
            })?;
            Ok(rendered.into_bytes())
        }
        ActionKind::Merge => {
            let overlay = yaml_ops::Doc::load(&source_bytes).map_err(|e| merge_error(src_path, e))?;
            let base_bytes = std::fs::read(target_path).map_err(|e| io_error(target_path, e))?;
            let base = yaml_ops::Doc::load(&base_bytes).map_err(|e| merge_error(src_path, e))?;
            let merged = yaml_ops::merge(base, overlay);
            merged.dump().map_err(|e| merge_error(src_path, e))
        }
        ActionKind::Skip => unreachable!("filtered out before render_content is called"),
    }
}

fn merge_error(path: &str, error: yaml_ops::Error) -> EngineError {
    EngineError::ManifestSchema(format!("merge failed for {path:?}: {error}"))
}

fn io_error(path: &Path, source: std::io::Error) -> EngineError {
    EngineError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn to_io_error(error: impl std::fmt::Display) -> EngineError {
    EngineError::Io {
        path: PathBuf::new(),
        source: std::io::Error::new(std::io::ErrorKind::Other, error.to_string()),
    }
}

/// Undo whatever of `component_plan` reached the target tree before the
/// transaction failed. Files that had a prior version are restored from
/// `backup_dir`; files that were promoted fresh (no backup entry, because
/// they didn't exist before this run) are removed outright, so the set of
/// paths present after rollback matches the set present before the run.
fn rollback(component_plan: &ComponentPlan, target_root: &Path, backup_dir: &Path, staging_dir: &Path) {
    if backup_dir.exists() {
        if let Ok(entries) = walk_files(backup_dir) {
            for (relative, backup_path) in entries {
                if relative == BACKUP_SENTINEL {
                    continue;
                }
                let target_path = target_root.join(&relative);
                let _ = fs_adapter::promote_file(&backup_path, &target_path);
            }
        }
    }

    for action in &component_plan.actions {
        if action.kind == ActionKind::Skip {
            continue;
        }
        let backup_path = backup_dir.join(&action.dst_path);
        if backup_path.exists() {
            continue;
        }
        let target_path = target_root.join(&action.dst_path);
        if target_path.exists() {
            let _ = std::fs::remove_file(&target_path);
        }
    }

    let _ = fs_adapter::safe_rmtree(backup_dir, BACKUP_SENTINEL);
    let _ = fs_adapter::safe_rmtree(staging_dir, STAGE_SENTINEL);
}

fn walk_files(root: &Path) -> std::io::Result<Vec<(String, PathBuf)>> {
    let mut out = vec![];
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let relative = path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
                out.push((relative, path));
            }
        }
    }
    Ok(out)
}

fn build_receipt(
    component_plan: &ComponentPlan,
    target_root: &Path,
    written: &[(String, PathBuf)],
) -> Result<Receipt, EngineError> {
    let mut installed_files = vec![];
    for (dst_path, _) in written {
        let target_path = target_root.join(dst_path);
        let sha256 = sha256_file(&target_path).map_err(|e| io_error(&target_path, e))?;
        let mode = file_mode(&target_path);
        let size = std::fs::metadata(&target_path).map(|m| m.len()).unwrap_or(0);
        installed_files.push(InstalledFile {
            path: dst_path.clone(),
            sha256,
            mode,
            size,
        });
    }

    let source_digests = component_plan
        .actions
        .iter()
        .map(|a| {
            sha256_file(Path::new(&a.src_path)).map(|sha256| SourceDigest {
                src_path: a.src_path.clone(),
                sha256,
            })
        })
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| io_error(Path::new("<source>"), e))?;

    Ok(Receipt {
        component: qualified(component_plan),
        plugin_id: component_plan.plugin_id.clone(),
        manifest_digest: component_plan.manifest_digest.clone(),
        installed_files,
        source_digests,
        installed_at: Utc::now(),
        engine_version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(unix)]
fn file_mode(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).map(|m| m.permissions().mode() & 0o7777).unwrap_or(0o644)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> u32 {
    0o644
}

/// Best-effort uninstall of one component's receipt: a file is only
/// removed if its on-disk hash still matches what the receipt recorded.
/// Drifted files are left in place and reported, but do not block removal
/// of the rest — an uninstall should never silently destroy edits the
/// user made after install.
pub fn uninstall(key: &str, target_root: &Path, receipts: &ReceiptStore) -> Result<Vec<String>, EngineError> {
    let Some(receipt) = receipts.get(key).map_err(to_io_error)? else {
        return Ok(vec![]);
    };

    let mut refused = vec![];
    for file in &receipt.installed_files {
        let path = target_root.join(&file.path);
        match sha256_file(&path) {
            Ok(actual) if actual == file.sha256 => {
                let _ = std::fs::remove_file(&path);
            }
            _ => refused.push(file.path.clone()),
        }
    }

    receipts.delete(key).map_err(to_io_error)?;
    Ok(refused)
}

#[cfg(test)]
mod test {
    use super::*;
    use guardrails_domain::plan::FileAction;
    use tempfile::tempdir;

    fn write_source(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn execute_installs_new_component_and_records_receipt() {
        let src_dir = tempdir().unwrap();
        let target_dir = tempdir().unwrap();
        let source = write_source(src_dir.path(), "a.txt", "hello");

        let plan = InstallPlan {
            components: vec![ComponentPlan {
                name: "core".into(),
                plugin_id: None,
                manifest_digest: "digest-1".into(),
                actions: vec![FileAction {
                    kind: ActionKind::Copy,
                    src_path: source.display().to_string(),
                    dst_path: "a.txt".into(),
                    mode: None,
                    reason: Reason::New,
                }],
            }],
        };

        let receipts = ReceiptStore::new(target_dir.path());
        let schema = TargetStructureSchema::new();
        let report = execute(&plan, target_dir.path(), &receipts, &schema, &BTreeMap::new(), false, false).unwrap();

        assert!(report.is_success());
        assert_eq!(report.results[0].outcome, ComponentOutcome::Installed);
        assert_eq!(std::fs::read_to_string(target_dir.path().join("a.txt")).unwrap(), "hello");
        assert!(receipts.get("core").unwrap().is_some());
    }

    #[test]
    fn dry_run_writes_nothing() {
        let src_dir = tempdir().unwrap();
        let target_dir = tempdir().unwrap();
        let source = write_source(src_dir.path(), "a.txt", "hello");

        let plan = InstallPlan {
            components: vec![ComponentPlan {
                name: "core".into(),
                plugin_id: None,
                manifest_digest: "digest-1".into(),
                actions: vec![FileAction {
                    kind: ActionKind::Copy,
                    src_path: source.display().to_string(),
                    dst_path: "a.txt".into(),
                    mode: None,
                    reason: Reason::New,
                }],
            }],
        };

        let receipts = ReceiptStore::new(target_dir.path());
        let schema = TargetStructureSchema::new();
        let report = execute(&plan, target_dir.path(), &receipts, &schema, &BTreeMap::new(), true, false).unwrap();

        assert_eq!(report.results[0].outcome, ComponentOutcome::DryRun);
        assert!(!target_dir.path().join("a.txt").exists());
    }

    #[test]
    fn schema_violation_aborts_the_component_without_writing() {
        let src_dir = tempdir().unwrap();
        let target_dir = tempdir().unwrap();
        let source = write_source(src_dir.path(), "a.txt", "hello");

        let plan = InstallPlan {
            components: vec![ComponentPlan {
                name: "core".into(),
                plugin_id: None,
                manifest_digest: "digest-1".into(),
                actions: vec![FileAction {
                    kind: ActionKind::Copy,
                    src_path: source.display().to_string(),
                    dst_path: "a.txt".into(),
                    mode: None,
                    reason: Reason::New,
                }],
            }],
        };

        let receipts = ReceiptStore::new(target_dir.path());
        let mut schema = TargetStructureSchema::new();
        schema.entries.insert(
            "nowhere/".into(),
            guardrails_domain::schema::SchemaEntry {
                required: true,
                merge_strategy: guardrails_domain::manifest::MergeStrategy::Strict,
                owner_plugin: Some("core".into()),
                description: None,
                provenance: guardrails_domain::schema::Provenance {
                    contributors: vec!["core".into()],
                    strategy: guardrails_domain::manifest::MergeStrategy::Strict,
                },
            },
        );

        let report = execute(&plan, target_dir.path(), &receipts, &schema, &BTreeMap::new(), false, false).unwrap();

        assert_eq!(report.results[0].outcome, ComponentOutcome::RolledBack);
        assert!(!target_dir.path().join("a.txt").exists());
        assert!(receipts.get("core").unwrap().is_none());
    }

    #[test]
    fn rollback_removes_newly_promoted_files_but_restores_overwritten_ones() {
        let target_dir = tempdir().unwrap();
        std::fs::write(target_dir.path().join("existing.txt"), "updated-but-should-revert").unwrap();
        std::fs::write(target_dir.path().join("new.txt"), "promoted-but-should-vanish").unwrap();

        let backup_dir = target_dir.path().join(".ai/guardrails/.backup/core");
        fs_adapter::stage(&backup_dir, "core", BACKUP_SENTINEL).unwrap();
        std::fs::write(backup_dir.join("existing.txt"), "original").unwrap();

        let staging_dir = target_dir.path().join(".ai/guardrails/.staging/core");
        fs_adapter::stage(&staging_dir, "core", STAGE_SENTINEL).unwrap();

        let component_plan = ComponentPlan {
            name: "core".into(),
            plugin_id: None,
            manifest_digest: "digest-1".into(),
            actions: vec![
                FileAction {
                    kind: ActionKind::Copy,
                    src_path: "unused".into(),
                    dst_path: "existing.txt".into(),
                    mode: None,
                    reason: Reason::HashDiff,
                },
                FileAction {
                    kind: ActionKind::Copy,
                    src_path: "unused".into(),
                    dst_path: "new.txt".into(),
                    mode: None,
                    reason: Reason::New,
                },
            ],
        };

        rollback(&component_plan, target_dir.path(), &backup_dir, &staging_dir);

        assert_eq!(std::fs::read_to_string(target_dir.path().join("existing.txt")).unwrap(), "original");
        assert!(!target_dir.path().join("new.txt").exists());
    }

    #[test]
    fn uninstall_refuses_drifted_file_but_removes_the_rest() {
        let target_dir = tempdir().unwrap();
        std::fs::write(target_dir.path().join("keep.txt"), "original").unwrap();
        std::fs::write(target_dir.path().join("drifted.txt"), "user edited").unwrap();

        let receipts = ReceiptStore::new(target_dir.path());
        receipts
            .put(&Receipt {
                component: "core".into(),
                plugin_id: None,
                manifest_digest: "d".into(),
                installed_files: vec![
                    InstalledFile {
                        path: "keep.txt".into(),
                        sha256: sha256_file(&target_dir.path().join("keep.txt")).unwrap(),
                        mode: 0o644,
                        size: 8,
                    },
                    InstalledFile {
                        path: "drifted.txt".into(),
                        sha256: "not-the-real-hash".into(),
                        mode: 0o644,
                        size: 11,
                    },
                ],
                source_digests: vec![],
                installed_at: Utc::now(),
                engine_version: "0.1.0".into(),
            })
            .unwrap();

        let refused = uninstall("core", target_dir.path(), &receipts).unwrap();
        assert_eq!(refused, vec!["drifted.txt".to_string()]);
        assert!(!target_dir.path().join("keep.txt").exists());
        assert!(target_dir.path().join("drifted.txt").exists());
    }
}
