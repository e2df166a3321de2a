//! Read-only diagnosis of an installed tree against its receipts and the
//! resolved specification, plus policy-driven repair built on top of the
//! same Planner/Installer machinery a fresh install uses.

use std::collections::BTreeMap;
use std::path::Path;

use guardrails_adapters::hashing::sha256_file;
use guardrails_adapters::receipts::ReceiptStore;
use guardrails_domain::error::EngineError;
use guardrails_domain::report::{Finding, Report};
use guardrails_resolver::ResolvedSpec;

const STAGING_ROOT: &str = ".ai/guardrails/.staging";
const BACKUP_ROOT: &str = ".ai/guardrails/.backup";

/// Diagnose `target_root` against `resolved` and its receipts. Performs no
/// writes: every finding here is safe to surface before deciding whether
/// to repair.
pub fn diagnose(target_root: &Path, resolved: &ResolvedSpec, receipts: &ReceiptStore) -> Result<Report, EngineError> {
    let mut report = Report::new();

    check_component_receipts(target_root, resolved, receipts, &mut report)?;
    check_schema_satisfaction(target_root, resolved, &mut report);
    check_dirty_staging(target_root, &mut report);

    Ok(report)
}

fn check_component_receipts(
    target_root: &Path,
    resolved: &ResolvedSpec,
    receipts: &ReceiptStore,
    report: &mut Report,
) -> Result<(), EngineError> {
    for component in &resolved.components {
        let key = component.component_ref.qualified();
        let Some(receipt) = receipts.get(&key).map_err(to_io_error)? else {
            report.findings.push(Finding::MissingReceipt { component: key });
            continue;
        };

        if receipt.manifest_digest != component.manifest_digest {
            report.findings.push(Finding::Stale { component: key.clone() });
        }

        for file in &receipt.installed_files {
            let path = target_root.join(&file.path);
            if !path.exists() {
                report.findings.push(Finding::Missing {
                    component: key.clone(),
                    path: file.path.clone(),
                });
                continue;
            }
            match sha256_file(&path) {
                Ok(actual) if actual == file.sha256 => {}
                Ok(actual) => report.findings.push(Finding::Drift {
                    component: key.clone(),
                    path: file.path.clone(),
                    expected_sha256: file.sha256.clone(),
                    actual_sha256: actual,
                }),
                Err(_) => report.findings.push(Finding::Missing {
                    component: key.clone(),
                    path: file.path.clone(),
                }),
            }
        }
    }
    Ok(())
}

fn check_schema_satisfaction(target_root: &Path, resolved: &ResolvedSpec, report: &mut Report) {
    for path in resolved.schema.required_paths() {
        if !target_root.join(path).exists() {
            report.findings.push(Finding::SchemaViolation {
                path: path.to_string(),
                detail: "required path is missing from the target tree".to_string(),
            });
        }
    }
}

fn check_dirty_staging(target_root: &Path, report: &mut Report) {
    for root in [STAGING_ROOT, BACKUP_ROOT] {
        let dir = target_root.join(root);
        if dir.exists() {
            if let Ok(entries) = std::fs::read_dir(&dir) {
                for entry in entries.flatten() {
                    report.findings.push(Finding::Dirty {
                        path: entry.path().display().to_string(),
                    });
                }
            }
        }
    }
}

/// Which findings `repair` should act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairPolicy {
    /// Diagnose only; never write. Equivalent to calling [`diagnose`].
    ReportOnly,
    /// Reinstall any component with a missing or drifted file.
    RestoreMissing,
    /// Reinstall any component whose manifest digest has gone stale, in
    /// addition to restoring missing/drifted files.
    ReinstallStale,
}

/// Diagnose, then act according to `policy`. Repair reuses the Planner and
/// Installer so a repaired component goes through the same
/// stage/backup/promote/receipt transaction as a fresh install.
pub fn repair(
    target_root: &Path,
    resolved: &ResolvedSpec,
    receipts: &ReceiptStore,
    vars: &BTreeMap<String, String>,
    policy: RepairPolicy,
) -> Result<Report, EngineError> {
    let mut report = diagnose(target_root, resolved, receipts)?;

    if policy == RepairPolicy::ReportOnly {
        return Ok(report);
    }

    let mut to_reinstall: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
    for finding in &report.findings {
        match finding {
            Finding::Missing { component, .. } | Finding::Drift { component, .. } => {
                to_reinstall.insert(component.clone());
            }
            Finding::Stale { component } if policy == RepairPolicy::ReinstallStale => {
                to_reinstall.insert(component.clone());
            }
            Finding::MissingReceipt { component } => {
                to_reinstall.insert(component.clone());
            }
            _ => {}
        }
    }

    for component in &resolved.components {
        let key = component.component_ref.qualified();
        if !to_reinstall.contains(&key) {
            continue;
        }

        let plan = guardrails_planner::plan(
            &ResolvedSpec {
                components: vec![component.clone()],
                schema: resolved.schema.clone(),
                profiles: resolved.profiles.clone(),
            },
            target_root,
            receipts,
            true,
        )?;

        let execution = guardrails_installer::execute(&plan, target_root, receipts, &resolved.schema, vars, false, true)?;
        if execution.is_success() {
            report.repaired.push(key);
        }
    }

    Ok(report)
}

fn to_io_error(error: impl std::fmt::Display) -> EngineError {
    EngineError::Io {
        path: std::path::PathBuf::new(),
        source: std::io::Error::new(std::io::ErrorKind::Other, error.to_string()),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;
    use guardrails_domain::receipt::{InstalledFile, Receipt};
    use guardrails_resolver::ComponentRef;
    use tempfile::tempdir;

    fn resolved_with_one_component(dir: &Path) -> ResolvedSpec {
        ResolvedSpec {
            components: vec![guardrails_resolver::ResolvedComponent {
                component_ref: ComponentRef {
                    plugin_id: None,
                    name: "core".into(),
                },
                base_dir: dir.to_path_buf(),
                files: vec![],
                target_prefix: None,
                dependencies: vec![],
                install_order: 0,
                required: true,
                post_install: vec![],
                validation: None,
                manifest_digest: "digest-1".into(),
            }],
            schema: Default::default(),
            profiles: vec![],
        }
    }

    #[test]
    fn diagnose_flags_missing_receipt() {
        let target_dir = tempdir().unwrap();
        let resolved = resolved_with_one_component(target_dir.path());
        let receipts = ReceiptStore::new(target_dir.path());

        let report = diagnose(target_dir.path(), &resolved, &receipts).unwrap();
        assert!(report.findings.iter().any(|f| matches!(f, Finding::MissingReceipt { .. })));
    }

    #[test]
    fn diagnose_flags_drifted_file() {
        let target_dir = tempdir().unwrap();
        std::fs::write(target_dir.path().join("a.txt"), "modified").unwrap();

        let resolved = resolved_with_one_component(target_dir.path());
        let receipts = ReceiptStore::new(target_dir.path());
        receipts
            .put(&Receipt {
                component: "core".into(),
                plugin_id: None,
                manifest_digest: "digest-1".into(),
                installed_files: vec![InstalledFile {
                    path: "a.txt".into(),
                    sha256: "0".repeat(64),
                    mode: 0o644,
                    size: 5,
                }],
                source_digests: vec![],
                installed_at: Utc::now(),
                engine_version: "0.1.0".into(),
            })
            .unwrap();

        let report = diagnose(target_dir.path(), &resolved, &receipts).unwrap();
        assert!(report.findings.iter().any(|f| matches!(f, Finding::Drift { .. })));
    }

    #[test]
    fn report_only_policy_never_writes() {
        let target_dir = tempdir().unwrap();
        let resolved = resolved_with_one_component(target_dir.path());
        let receipts = ReceiptStore::new(target_dir.path());

        let report = repair(target_dir.path(), &resolved, &receipts, &BTreeMap::new(), RepairPolicy::ReportOnly).unwrap();
        assert!(report.repaired.is_empty());
    }
}
