use std::collections::BTreeMap;
use std::path::Path;

use clap::{ArgMatches, Command};
use guardrails_domain::error::EngineError;
use thiserror::Error;

pub fn command() -> Command {
    super::with_selection_args(
        Command::new("install").about("Plan and execute the transactional install for the selected components"),
    )
}

pub fn handle(args: &ArgMatches, root: &Path, force: bool, dry_run: bool) -> Result<(), Error> {
    let resolved = super::load_spec(root)?;
    let resolved = super::selected_spec(args, resolved)?;
    let receipts = super::receipt_store(root);
    let plan = guardrails_planner::plan(&resolved, root, &receipts, force)?;

    let vars = BTreeMap::new();
    let report = guardrails_installer::execute(&plan, root, &receipts, &resolved.schema, &vars, dry_run, force)?;

    for result in &report.results {
        println!(
            "{:<24} {:?} ({} file(s))",
            result.component, result.outcome, result.files_written
        );
        if let Some(error) = &result.error {
            eprintln!("  {} — {}", error.kind, error.remediation);
        }
    }

    if !report.is_success() {
        return Err(Error::Incomplete);
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Selection(#[from] super::SelectionError),

    #[error("one or more components failed to install; see the report above")]
    Incomplete,
}
