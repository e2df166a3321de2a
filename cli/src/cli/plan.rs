use std::path::Path;

use clap::{ArgMatches, Command};
use guardrails_domain::error::EngineError;
use thiserror::Error;

pub fn command() -> Command {
    super::with_selection_args(
        Command::new("plan").about("Compute the install plan and print it as JSON, without writing anything"),
    )
}

pub fn handle(args: &ArgMatches, root: &Path, force: bool) -> Result<(), Error> {
    let resolved = super::load_spec(root)?;
    let resolved = super::selected_spec(args, resolved)?;
    let receipts = super::receipt_store(root);
    let plan = guardrails_planner::plan(&resolved, root, &receipts, force)?;

    println!("{}", plan.canonical_json()?);
    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Selection(#[from] super::SelectionError),

    #[error("failed to serialize the plan: {0}")]
    Serialize(#[from] serde_json::Error),
}
