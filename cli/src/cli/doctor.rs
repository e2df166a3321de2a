use std::collections::BTreeMap;
use std::path::Path;

use clap::{ArgAction, Arg, ArgMatches, Command};
use guardrails_doctor::RepairPolicy;
use guardrails_domain::error::EngineError;
use thiserror::Error;

pub fn command() -> Command {
    Command::new("doctor")
        .about("Diagnose drift and staleness against the installed receipts, optionally repairing it")
        .arg(
            Arg::new("repair")
                .long("repair")
                .help("Reinstall components with missing or drifted files")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("reinstall-stale")
                .long("reinstall-stale")
                .help("Also reinstall components whose manifest digest has changed")
                .action(ArgAction::SetTrue),
        )
}

pub fn handle(args: &ArgMatches, root: &Path) -> Result<(), Error> {
    let resolved = super::load_spec(root)?;
    let receipts = super::receipt_store(root);

    let policy = if args.get_flag("reinstall-stale") {
        RepairPolicy::ReinstallStale
    } else if args.get_flag("repair") {
        RepairPolicy::RestoreMissing
    } else {
        RepairPolicy::ReportOnly
    };

    let report = guardrails_doctor::repair(root, &resolved, &receipts, &BTreeMap::new(), policy)?;

    for finding in &report.findings {
        println!("{finding:?}");
    }
    for repaired in &report.repaired {
        println!("repaired: {repaired}");
    }

    if !report.is_clean() && report.repaired.is_empty() && policy == RepairPolicy::ReportOnly {
        return Err(Error::Unclean);
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("the installed tree has outstanding findings; rerun with --repair")]
    Unclean,
}
