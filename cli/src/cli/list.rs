use std::path::Path;

use clap::{ArgMatches, Command};
use guardrails_domain::error::EngineError;
use thiserror::Error;

pub fn command() -> Command {
    Command::new("list")
        .about("List components, profiles, or plugins")
        .subcommand_required(true)
        .subcommand(Command::new("available").about("List every component the resolved specification declares"))
        .subcommand(Command::new("installed").about("List components with a current receipt"))
        .subcommand(Command::new("profiles").about("List the profiles declared by the core manifest"))
        .subcommand(Command::new("plugins").about("List the plugins declared by the core manifest"))
}

pub fn handle(args: &ArgMatches, root: &Path) -> Result<(), Error> {
    match args.subcommand() {
        Some(("available", _)) => {
            let resolved = super::load_spec(root)?;
            for component in &resolved.components {
                println!("{}", component.component_ref.qualified());
            }
            Ok(())
        }
        Some(("installed", _)) => {
            let receipts = super::receipt_store(root);
            for receipt in receipts.list()? {
                println!("{} (digest {})", receipt.component, &receipt.manifest_digest[..12.min(receipt.manifest_digest.len())]);
            }
            Ok(())
        }
        Some(("profiles", _)) => {
            let resolved = super::load_spec(root)?;
            for profile in &resolved.profiles {
                println!("{} ({} component(s))", profile.name, profile.components.len());
            }
            Ok(())
        }
        Some(("plugins", _)) => {
            let plugin_sources = super::plugin_sources(root)?;
            for source in &plugin_sources {
                println!("{} ({})", source.id, source.dir.display());
            }
            Ok(())
        }
        _ => unreachable!("clap enforces subcommand_required"),
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Receipts(#[from] guardrails_adapters::receipts::Error),
}
