use std::path::Path;

use clap::{arg, ArgMatches, Command};
use guardrails_domain::error::EngineError;
use thiserror::Error;

pub fn command() -> Command {
    Command::new("uninstall")
        .about("Remove a previously installed component's files, refusing any file that has drifted")
        .arg(arg!(<COMPONENT> ... "qualified component name(s), e.g. core or my-plugin/hooks"))
}

pub fn handle(args: &ArgMatches, root: &Path) -> Result<(), Error> {
    let receipts = super::receipt_store(root);
    let components = args.get_many::<String>("COMPONENT").into_iter().flatten();

    let mut any_refused = false;
    for component in components {
        let refused = guardrails_installer::uninstall(component, root, &receipts)?;
        if refused.is_empty() {
            println!("{component}: removed");
        } else {
            any_refused = true;
            println!("{component}: removed, but kept {} drifted file(s):", refused.len());
            for path in refused {
                println!("  {path}");
            }
        }
    }

    if any_refused {
        return Err(Error::DriftedFilesKept);
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("some installed files had drifted and were left in place")]
    DriftedFilesKept,
}
