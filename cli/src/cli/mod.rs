use std::path::{Path, PathBuf};

use clap::{Arg, ArgAction, ArgMatches, Command};
use guardrails_domain::error::EngineError;
use guardrails_resolver::ResolvedSpec;
use thiserror::Error;

mod doctor;
mod install;
mod list;
mod plan;
mod uninstall;

const MANIFEST_RELATIVE: &str = ".ai/guardrails/manifest.yaml";
const PLUGINS_RELATIVE: &str = ".ai/guardrails/plugins";

fn command() -> Command {
    Command::new("guardctl")
        .about("Idempotent, transactional configuration installer")
        .arg(
            Arg::new("root")
                .short('r')
                .long("root")
                .global(true)
                .help("Target repository root")
                .action(ArgAction::Set)
                .default_value("."),
        )
        .arg(
            Arg::new("yes")
                .short('y')
                .long("yes")
                .global(true)
                .help("Assume yes for all confirmations")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("force")
                .long("force")
                .global(true)
                .help("Reinstall components even if their manifest digest is unchanged")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .global(true)
                .help("Compute the plan and report it without writing")
                .action(ArgAction::SetTrue),
        )
        .subcommand_required(true)
        .subcommand(plan::command())
        .subcommand(install::command())
        .subcommand(uninstall::command())
        .subcommand(list::command())
        .subcommand(doctor::command())
}

/// Process all CLI arguments.
pub fn process() -> Result<(), Error> {
    let matches = command().get_matches();
    let root = PathBuf::from(matches.get_one::<String>("root").expect("has default"));
    let force = matches.get_flag("force");
    let dry_run = matches.get_flag("dry-run");

    match matches.subcommand() {
        Some(("plan", args)) => plan::handle(args, &root, force).map_err(Error::Plan),
        Some(("install", args)) => install::handle(args, &root, force, dry_run).map_err(Error::Install),
        Some(("uninstall", args)) => uninstall::handle(args, &root).map_err(Error::Uninstall),
        Some(("list", args)) => list::handle(args, &root).map_err(Error::List),
        Some(("doctor", args)) => doctor::handle(args, &root).map_err(Error::Doctor),
        _ => unreachable!("clap enforces subcommand_required"),
    }
}

/// Build the dependency-ordered, schema-composed specification for `root`.
/// Shared by every subcommand that needs more than the raw manifest.
fn load_spec(root: &Path) -> Result<ResolvedSpec, EngineError> {
    let manifest_path = root.join(MANIFEST_RELATIVE);
    let plugins_base = root.join(PLUGINS_RELATIVE);
    let plugin_sources = guardrails_resolver::plugin_sources(&manifest_path, &plugins_base)?;
    guardrails_resolver::load_manifests(&manifest_path, &plugin_sources, None)
}

fn receipt_store(root: &Path) -> guardrails_adapters::ReceiptStore {
    guardrails_adapters::ReceiptStore::new(root)
}

/// The plugins declared by the core manifest at `root`, for `guardctl list plugins`.
fn plugin_sources(root: &Path) -> Result<Vec<guardrails_resolver::PluginSource>, EngineError> {
    let manifest_path = root.join(MANIFEST_RELATIVE);
    let plugins_base = root.join(PLUGINS_RELATIVE);
    guardrails_resolver::plugin_sources(&manifest_path, &plugins_base)
}

/// Add the `--profile`/`--component` selectors shared by `plan` and
/// `install`. Mutually exclusive: a caller giving both gets `--component`
/// (checked in `selected_spec`).
fn with_selection_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("profile")
            .long("profile")
            .help("Only the named profile's components")
            .action(ArgAction::Set),
    )
    .arg(
        Arg::new("component")
            .long("component")
            .help("Only this component (qualified name, e.g. core or my-plugin/hooks); repeatable")
            .action(ArgAction::Append),
    )
}

/// Narrow `resolved` down to the components named by `--profile` or
/// `--component`, or return it unchanged if neither was given.
fn selected_spec(args: &ArgMatches, resolved: ResolvedSpec) -> Result<ResolvedSpec, SelectionError> {
    let components: Option<Vec<&String>> = args.get_many::<String>("component").map(|v| v.collect());
    let profile = args.get_one::<String>("profile");

    let chosen = if let Some(names) = components {
        names
            .into_iter()
            .map(|name| {
                resolved
                    .component(&component_ref_for(name))
                    .cloned()
                    .ok_or_else(|| SelectionError::UnknownComponent(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?
    } else if let Some(profile_name) = profile {
        resolved
            .profile_components(profile_name)
            .ok_or_else(|| SelectionError::UnknownProfile(profile_name.clone()))?
            .into_iter()
            .cloned()
            .collect()
    } else {
        return Ok(resolved);
    };

    Ok(ResolvedSpec {
        components: chosen,
        schema: resolved.schema,
        profiles: resolved.profiles,
    })
}

/// Parse a qualified component name (`"name"` or `"plugin_id/name"`) into a
/// `ComponentRef` for lookup against a resolved spec.
fn component_ref_for(qualified: &str) -> guardrails_resolver::ComponentRef {
    match qualified.split_once('/') {
        Some((plugin_id, name)) => guardrails_resolver::ComponentRef {
            plugin_id: Some(plugin_id.to_string()),
            name: name.to_string(),
        },
        None => guardrails_resolver::ComponentRef {
            plugin_id: None,
            name: qualified.to_string(),
        },
    }
}

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("no component named {0:?} in the resolved specification")]
    UnknownComponent(String),

    #[error("no profile named {0:?} in the core manifest")]
    UnknownProfile(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("plan: {0}")]
    Plan(#[from] plan::Error),

    #[error("install: {0}")]
    Install(#[from] install::Error),

    #[error("uninstall: {0}")]
    Uninstall(#[from] uninstall::Error),

    #[error("list: {0}")]
    List(#[from] list::Error),

    #[error("doctor: {0}")]
    Doctor(#[from] doctor::Error),
}

pub(crate) fn print_engine_error(error: &EngineError) {
    let report: guardrails_domain::error::ErrorReport = error.into();
    match serde_json::to_string_pretty(&report) {
        Ok(text) => eprintln!("{text}"),
        Err(_) => eprintln!("{error}"),
    }
}
