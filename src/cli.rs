//! Command-line front end - turns commands into registry calls and renders results

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use crate::core::{ConsistencyReport, Error, Instance, LaunchedInstance, Launcher, Registry, Result};

#[derive(Parser, Debug)]
#[command(
    name = "withdrawal",
    version,
    about = "Create, manage and launch isolated instances of a sandboxed application"
)]
pub struct Cli {
    /// Settings file [default: <config dir>/Withdrawal/settings.json]
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Directory that holds the instances
    #[arg(long, global = true, env = "WITHDRAWAL_INSTANCES_DIR")]
    pub instances_dir: Option<PathBuf>,
    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List instances in the order they were added
    List,
    /// Create a new instance
    Add { name: String },
    /// Rename an instance
    Rename { old: String, new: String },
    /// Delete an instance and everything stored in it
    Delete {
        name: String,
        /// Do not ask for confirmation
        #[arg(long, short)]
        yes: bool,
    },
    /// Copy the application config into an instance
    Import {
        name: String,
        /// Config file to copy instead of the one in your home directory
        #[arg(long)]
        from: Option<PathBuf>,
    },
    /// Launch the application inside an instance
    Run { name: String },
    /// Show where an instance lives
    Show { name: String },
    /// Compare the instance list with the instance directories
    Check,
}

impl Commands {
    /// Whether the command can change the instance list or directories
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::List | Self::Show { .. } | Self::Check)
    }
}

/// What a successful command produced
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Names(Vec<String>),
    Added(String),
    Renamed { old: String, new: String },
    Deleted(String),
    Cancelled(String),
    Imported { name: String, path: PathBuf },
    Launched(LaunchedInstance),
    Instance(Instance),
    Report(ConsistencyReport),
}

/// Run `command` against the registry and launcher.
///
/// `confirm` is asked before destructive commands that were not pre-approved.
pub fn execute(
    command: &Commands,
    registry: &Registry,
    launcher: &Launcher,
    confirm: &dyn Fn(&str) -> bool,
) -> Result<Outcome> {
    match command {
        Commands::List => registry.list().map(Outcome::Names),
        Commands::Add { name } => {
            let name = name.trim();
            registry.add(name)?;
            Ok(Outcome::Added(name.to_string()))
        }
        Commands::Rename { old, new } => {
            let (old, new) = (old.trim(), new.trim());
            registry.rename(old, new)?;
            Ok(Outcome::Renamed {
                old: old.to_string(),
                new: new.to_string(),
            })
        }
        Commands::Delete { name, yes } => {
            let name = name.trim();
            if !*yes && !confirm(&format!("Delete instance '{}'?", name)) {
                return Ok(Outcome::Cancelled(name.to_string()));
            }
            registry.delete(name)?;
            Ok(Outcome::Deleted(name.to_string()))
        }
        Commands::Import { name, from } => {
            let name = name.trim();
            let path = match from {
                Some(source) => registry.import_config_from(name, source)?,
                None => registry.import_config(name)?,
            };
            Ok(Outcome::Imported {
                name: name.to_string(),
                path,
            })
        }
        Commands::Run { name } => launcher.launch(name.trim()).map(Outcome::Launched),
        Commands::Show { name } => registry.instance(name.trim()).map(Outcome::Instance),
        Commands::Check => registry.check().map(Outcome::Report),
    }
}

impl Outcome {
    /// Human-readable rendering
    pub fn render_text(&self) -> String {
        match self {
            Self::Names(names) if names.is_empty() => {
                "No instances yet. Create one with `withdrawal add <name>`.".to_string()
            }
            Self::Names(names) => names.join("\n"),
            Self::Added(name) => format!("Created instance '{}'.", name),
            Self::Renamed { old, new } => format!("Renamed instance '{}' to '{}'.", old, new),
            Self::Deleted(name) => format!("Deleted instance '{}'.", name),
            Self::Cancelled(name) => format!("Kept instance '{}'.", name),
            Self::Imported { name, path } => format!(
                "Settings imported successfully for '{}' ({}).",
                name,
                path.display()
            ),
            Self::Launched(launched) => format!(
                "Launched instance '{}' (PID {}).",
                launched.name, launched.pid
            ),
            Self::Instance(instance) => format!(
                "{}\n  home:   {}\n  config: {}",
                instance.name,
                instance.root.display(),
                if instance.has_config { "imported" } else { "none" }
            ),
            Self::Report(report) if report.is_consistent() => {
                "Instance list and directories agree.".to_string()
            }
            Self::Report(report) => {
                let mut lines = Vec::new();
                for name in &report.unlisted {
                    lines.push(format!("directory without list entry: {}", name));
                }
                for name in &report.missing {
                    lines.push(format!("list entry without directory: {}", name));
                }
                lines.join("\n")
            }
        }
    }

    /// Result payload for `--json`
    pub fn to_json(&self) -> Value {
        match self {
            Self::Names(names) => json!({ "instances": names }),
            Self::Added(name) => json!({ "added": name }),
            Self::Renamed { old, new } => json!({ "renamed": { "from": old, "to": new } }),
            Self::Deleted(name) => json!({ "deleted": name }),
            Self::Cancelled(name) => json!({ "cancelled": name }),
            Self::Imported { name, path } => json!({ "imported": name, "path": path }),
            Self::Launched(launched) => json!({ "launched": launched }),
            Self::Instance(instance) => json!({ "instance": instance }),
            Self::Report(report) => json!({
                "consistent": report.is_consistent(),
                "unlisted": report.unlisted,
                "missing": report.missing,
            }),
        }
    }
}

/// Advice shown after errors the user has to resolve by hand
pub fn error_hint(err: &Error) -> Option<&'static str> {
    match err {
        Error::PartialFailure { .. } => {
            Some("Run `withdrawal check` to see what needs reconciling, then retry.")
        }
        Error::CorruptList { .. } => {
            Some("The instance list was left untouched. Fix or remove it by hand.")
        }
        Error::Launch { .. } => Some("Check that the application is installed."),
        _ => None,
    }
}

/// Render a result for stdout and pick the exit status
pub fn render(result: &Result<Outcome>, as_json: bool) -> (String, bool) {
    match (result, as_json) {
        (Ok(outcome), false) => (outcome.render_text(), true),
        (Ok(outcome), true) => (json!({ "ok": true, "result": outcome.to_json() }).to_string(), true),
        (Err(err), _) => (
            render_failure(err.kind(), &err.to_string(), error_hint(err), as_json),
            false,
        ),
    }
}

/// Render a failure, including ones raised before any instance operation ran
pub fn render_failure(kind: &str, message: &str, hint: Option<&str>, as_json: bool) -> String {
    if as_json {
        return json!({
            "ok": false,
            "error": { "kind": kind, "message": message },
        })
        .to_string();
    }

    let mut text = format!("error: {}", message);
    if let Some(hint) = hint {
        text.push_str("\nhint: ");
        text.push_str(hint);
    }
    text
}
