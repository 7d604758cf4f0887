//! Withdrawal - Run isolated instances of a sandboxed application
//!
//! Every instance gets its own home directory, so several accounts or setups of
//! the same application can live side by side.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::Confirm;
use single_instance::SingleInstance;
use thiserror::Error;
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use withdrawal::cli::{self, Cli};
use withdrawal::core::{DetachedSpawner, Launcher, Registry, Settings};
use withdrawal::{APP_NAME, APP_VERSION};

/// Failures before a command reaches the registry
#[derive(Debug, Error)]
enum StartupError {
    #[error("{0:#}")]
    Settings(anyhow::Error),

    #[error("Another withdrawal process is changing instances in {}; try again once it finishes", .0.display())]
    Busy(PathBuf),

    #[error("{0:#}")]
    Lock(anyhow::Error),
}

impl StartupError {
    fn kind(&self) -> &'static str {
        match self {
            Self::Settings(_) => "settings",
            Self::Busy(_) => "busy",
            Self::Lock(_) => "lock",
        }
    }

    fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Settings(_) => Some("Fix the settings file or point --config at another one."),
            _ => None,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let as_json = cli.json;

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            let output = cli::render_failure(e.kind(), &e.to_string(), e.hint(), as_json);
            if as_json {
                println!("{}", output);
            } else {
                eprintln!("{}", output);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> std::result::Result<ExitCode, StartupError> {
    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            // Settings decide the log level; fall back to the default one
            init_logging(false);
            return Err(StartupError::Settings(e));
        }
    };

    // Initialize logging
    init_logging(settings.debug_logging);
    debug!("{} v{} starting...", APP_NAME, APP_VERSION);

    let registry = match Registry::new(&settings) {
        Ok(registry) => registry,
        Err(e) => return Ok(report(&Err(e), cli.json)),
    };

    // Only one process may rewrite a given instance list at a time
    let _guard = if cli.command.is_mutating() {
        let guard = mutation_guard(registry.root()).map_err(StartupError::Lock)?;
        if !guard.is_single() {
            return Err(StartupError::Busy(registry.root().to_path_buf()));
        }
        Some(guard)
    } else {
        None
    };

    let launcher = Launcher::new(&settings, registry.store().clone(), DetachedSpawner);
    let result = cli::execute(&cli.command, &registry, &launcher, &confirm);
    Ok(report(&result, cli.json))
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => Settings::default_path(),
    };

    let mut settings = match path {
        Some(path) => Settings::load(&path)?,
        None => Settings::default(),
    };
    if let Some(dir) = &cli.instances_dir {
        settings.instances_directory = Some(dir.clone());
    }
    Ok(settings)
}

/// Initialize the logging system
fn init_logging(debug_logging: bool) {
    let default = if debug_logging {
        "withdrawal=debug"
    } else {
        "withdrawal=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Cross-process lock named after the instances root
fn mutation_guard(root: &Path) -> Result<SingleInstance> {
    let mut hasher = DefaultHasher::new();
    root.hash(&mut hasher);
    let name = format!("withdrawal-{:016x}", hasher.finish());

    // The macOS implementation locks a file at the given path
    let name = if cfg!(target_os = "macos") {
        std::env::temp_dir().join(name).display().to_string()
    } else {
        name
    };

    SingleInstance::new(&name).context("Failed to create instance lock")
}

fn confirm(prompt: &str) -> bool {
    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .unwrap_or(false)
}

fn report(result: &withdrawal::core::Result<cli::Outcome>, as_json: bool) -> ExitCode {
    let (output, ok) = cli::render(result, as_json);
    if ok || as_json {
        println!("{}", output);
    } else {
        eprintln!("{}", output);
    }

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
