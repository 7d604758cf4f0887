//! Process launching - Starting detached application processes per instance

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::error::{Error, Result};
use super::instance::validate_name;
use super::settings::Settings;
use crate::persistence::InstanceStore;

/// Everything needed to start one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub instance: String,
    pub program: String,
    pub args: Vec<String>,
    /// Variables overridden on top of the inherited environment
    pub env: Vec<(OsString, PathBuf)>,
}

/// Starts processes. Swapped for a recording fake in tests.
pub trait Spawner {
    /// Start the process described by `request` and return its pid without waiting
    fn spawn(&self, request: &LaunchRequest) -> io::Result<u32>;
}

/// Spawns the application in its own session with null stdio
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedSpawner;

impl Spawner for DetachedSpawner {
    fn spawn(&self, request: &LaunchRequest) -> io::Result<u32> {
        debug!(
            "Spawning {} {:?} for instance '{}'",
            request.program, request.args, request.instance
        );
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args);

        for (key, value) in &request.env {
            cmd.env(key, value);
        }

        // Detach from our process group
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            cmd.creation_flags(0x00000008); // DETACHED_PROCESS
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            unsafe {
                cmd.pre_exec(|| {
                    libc::setsid();
                    Ok(())
                });
            }
        }

        // The child handle is dropped on return; nothing waits on it
        let child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(child.id())
    }
}

/// Result of a successful launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchedInstance {
    pub name: String,
    pub pid: u32,
    pub home: PathBuf,
}

/// Launches instances of the managed application
pub struct Launcher {
    store: InstanceStore,
    program: String,
    args: Vec<String>,
    create_missing: bool,
    spawner: Box<dyn Spawner>,
}

impl Launcher {
    pub fn new(settings: &Settings, store: InstanceStore, spawner: impl Spawner + 'static) -> Self {
        Self {
            store,
            program: settings.launch_program.clone(),
            args: settings.get_launch_args(),
            create_missing: settings.create_missing_on_launch,
            spawner: Box::new(spawner),
        }
    }

    /// Start the application with the instance directory as its home
    pub fn launch(&self, name: &str) -> Result<LaunchedInstance> {
        validate_name(name)?;

        let home = self.store.path_of(name);
        if !self.store.exists(name) {
            if !self.create_missing {
                return Err(Error::NotFound(name.to_string()));
            }
            warn!(
                "Instance '{}' has no directory, creating {:?} without registering it",
                name, home
            );
            self.store.create(name)?;
        }

        let request = LaunchRequest {
            instance: name.to_string(),
            program: self.program.clone(),
            args: self.args.clone(),
            env: isolation_env(&home),
        };

        info!("Launching instance '{}'", name);
        let pid = self.spawner.spawn(&request).map_err(|e| {
            error!("Failed to launch instance '{}': {}", name, e);
            Error::Launch {
                name: name.to_string(),
                program: self.program.clone(),
                source: e,
            }
        })?;

        info!("Instance '{}' launched with PID {} and detached", name, pid);
        Ok(LaunchedInstance {
            name: name.to_string(),
            pid,
            home,
        })
    }
}

/// Environment overrides that make `home` the child's home directory
fn isolation_env(home: &Path) -> Vec<(OsString, PathBuf)> {
    #[cfg(windows)]
    {
        vec![
            (OsString::from("USERPROFILE"), home.to_path_buf()),
            (OsString::from("HOME"), home.to_path_buf()),
        ]
    }

    #[cfg(not(windows))]
    {
        vec![(OsString::from("HOME"), home.to_path_buf())]
    }
}
