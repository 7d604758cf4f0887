//! Core module - Instance registry, process launching and settings

pub mod error;
pub mod instance;
mod launcher;
mod registry;
pub mod settings;

pub use error::{Error, Result};
pub use instance::Instance;
pub use launcher::{DetachedSpawner, LaunchRequest, LaunchedInstance, Launcher, Spawner};
pub use registry::{ConsistencyReport, Registry};
pub use settings::Settings;
