//! Withdrawal - isolated home-directory instances for a sandboxed application
//!
//! Each instance is a directory under the instances root that the application
//! receives as its `HOME`, so every instance keeps its own login, settings and
//! caches. The [`core::Registry`] owns instance lifecycle, the
//! [`core::Launcher`] starts detached application processes, and [`cli`] is the
//! command-line front end built on both.

pub mod cli;
pub mod core;
pub mod persistence;

/// Application name constant
pub const APP_NAME: &str = "Withdrawal";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
