//! Instance directories - one directory per instance under the instances root

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::error::{Error, Result};
use crate::core::instance::validate_name;

/// Maps instance names to directories on disk
#[derive(Debug, Clone)]
pub struct InstanceStore {
    root: PathBuf,
    /// Location of the application config inside an instance home
    config_relative_path: PathBuf,
}

impl InstanceStore {
    pub fn new(root: impl Into<PathBuf>, config_relative_path: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config_relative_path: config_relative_path.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of the instance called `name`
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Config file location inside the instance called `name`
    pub fn config_path_of(&self, name: &str) -> PathBuf {
        self.path_of(name).join(&self.config_relative_path)
    }

    /// Create the instances root if it does not exist yet
    pub fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| Error::storage("create", &self.root, e))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_of(name).exists()
    }

    pub fn has_config(&self, name: &str) -> bool {
        self.config_path_of(name).is_file()
    }

    /// Create the directory for `name`; anything already at that path is an error
    pub fn create(&self, name: &str) -> Result<()> {
        let path = self.path_of(name);
        if path.exists() {
            return Err(Error::AlreadyExists(name.to_string()));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::storage("create", parent, e))?;
        }
        match fs::create_dir(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::AlreadyExists(name.to_string()))
            }
            Err(e) => return Err(Error::storage("create", &path, e)),
        }
        debug!("Created instance directory {:?}", path);
        Ok(())
    }

    /// Recursively delete the directory for `name`; absent is fine
    pub fn remove(&self, name: &str) -> Result<()> {
        let path = self.path_of(name);
        match fs::remove_dir_all(&path) {
            Ok(()) => {
                debug!("Removed instance directory {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage("remove", &path, e)),
        }
    }

    /// Rename the directory for `name` to `new_name`
    pub fn rename(&self, name: &str, new_name: &str) -> Result<()> {
        let from = self.path_of(name);
        let to = self.path_of(new_name);
        if to.exists() {
            return Err(Error::AlreadyExists(new_name.to_string()));
        }
        if !from.exists() {
            return Err(Error::NotFound(name.to_string()));
        }
        fs::rename(&from, &to).map_err(|e| Error::storage("rename", &from, e))?;
        debug!("Renamed instance directory {:?} to {:?}", from, to);
        Ok(())
    }

    /// Copy `source` verbatim to the config path of `name`.
    ///
    /// Returns the destination path.
    pub fn copy_config_in(&self, name: &str, source: &Path) -> Result<PathBuf> {
        if !source.is_file() {
            return Err(Error::SourceNotFound(source.to_path_buf()));
        }

        let destination = self.config_path_of(name);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::storage("create", parent, e))?;
        }
        fs::copy(source, &destination).map_err(|e| match e.kind() {
            ErrorKind::NotFound if !source.exists() => Error::SourceNotFound(source.to_path_buf()),
            _ => Error::storage("copy config to", &destination, e),
        })?;

        debug!("Copied {:?} to {:?}", source, destination);
        Ok(destination)
    }

    /// Names of all instance directories, sorted. Entries that could never be an
    /// instance name are skipped.
    pub fn directory_names(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.root).map_err(|e| Error::storage("read", &self.root, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::storage("read", &self.root, e))?;
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                if validate_name(&name).is_ok() {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
