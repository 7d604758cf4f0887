//! Instance registry - keeps the instance list and the instance directories in step

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{info, warn};

use super::error::{Error, Result};
use super::instance::{validate_name, Instance};
use super::settings::Settings;
use crate::persistence::{InstanceStore, ListStore};

/// Differences between the instance list and the instance directories
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    /// Directories that have no entry in the list
    pub unlisted: Vec<String>,
    /// List entries that have no directory
    pub missing: Vec<String>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.unlisted.is_empty() && self.missing.is_empty()
    }
}

/// Owner of the instance lifecycle.
///
/// Every mutation runs load-mutate-save under one lock so two callers in the same
/// process cannot interleave writes to the list file.
pub struct Registry {
    store: InstanceStore,
    list: ListStore,
    /// Shared application config imported by [`Registry::import_config`]
    source_config: PathBuf,
    lock: Mutex<()>,
}

impl Registry {
    /// Open the registry described by `settings`, creating the instances root.
    ///
    /// A relative instances directory is resolved against the current directory,
    /// since instance roots are handed to child processes as `HOME`.
    pub fn new(settings: &Settings) -> Result<Self> {
        let configured = settings.get_instances_directory();
        let root = std::path::absolute(&configured)
            .map_err(|e| Error::storage("resolve", &configured, e))?;
        let store = InstanceStore::new(&root, settings.config_relative_path());
        store.ensure_root()?;

        info!("Instance registry opened at {:?}", root);
        Ok(Self {
            list: ListStore::new(&root),
            store,
            source_config: settings.source_config_path(),
            lock: Mutex::new(()),
        })
    }

    pub fn store(&self) -> &InstanceStore {
        &self.store
    }

    pub fn root(&self) -> &Path {
        self.store.root()
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Instance names in display order
    pub fn list(&self) -> Result<Vec<String>> {
        let _guard = self.guard();
        self.list.load()
    }

    /// Create a new instance
    pub fn add(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let _guard = self.guard();

        let mut names = self.list.load()?;
        self.store.create(name)?;

        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
        self.list
            .save(&names)
            .map_err(|e| partial_failure(name, "created", e))?;

        info!("Created instance '{}'", name);
        Ok(())
    }

    /// Rename an instance, keeping its position in the list
    pub fn rename(&self, old_name: &str, new_name: &str) -> Result<()> {
        validate_name(old_name)?;
        validate_name(new_name)?;
        let _guard = self.guard();

        let mut names = self.list.load()?;
        self.store.rename(old_name, new_name)?;

        names.retain(|n| n != new_name);
        match names.iter().position(|n| n == old_name) {
            Some(idx) => names[idx] = new_name.to_string(),
            None => {
                warn!("Instance '{}' was not in the instance list", old_name);
                names.push(new_name.to_string());
            }
        }
        self.list
            .save(&names)
            .map_err(|e| partial_failure(new_name, "renamed", e))?;

        info!("Renamed instance '{}' to '{}'", old_name, new_name);
        Ok(())
    }

    /// Delete an instance and everything in its directory.
    ///
    /// Deleting an instance whose directory is already gone only drops a stale
    /// list entry, if there is one.
    pub fn delete(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let _guard = self.guard();

        let mut names = self.list.load()?;
        let listed = names.iter().any(|n| n == name);

        if !self.store.exists(name) {
            if listed {
                names.retain(|n| n != name);
                self.list.save(&names)?;
                info!("Dropped stale list entry for instance '{}'", name);
            }
            return Ok(());
        }

        // Whatever remove_dir_all already deleted is gone, so any failure here
        // leaves the directory half removed
        self.store
            .remove(name)
            .map_err(|e| partial_failure(name, "partially removed", e))?;
        if listed {
            names.retain(|n| n != name);
            self.list
                .save(&names)
                .map_err(|e| partial_failure(name, "deleted", e))?;
        }

        info!("Deleted instance '{}'", name);
        Ok(())
    }

    /// Copy the shared application config into an instance
    pub fn import_config(&self, name: &str) -> Result<PathBuf> {
        self.import_config_from(name, &self.source_config)
    }

    /// Copy `source` into an instance as its application config
    pub fn import_config_from(&self, name: &str, source: &Path) -> Result<PathBuf> {
        validate_name(name)?;
        let _guard = self.guard();

        if !source.is_file() {
            warn!("Source config file not found: {:?}", source);
            return Err(Error::SourceNotFound(source.to_path_buf()));
        }
        if !self.store.exists(name) {
            return Err(Error::NotFound(name.to_string()));
        }

        let destination = self.store.copy_config_in(name, source)?;
        info!(
            "Imported settings for instance '{}' from {:?} to {:?}",
            name, source, destination
        );
        Ok(destination)
    }

    /// Look up a single instance
    pub fn instance(&self, name: &str) -> Result<Instance> {
        validate_name(name)?;
        if !self.store.exists(name) {
            return Err(Error::NotFound(name.to_string()));
        }
        Ok(Instance {
            name: name.to_string(),
            root: self.store.path_of(name),
            has_config: self.store.has_config(name),
        })
    }

    /// Compare the list with the directories on disk. Nothing is repaired.
    pub fn check(&self) -> Result<ConsistencyReport> {
        let _guard = self.guard();
        let names = self.list.load()?;
        let dirs = self.store.directory_names()?;

        let report = ConsistencyReport {
            unlisted: dirs.iter().filter(|d| !names.contains(d)).cloned().collect(),
            missing: names.iter().filter(|n| !dirs.contains(n)).cloned().collect(),
        };
        if !report.is_consistent() {
            warn!(
                "Instance list and directories disagree: unlisted {:?}, missing {:?}",
                report.unlisted, report.missing
            );
        }
        Ok(report)
    }
}

fn partial_failure(name: &str, action: &'static str, source: Error) -> Error {
    warn!("Instance '{}' was {} but the list was not saved: {}", name, action, source);
    Error::PartialFailure {
        name: name.to_string(),
        action,
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instance::{LIST_FILE_NAME, LIST_TEMP_FILE_NAME};
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn settings(home: &Path) -> Settings {
        Settings {
            user_home: Some(home.to_path_buf()),
            ..Default::default()
        }
    }

    fn registry() -> (TempDir, Registry) {
        let home = tempdir().unwrap();
        let registry = Registry::new(&settings(home.path())).unwrap();
        (home, registry)
    }

    /// Makes every list save fail by occupying the scratch file path
    fn break_list_saves(registry: &Registry) {
        fs::create_dir(registry.root().join(LIST_TEMP_FILE_NAME)).unwrap();
    }

    #[test]
    fn opening_creates_the_instances_root() {
        let home = tempdir().unwrap();
        let root = home.path().join("Withdrawal").join("Instances");
        assert!(!root.exists());

        let registry = Registry::new(&settings(home.path())).unwrap();
        assert!(root.is_dir());
        assert_eq!(registry.root(), root);
        assert!(registry.list().unwrap().is_empty());
    }

    #[test]
    fn add_keeps_insertion_order() {
        let (_home, registry) = registry();
        registry.add("zulu").unwrap();
        registry.add("alpha").unwrap();

        assert_eq!(registry.list().unwrap(), vec!["zulu", "alpha"]);
        assert!(registry.store().exists("zulu"));
        assert!(registry.check().unwrap().is_consistent());
    }

    #[test]
    fn adding_twice_fails_without_changes() {
        let (_home, registry) = registry();
        registry.add("alpha").unwrap();
        fs::write(registry.store().path_of("alpha").join("marker"), b"1").unwrap();

        let err = registry.add("alpha").unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(ref n) if n == "alpha"));
        assert_eq!(registry.list().unwrap(), vec!["alpha"]);
        assert!(registry.store().path_of("alpha").join("marker").exists());
    }

    #[test]
    fn add_rejects_invalid_names_before_touching_disk() {
        let (_home, registry) = registry();
        for name in ["", "..", "a/b", LIST_FILE_NAME] {
            assert!(matches!(registry.add(name), Err(Error::InvalidName { .. })));
        }
        assert!(registry.list().unwrap().is_empty());
        assert!(registry.store().directory_names().unwrap().is_empty());
    }

    #[test]
    fn rename_replaces_in_place() {
        let (_home, registry) = registry();
        registry.add("alpha").unwrap();
        registry.add("beta").unwrap();

        registry.rename("alpha", "gamma").unwrap();

        assert_eq!(registry.list().unwrap(), vec!["gamma", "beta"]);
        assert!(!registry.store().exists("alpha"));
        assert!(registry.store().exists("gamma"));
    }

    #[test]
    fn rename_there_and_back_restores_everything() {
        let (_home, registry) = registry();
        for name in ["one", "two", "three"] {
            registry.add(name).unwrap();
        }
        fs::write(registry.store().path_of("two").join("data"), b"kept").unwrap();

        registry.rename("two", "deux").unwrap();
        registry.rename("deux", "two").unwrap();

        assert_eq!(registry.list().unwrap(), vec!["one", "two", "three"]);
        assert_eq!(fs::read(registry.store().path_of("two").join("data")).unwrap(), b"kept");
        assert!(registry.check().unwrap().is_consistent());
    }

    #[test]
    fn rename_onto_existing_or_from_missing_fails() {
        let (_home, registry) = registry();
        registry.add("alpha").unwrap();
        registry.add("beta").unwrap();

        assert!(matches!(registry.rename("alpha", "beta"), Err(Error::AlreadyExists(_))));
        assert!(matches!(registry.rename("ghost", "gamma"), Err(Error::NotFound(_))));
        assert_eq!(registry.list().unwrap(), vec!["alpha", "beta"]);
    }

    #[test]
    fn rename_of_an_unlisted_directory_registers_it() {
        let (_home, registry) = registry();
        registry.add("alpha").unwrap();
        fs::create_dir(registry.root().join("stray")).unwrap();

        registry.rename("stray", "found").unwrap();
        assert_eq!(registry.list().unwrap(), vec!["alpha", "found"]);
    }

    #[test]
    fn delete_removes_directory_and_entry() {
        let (_home, registry) = registry();
        registry.add("alpha").unwrap();
        registry.add("beta").unwrap();
        fs::create_dir_all(registry.store().path_of("alpha").join("deep/tree")).unwrap();

        registry.delete("alpha").unwrap();

        assert_eq!(registry.list().unwrap(), vec!["beta"]);
        assert!(!registry.store().exists("alpha"));
    }

    #[test]
    fn deleting_a_missing_instance_is_a_no_op() {
        let (_home, registry) = registry();
        registry.add("alpha").unwrap();

        registry.delete("ghost").unwrap();
        assert_eq!(registry.list().unwrap(), vec!["alpha"]);
    }

    #[test]
    fn deleting_drops_stale_entries() {
        let (_home, registry) = registry();
        registry.add("alpha").unwrap();
        registry.add("beta").unwrap();
        fs::remove_dir_all(registry.store().path_of("alpha")).unwrap();

        registry.delete("alpha").unwrap();
        assert_eq!(registry.list().unwrap(), vec!["beta"]);
    }

    #[cfg(unix)]
    #[test]
    fn failed_removal_is_a_partial_failure() {
        let (_home, registry) = registry();
        registry.add("beta").unwrap();
        fs::write(registry.root().join(LIST_FILE_NAME), r#"["alpha","beta"]"#).unwrap();
        // A plain file where the instance directory should be cannot be removed as a tree
        fs::write(registry.root().join("alpha"), b"not a directory").unwrap();

        let err = registry.delete("alpha").unwrap_err();
        assert!(matches!(
            err,
            Error::PartialFailure { ref name, action: "partially removed", .. } if name == "alpha"
        ));
        assert!(err.to_string().contains("partially removed"));
        assert_eq!(registry.list().unwrap(), vec!["alpha", "beta"]);
    }

    #[test]
    fn relative_instances_directory_is_made_absolute() {
        let scratch = tempfile::Builder::new()
            .prefix("withdrawal-relative")
            .tempdir_in(".")
            .unwrap();
        let relative = PathBuf::from(scratch.path().file_name().unwrap());
        assert!(relative.is_relative());

        let registry = Registry::new(&Settings {
            instances_directory: Some(relative.clone()),
            ..Default::default()
        })
        .unwrap();

        assert!(registry.root().is_absolute());
        assert_eq!(registry.root(), std::env::current_dir().unwrap().join(&relative));
        registry.add("alpha").unwrap();
        assert!(registry.instance("alpha").unwrap().root.is_absolute());
        assert!(scratch.path().join("alpha").is_dir());
    }

    #[test]
    fn corrupt_list_blocks_mutations() {
        let (_home, registry) = registry();
        fs::write(registry.root().join(LIST_FILE_NAME), "['alpha'").unwrap();

        assert!(matches!(registry.list(), Err(Error::CorruptList { .. })));
        assert!(matches!(registry.add("beta"), Err(Error::CorruptList { .. })));
        assert!(!registry.store().exists("beta"));
        assert_eq!(
            fs::read_to_string(registry.root().join(LIST_FILE_NAME)).unwrap(),
            "['alpha'"
        );
    }

    #[test]
    fn failed_list_save_after_create_is_a_partial_failure() {
        let (_home, registry) = registry();
        break_list_saves(&registry);

        let err = registry.add("alpha").unwrap_err();
        assert!(matches!(err, Error::PartialFailure { ref name, action: "created", .. } if name == "alpha"));
        assert!(registry.store().exists("alpha"));

        let report = registry.check().unwrap();
        assert_eq!(report.unlisted, vec!["alpha"]);
        assert!(report.missing.is_empty());
    }

    #[test]
    fn failed_list_save_after_rename_is_a_partial_failure() {
        let (_home, registry) = registry();
        registry.add("alpha").unwrap();
        break_list_saves(&registry);

        let err = registry.rename("alpha", "beta").unwrap_err();
        assert_eq!(err.kind(), "partial_failure");
        assert!(registry.store().exists("beta"));
        assert_eq!(registry.list().unwrap(), vec!["alpha"]);

        let report = registry.check().unwrap();
        assert_eq!(report.unlisted, vec!["beta"]);
        assert_eq!(report.missing, vec!["alpha"]);
    }

    #[test]
    fn import_without_source_creates_nothing() {
        let (_home, registry) = registry();
        registry.add("alpha").unwrap();

        let err = registry.import_config("alpha").unwrap_err();
        assert!(matches!(err, Error::SourceNotFound(_)));
        assert!(!registry.store().config_path_of("alpha").exists());
        assert!(!registry.store().path_of("alpha").join(".var").exists());
    }

    #[test]
    fn import_copies_the_shared_config() {
        let home = tempdir().unwrap();
        let settings = settings(home.path());
        let registry = Registry::new(&settings).unwrap();
        registry.add("alpha").unwrap();

        let source = settings.source_config_path();
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, b"{\"fflags\":{}}").unwrap();

        let destination = registry.import_config("alpha").unwrap();
        assert_eq!(
            destination,
            registry
                .root()
                .join("alpha/.var/app/org.vinegarhq.Sober/config/sober/config.json")
        );
        assert_eq!(fs::read(&destination).unwrap(), b"{\"fflags\":{}}");
        assert!(registry.instance("alpha").unwrap().has_config);
        assert_eq!(registry.list().unwrap(), vec!["alpha"]);
    }

    #[test]
    fn import_into_missing_instance_fails() {
        let (home, registry) = registry();
        let source = home.path().join("custom.json");
        fs::write(&source, b"{}").unwrap();

        assert!(matches!(
            registry.import_config_from("ghost", &source),
            Err(Error::NotFound(_))
        ));
        assert!(!registry.store().exists("ghost"));
    }

    #[test]
    fn instance_view_reports_root() {
        let (_home, registry) = registry();
        registry.add("alpha").unwrap();

        let instance = registry.instance("alpha").unwrap();
        assert_eq!(instance.root, registry.root().join("alpha"));
        assert!(!instance.has_config);
        assert!(matches!(registry.instance("ghost"), Err(Error::NotFound(_))));
    }
}
