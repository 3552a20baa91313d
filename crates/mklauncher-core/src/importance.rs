//! Persisted importance overrides.
//!
//! Stored as INI: one section per descriptor directory, one key per launcher
//! section, integer values. Keys are written with `: = ; #` escaped so
//! section names such as `mill:3axis` survive a reload.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ini::{EscapePolicy, Ini, WriteOption};
use tracing::debug;

use crate::record::{LauncherId, LauncherRecord};
use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct ImportanceStore {
    path: PathBuf,
    values: BTreeMap<LauncherId, i32>,
}

impl ImportanceStore {
    /// Empty store bound to `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            values: BTreeMap::new(),
        }
    }

    /// Load the store from `path`. A missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for unparsable files or non-integer values.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self::new(path);
        if !store.path.exists() {
            debug!("No importance file at {}", store.path.display());
            return Ok(store);
        }

        let ini = Ini::load_from_file(&store.path).map_err(|e| Error::from_ini(&store.path, e))?;
        for (group, props) in ini.iter() {
            let Some(group) = group else {
                continue;
            };
            for (section, raw) in props.iter() {
                let value = raw.trim().parse().map_err(|_| {
                    Error::Config(format!(
                        "{} [{group}] {section}: invalid integer '{raw}'",
                        store.path.display()
                    ))
                })?;
                store.values.insert(LauncherId::new(group, section), value);
            }
        }

        debug!(
            "Loaded {} importance values from {}",
            store.values.len(),
            store.path.display()
        );
        Ok(store)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Override for `id`, or 0
    #[must_use]
    pub fn get(&self, id: &LauncherId) -> i32 {
        self.values.get(id).copied().unwrap_or(0)
    }

    pub fn set(&mut self, id: LauncherId, value: i32) {
        self.values.insert(id, value);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy stored overrides into the records' status.
    pub fn apply(&self, records: &mut [LauncherRecord]) {
        for record in records {
            record.status.importance = self.get(&record.id);
        }
    }

    /// Write the store to its own path.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&self.path)
    }

    /// Write atomically to `path` (temp file + rename), creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let mut ini = Ini::new();
        for (id, value) in &self.values {
            ini.with_section(Some(id.group.as_str()))
                .set(id.section.as_str(), value.to_string());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut tmp_name = path.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let options = WriteOption {
            escape_policy: EscapePolicy::Reserved,
            ..WriteOption::default()
        };
        ini.write_to_file_opt(&tmp_path, options)?;
        fs::rename(&tmp_path, path)?;

        debug!("Saved {} importance values to {}", self.values.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = ImportanceStore::load(dir.path().join("importance.ini")).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.get(&LauncherId::new("/a", "b")), 0);
    }

    #[test]
    fn test_set_and_get() {
        let mut store = ImportanceStore::new("/unused");
        let id = LauncherId::new("/configs/mill", "axis");
        store.set(id.clone(), 5);
        assert_eq!(store.get(&id), 5);
        store.set(id.clone(), -2);
        assert_eq!(store.get(&id), -2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/importance.ini");
        let mut store = ImportanceStore::new(&path);
        store.set(LauncherId::new("/configs/mill", "axis"), 3);

        store.save().unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("nested/deeper/importance.ini.tmp").exists());

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("[/configs/mill]"));
        assert!(content.contains("axis=3"));
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("importance.ini");
        let mut store = ImportanceStore::new(&path);
        store.set(LauncherId::new("/configs/mill", "axis"), 10);
        store.set(LauncherId::new("/configs/mill", "gmoccapy"), 2);
        store.set(LauncherId::new("/configs/lathe", "touchy"), -1);
        store.save().unwrap();

        let loaded = ImportanceStore::load(&path).unwrap();
        assert_eq!(loaded.values, store.values);
    }

    #[test]
    fn test_roundtrip_reserved_characters() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("importance.ini");
        let mut store = ImportanceStore::new(&path);
        store.set(LauncherId::new("/configs/mill", "mill:3axis"), 4);
        store.set(LauncherId::new("/configs/mill", "a=b"), 5);
        store.set(LauncherId::new("/configs/mill", "#lathe"), 6);
        store.set(LauncherId::new("/configs/mill", ";touchy"), 7);
        store.set(LauncherId::new("/configs/c:\\sim", "back\\slash"), 8);
        store.save().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("mill\\:3axis=4"));

        let loaded = ImportanceStore::load(&path).unwrap();
        assert_eq!(loaded.values, store.values);
        assert_eq!(loaded.get(&LauncherId::new("/configs/mill", "mill:3axis")), 4);
    }

    #[test]
    fn test_invalid_value_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("importance.ini");
        fs::write(&path, "[/configs/mill]\naxis=lots\n").unwrap();

        let err = ImportanceStore::load(&path).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("axis")));
    }

    #[test]
    fn test_apply_sets_record_importance() {
        let mut records = vec![
            crate::tests::fixtures::make_record(0, "true"),
            crate::tests::fixtures::make_record(1, "true"),
        ];
        records[1].id = LauncherId::new("/configs", "second");

        let mut store = ImportanceStore::new("/unused");
        store.set(records[1].id.clone(), 9);
        store.apply(&mut records);

        assert_eq!(records[0].status.importance, 0);
        assert_eq!(records[1].status.importance, 9);
    }

    proptest! {
        #[test]
        fn prop_save_load_roundtrip(
            entries in prop::collection::btree_map(
                (
                    "/[a-z0-9_:=.-]{1,8}(/[a-z0-9_:=.-]{1,8}){0,2}",
                    "[A-Za-z0-9_:=;#.-]([A-Za-z0-9_:=;#. -]{0,10}[A-Za-z0-9_:=;#.-])?",
                ),
                any::<i32>(),
                0..12,
            )
        ) {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("importance.ini");
            let mut store = ImportanceStore::new(&path);
            for ((group, section), value) in &entries {
                store.set(LauncherId::new(group.as_str(), section.as_str()), *value);
            }
            store.save().unwrap();

            let loaded = ImportanceStore::load(&path).unwrap();
            prop_assert_eq!(loaded.values, store.values);
        }
    }
}
