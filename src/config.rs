//! JSON configuration persistence.
//!
//! The persisted document is a JSON object whose top-level keys are section
//! names; each section is a flat map of scalar values:
//!
//! ```json
//! {
//!     "shell": { "debug": false, "page_break": true, "path_delimiter": ">" }
//! }
//! ```
//!
//! Sections are loaded individually, so a section that fails to load does not
//! affect the others.

use crate::error::{Result, ShellError};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// A flat, string-keyed map of scalar values.
pub type Section = BTreeMap<String, Value>;

/// Running configuration plus the file it persists to.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    defaults: BTreeMap<String, Section>,
    running: BTreeMap<String, Section>,
    /// `(section, key)` pairs overridden for this process only.
    transient: BTreeSet<(String, String)>,
}

impl ConfigStore {
    /// A store that never touches the file system.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// A store backed by the JSON file at `path`. Nothing is read until a
    /// section is loaded.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load section `name`, with persisted values taking precedence over
    /// `defaults`.
    ///
    /// On error the section is left untouched and other sections are
    /// unaffected.
    pub fn load_section(&mut self, name: &str, defaults: Section) -> Result<()> {
        let mut section = defaults.clone();
        if let Some(path) = &self.path {
            let document = read_document(path)?;
            if let Some(saved) = document.get(name) {
                section.extend(as_section(path, name, saved)?);
            }
        }
        tracing::debug!(section = name, keys = section.len(), "loaded config section");
        self.defaults.insert(name.to_string(), defaults);
        self.running.insert(name.to_string(), section);
        Ok(())
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.running.keys().map(String::as_str)
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.running.get(name)
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&Value> {
        self.running.get(section)?.get(key)
    }

    pub fn get_bool(&self, section: &str, key: &str) -> Option<bool> {
        self.get(section, key)?.as_bool()
    }

    pub fn get_str(&self, section: &str, key: &str) -> Option<&str> {
        self.get(section, key)?.as_str()
    }

    /// Set a scalar in the running configuration. Nothing is persisted until
    /// [`ConfigStore::save`].
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<Value>) {
        self.transient.remove(&(section.to_string(), key.to_string()));
        self.running
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    /// Override a value for this process without marking the configuration
    /// as changed. A later [`ConfigStore::set`] of the same key makes it a
    /// regular change again.
    pub fn set_transient(&mut self, section: &str, key: &str, value: impl Into<Value>) {
        self.set(section, key, value);
        self.transient
            .insert((section.to_string(), key.to_string()));
    }

    /// Differences between the running and the persisted configuration, one
    /// `-section.key = saved` / `+section.key = running` pair per changed key.
    /// Empty when nothing needs saving.
    pub fn diff(&self) -> Result<String> {
        let Some(path) = &self.path else {
            return Ok(String::new());
        };
        let document = read_document(path)?;
        let mut lines = Vec::new();
        for (name, running) in &self.running {
            let mut persisted = self.defaults.get(name).cloned().unwrap_or_default();
            if let Some(saved) = document.get(name) {
                persisted.extend(as_section(path, name, saved)?);
            }
            let keys: BTreeSet<&String> =
                running.keys().chain(persisted.keys()).collect();
            for key in keys {
                if self.transient.contains(&(name.clone(), key.clone())) {
                    continue;
                }
                let (old, new) = (persisted.get(key), running.get(key));
                if old == new {
                    continue;
                }
                if let Some(old) = old {
                    lines.push(format!("-{name}.{key} = {old}"));
                }
                if let Some(new) = new {
                    lines.push(format!("+{name}.{key} = {new}"));
                }
            }
        }
        Ok(lines.join("\n"))
    }

    /// Persist every running section, keeping sections of the file that were
    /// never loaded. An existing file is first copied to `<path>.bak`.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Err(ShellError::input("no configuration file to save to"));
        };
        let mut document = match read_document(path) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(error = %e, "replacing unreadable config file");
                BTreeMap::new()
            }
        };
        for (name, running) in &self.running {
            let mut section = running.clone();
            // transient overrides keep their persisted value
            for (_, key) in self.transient.iter().filter(|(s, _)| s == name) {
                let saved = document
                    .get(name)
                    .and_then(|v| v.get(key))
                    .or_else(|| self.defaults.get(name)?.get(key))
                    .cloned();
                match saved {
                    Some(saved) => section.insert(key.clone(), saved),
                    None => section.remove(key),
                };
            }
            document.insert(name.clone(), Value::Object(section.into_iter().collect()));
        }

        let io_err = |e: std::io::Error| ShellError::ConfigIo {
            path: path.clone(),
            reason: e.to_string(),
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        if path.is_file() {
            fs::copy(path, backup_path(path)).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(&document).map_err(|e| ShellError::ConfigIo {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        fs::write(path, json + "\n").map_err(io_err)?;
        tracing::info!(path = %path.display(), "saved configuration");
        Ok(())
    }

    /// Pretty JSON of one running section, or of all of them.
    pub fn formatted(&self, section: Option<&str>) -> Option<String> {
        let value = match section {
            Some(name) => serde_json::to_value(self.running.get(name)?).ok()?,
            None => serde_json::to_value(&self.running).ok()?,
        };
        serde_json::to_string_pretty(&value).ok()
    }
}

/// `<path>.bak`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

fn read_document(path: &Path) -> Result<BTreeMap<String, Value>> {
    let config_err = |reason: String| ShellError::ConfigIo {
        path: path.to_path_buf(),
        reason,
    };
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    if !path.is_file() {
        return Err(config_err("exists and is not a file".into()));
    }
    let data = fs::read_to_string(path).map_err(|e| config_err(e.to_string()))?;
    if data.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(&data).map_err(|e| config_err(format!("invalid JSON: {e}")))
}

fn as_section(path: &Path, name: &str, value: &Value) -> Result<Section> {
    let config_err = |reason: String| ShellError::ConfigIo {
        path: path.to_path_buf(),
        reason,
    };
    let Value::Object(map) = value else {
        return Err(config_err(format!("section '{name}' is not an object")));
    };
    let mut section = Section::new();
    for (key, value) in map {
        if value.is_object() || value.is_array() {
            return Err(config_err(format!("'{name}.{key}' is not a scalar")));
        }
        section.insert(key.clone(), value.clone());
    }
    Ok(section)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults() -> Section {
        let mut section = Section::new();
        section.insert("debug".into(), json!(false));
        section.insert("path_delimiter".into(), json!(">"));
        section
    }

    #[test]
    fn test_in_memory_store_has_no_diff() {
        let mut store = ConfigStore::in_memory();
        store.load_section("shell", defaults()).unwrap();
        store.set("shell", "debug", true);
        assert_eq!(store.get_bool("shell", "debug"), Some(true));
        assert_eq!(store.diff().unwrap(), "");
        assert!(store.save().is_err());
    }

    #[test]
    fn test_transient_values_are_not_changes() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ConfigStore::open(dir.path().join("config.json"));
        store.load_section("shell", defaults()).unwrap();
        store.set_transient("shell", "debug", true);
        assert_eq!(store.get_bool("shell", "debug"), Some(true));
        assert_eq!(store.diff().unwrap(), "");

        store.save().unwrap();
        let saved: Value =
            serde_json::from_str(&fs::read_to_string(store.path().unwrap()).unwrap()).unwrap();
        assert_eq!(saved["shell"]["debug"], json!(false));

        store.set("shell", "debug", true);
        assert_eq!(
            store.diff().unwrap(),
            "-shell.debug = false\n+shell.debug = true"
        );
    }

    #[test]
    fn test_missing_file_uses_defaults_without_diff() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ConfigStore::open(dir.path().join("config.json"));
        store.load_section("shell", defaults()).unwrap();
        assert_eq!(store.get_str("shell", "path_delimiter"), Some(">"));
        assert_eq!(store.diff().unwrap(), "");
    }

    #[test]
    fn test_saved_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"shell": {"debug": true}, "other": {"x": 1}}"#).unwrap();

        let mut store = ConfigStore::open(&path);
        store.load_section("shell", defaults()).unwrap();
        assert_eq!(store.get_bool("shell", "debug"), Some(true));
        assert_eq!(store.get_str("shell", "path_delimiter"), Some(">"));
        assert!(store.section("other").is_none());
    }

    #[test]
    fn test_diff_then_save_creates_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"shell": {"debug": false}, "other": {"x": 1}}"#).unwrap();

        let mut store = ConfigStore::open(&path);
        store.load_section("shell", defaults()).unwrap();
        store.set("shell", "debug", true);
        assert_eq!(
            store.diff().unwrap(),
            "-shell.debug = false\n+shell.debug = true"
        );

        store.save().unwrap();
        assert_eq!(store.diff().unwrap(), "");
        let backup = fs::read_to_string(backup_path(&path)).unwrap();
        assert!(backup.contains(r#""debug": false"#));

        let saved: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["shell"]["debug"], json!(true));
        assert_eq!(saved["other"]["x"], json!(1));
    }

    #[test]
    fn test_corrupt_file_fails_only_that_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let mut store = ConfigStore::open(&path);
        let err = store.load_section("shell", defaults()).unwrap_err();
        assert!(matches!(err, ShellError::ConfigIo { .. }));
        assert!(store.section("shell").is_none());
    }

    #[test]
    fn test_nested_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"shell": {"debug": {"nested": 1}}, "ok": {"a": "b"}}"#).unwrap();

        let mut store = ConfigStore::open(&path);
        assert!(store.load_section("shell", defaults()).is_err());
        store.load_section("ok", Section::new()).unwrap();
        assert_eq!(store.get_str("ok", "a"), Some("b"));
    }
}
