use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use cone_core::Step;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::EngineError;

/// What was installed for one package and how to take it back out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstalledPackageRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub manual: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shortcuts: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub startmenu: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub file_associations: Vec<String>,
    /// Synthesized inverse steps followed by the manifest's own uninstall
    /// steps.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub uninstall: Vec<Step>,
}

impl InstalledPackageRecord {
    /// Recorded display name; older records only carry the package name.
    pub fn label<'a>(&'a self, name: &'a str) -> &'a str {
        self.display_name.as_deref().unwrap_or(name)
    }
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default = "default_manual")]
    manual: bool,
    #[serde(default)]
    shortcuts: Vec<String>,
    #[serde(default)]
    startmenu: Vec<String>,
    #[serde(default)]
    variables: Vec<String>,
    #[serde(default)]
    file_associations: Vec<String>,
    #[serde(default)]
    uninstall: Vec<Value>,
}

fn default_manual() -> bool {
    true
}

/// The durable `installed_packages.json` snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackageRegistry {
    path: PathBuf,
    records: BTreeMap<String, InstalledPackageRecord>,
}

impl InstalledPackageRegistry {
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: BTreeMap::new(),
        }
    }

    /// A missing file means nothing is installed.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let path = path.into();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::empty(path));
            }
            Err(err) => {
                return Err(EngineError::io(format!("read {}", path.display()), err));
            }
        };

        let raw: BTreeMap<String, RawRecord> =
            serde_json::from_str(&content).map_err(|source| EngineError::Registry {
                path: path.clone(),
                source,
            })?;

        let mut records = BTreeMap::new();
        for (name, raw) in raw {
            let uninstall = raw
                .uninstall
                .into_iter()
                .map(Step::from_value)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| err.in_package(&name))?;
            records.insert(
                name,
                InstalledPackageRecord {
                    display_name: raw.display_name,
                    version: raw.version,
                    manual: raw.manual,
                    shortcuts: raw.shortcuts,
                    startmenu: raw.startmenu,
                    variables: raw.variables,
                    file_associations: raw.file_associations,
                    uninstall,
                },
            );
        }
        Ok(Self { path, records })
    }

    /// Writes the full snapshot next to the target and renames it into place.
    pub fn save(&self) -> Result<(), EngineError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| EngineError::io(format!("create {}", parent.display()), err))?;
        }

        let mut payload =
            serde_json::to_string_pretty(&self.records).map_err(|source| EngineError::Registry {
                path: self.path.clone(),
                source,
            })?;
        payload.push('\n');

        let tmp_path = tmp_path_for(&self.path);
        fs::write(&tmp_path, payload)
            .map_err(|err| EngineError::io(format!("write {}", tmp_path.display()), err))?;
        fs::rename(&tmp_path, &self.path)
            .map_err(|err| EngineError::io(format!("replace {}", self.path.display()), err))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&InstalledPackageRecord> {
        self.records.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut InstalledPackageRecord> {
        self.records.get_mut(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, record: InstalledPackageRecord) {
        self.records.insert(name.into(), record);
    }

    pub fn remove(&mut self, name: &str) -> Option<InstalledPackageRecord> {
        self.records.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InstalledPackageRecord)> {
        self.records
            .iter()
            .map(|(name, record)| (name.as_str(), record))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut file_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    file_name.push(".tmp");
    path.with_file_name(file_name)
}
