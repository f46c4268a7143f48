use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ManifestError;
use crate::platform::HostPlatform;
use crate::step::Step;
use crate::version::is_dev_version;

/// Catalog definition of one installable package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManifest {
    pub name: String,
    pub aliases: Vec<String>,
    pub risky_aliases: Vec<String>,
    pub version: Option<String>,
    pub display_name: Option<String>,
    pub source: Option<String>,
    pub prerequisites: Vec<Prerequisite>,
    pub dependencies: Vec<String>,
    pub install: Vec<Step>,
    pub uninstall: Vec<Step>,
    pub update: Option<Vec<Step>>,
    pub shortcuts: BTreeMap<String, ShortcutSpec>,
    pub startmenu: BTreeMap<String, ShortcutSpec>,
    pub variables: BTreeMap<String, VariableSpec>,
    pub file_associations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prerequisite {
    /// Unmet while `command` resolves on the host.
    CommandNotFound { command: String },
    /// Met when the host selects at least one of the listed platform keys.
    Os { platforms: BTreeSet<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortcutSpec {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub target_winext: Option<String>,
    #[serde(default)]
    pub target_arguments: Vec<TargetArgument>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetArgument {
    Path { path: String },
    Value { value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableSpec {
    Path { path: String },
    Value { value: String },
}

#[derive(Debug, Deserialize)]
struct RawPackageManifest {
    name: String,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    risky_aliases: Vec<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    prerequisites: Vec<Value>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    install: Option<Value>,
    #[serde(default)]
    uninstall: Option<Value>,
    #[serde(default)]
    update: Option<Value>,
    #[serde(default)]
    shortcuts: BTreeMap<String, ShortcutSpec>,
    #[serde(default)]
    startmenu: BTreeMap<String, ShortcutSpec>,
    #[serde(default)]
    variables: BTreeMap<String, VariableSpec>,
    #[serde(default)]
    file_associations: BTreeMap<String, String>,
}

impl PackageManifest {
    pub fn from_json_str(input: &str) -> Result<Self, ManifestError> {
        let value: Value = serde_json::from_str(input)
            .map_err(|err| ManifestError::InvalidManifest(err.to_string()))?;
        Self::from_value(value)
    }

    /// Parses one catalog entry, rejecting step and prerequisite types this
    /// engine does not implement.
    pub fn from_value(value: Value) -> Result<Self, ManifestError> {
        let raw: RawPackageManifest = serde_json::from_value(value)
            .map_err(|err| ManifestError::InvalidManifest(err.to_string()))?;
        let name = raw.name;
        if name.trim().is_empty() {
            return Err(ManifestError::InvalidManifest(
                "package name must not be empty".to_string(),
            ));
        }

        let parse_steps = |steps: Option<Value>| -> Result<Option<Vec<Step>>, ManifestError> {
            steps
                .map(Step::list_from_value)
                .transpose()
                .map_err(|err| err.in_package(&name))
        };
        let install = parse_steps(raw.install)?.unwrap_or_default();
        let uninstall = parse_steps(raw.uninstall)?.unwrap_or_default();
        let update = parse_steps(raw.update)?;

        let prerequisites = raw
            .prerequisites
            .into_iter()
            .map(Prerequisite::from_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| err.in_package(&name))?;

        Ok(Self {
            name,
            aliases: raw.aliases,
            risky_aliases: raw.risky_aliases,
            version: raw.version,
            display_name: raw.display_name,
            source: raw.source,
            prerequisites,
            dependencies: raw.dependencies,
            install,
            uninstall,
            update,
            shortcuts: raw.shortcuts,
            startmenu: raw.startmenu,
            variables: raw.variables,
            file_associations: raw.file_associations,
        })
    }

    /// Declared display name, or the package name with its first letter
    /// uppercased.
    pub fn default_display_name(&self) -> String {
        if let Some(display_name) = &self.display_name {
            return display_name.clone();
        }
        let mut chars = self.name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    pub fn version_str(&self) -> &str {
        self.version.as_deref().unwrap_or("")
    }

    pub fn is_dev_build(&self) -> bool {
        self.version.as_deref().is_some_and(is_dev_version)
    }

    /// `Name v1.2`, `Name 1.3-dev`, or just `Name` when unversioned.
    pub fn labelled(&self, display_name: &str) -> String {
        match &self.version {
            Some(version) if is_dev_version(version) => format!("{display_name} {version}"),
            Some(version) => format!("{display_name} v{version}"),
            None => display_name.to_string(),
        }
    }

    pub fn depends_on(&self, name: &str) -> bool {
        self.dependencies.iter().any(|dependency| dependency == name)
    }

    pub fn has_integration_points(&self) -> bool {
        !self.shortcuts.is_empty()
            || !self.startmenu.is_empty()
            || !self.variables.is_empty()
            || !self.file_associations.is_empty()
    }
}

impl Prerequisite {
    pub fn from_value(value: Value) -> Result<Self, ManifestError> {
        let Value::Object(mut fields) = value else {
            return Err(ManifestError::InvalidManifest(
                "prerequisite must be a JSON object".to_string(),
            ));
        };
        let prerequisite_type = match fields.remove("type") {
            Some(Value::String(prerequisite_type)) => prerequisite_type,
            _ => {
                return Err(ManifestError::InvalidManifest(
                    "prerequisite is missing string field 'type'".to_string(),
                ))
            }
        };

        match prerequisite_type.as_str() {
            "command_not_found" => match fields.remove("value") {
                Some(Value::String(command)) => Ok(Self::CommandNotFound { command }),
                _ => Err(ManifestError::InvalidManifest(
                    "command_not_found prerequisite is missing string field 'value'".to_string(),
                )),
            },
            "os" => Ok(Self::Os {
                platforms: fields.into_iter().map(|(key, _)| key).collect(),
            }),
            _ => Err(ManifestError::UnknownPrerequisiteType(prerequisite_type)),
        }
    }

    /// Platform half of the check; command lookups need the host and are
    /// answered by the caller.
    pub fn os_allows(&self, platform: &HostPlatform) -> bool {
        match self {
            Self::Os { platforms } => platform.matches_any(platforms),
            Self::CommandNotFound { .. } => true,
        }
    }
}
