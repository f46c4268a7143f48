use std::collections::BTreeMap;

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::ManifestError;
use crate::platform::is_windows_variant;

/// One declarative action of an install, uninstall or update sequence.
///
/// On the wire a step is a JSON object whose `type` field selects the
/// variant; the remaining fields are variant specific. Platform steps keep
/// their per-platform payloads under the platform keys themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    PlatformSwitch {
        variants: BTreeMap<String, Vec<Step>>,
    },
    PlatformDownloadAndExtract {
        target: String,
        variants: BTreeMap<String, DownloadSource>,
    },
    Echo {
        value: String,
    },
    ShellExec {
        value: String,
    },
    EnablePhpExtension {
        name: String,
    },
    DisablePhpExtension {
        name: String,
    },
    InstallUnixPackage {
        name: String,
    },
    RemoveUnixPackage {
        name: String,
    },
    Download(DownloadStep),
    Extract {
        file: String,
        target: String,
    },
    Delete {
        file: String,
    },
    Keep {
        file: String,
        as_name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadSource {
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hash: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadStep {
    pub url: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hash: BTreeMap<String, String>,
}

impl Step {
    pub const KNOWN_TYPES: [&'static str; 13] = [
        "platform_switch",
        "platform_download_and_extract",
        "echo",
        "shell_exec",
        "enable_php_extension",
        "disable_php_extension",
        "install_unix_package",
        "remove_unix_package",
        "uninstall_unix_package",
        "download",
        "extract",
        "delete",
        "keep",
    ];

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::PlatformSwitch { .. } => "platform_switch",
            Self::PlatformDownloadAndExtract { .. } => "platform_download_and_extract",
            Self::Echo { .. } => "echo",
            Self::ShellExec { .. } => "shell_exec",
            Self::EnablePhpExtension { .. } => "enable_php_extension",
            Self::DisablePhpExtension { .. } => "disable_php_extension",
            Self::InstallUnixPackage { .. } => "install_unix_package",
            Self::RemoveUnixPackage { .. } => "remove_unix_package",
            Self::Download(_) => "download",
            Self::Extract { .. } => "extract",
            Self::Delete { .. } => "delete",
            Self::Keep { .. } => "keep",
        }
    }

    /// The step that undoes this one, for the step types that have one.
    pub fn inverse(&self) -> Option<Step> {
        match self {
            Self::EnablePhpExtension { name } => {
                Some(Self::DisablePhpExtension { name: name.clone() })
            }
            Self::DisablePhpExtension { name } => {
                Some(Self::EnablePhpExtension { name: name.clone() })
            }
            Self::InstallUnixPackage { name } => {
                Some(Self::RemoveUnixPackage { name: name.clone() })
            }
            Self::RemoveUnixPackage { name } => {
                Some(Self::InstallUnixPackage { name: name.clone() })
            }
            _ => None,
        }
    }

    /// Expands one `platform_download_and_extract` variant into its
    /// download, extract and delete steps.
    pub fn download_and_extract_steps(
        target: &str,
        platform_key: &str,
        source: &DownloadSource,
    ) -> [Step; 3] {
        let archive = format!("{target}{}", archive_extension(platform_key));
        [
            Self::Download(DownloadStep {
                url: source.url.clone(),
                target: archive.clone(),
                hash: source.hash.clone(),
            }),
            Self::Extract {
                file: archive.clone(),
                target: target.to_string(),
            },
            Self::Delete { file: archive },
        ]
    }

    pub fn from_value(value: Value) -> Result<Self, ManifestError> {
        let Value::Object(mut fields) = value else {
            return Err(ManifestError::InvalidStep {
                step_type: "<none>".to_string(),
                reason: "step must be a JSON object".to_string(),
            });
        };
        let step_type = match fields.remove("type") {
            Some(Value::String(step_type)) => step_type,
            _ => {
                return Err(ManifestError::InvalidStep {
                    step_type: "<none>".to_string(),
                    reason: "missing string field 'type'".to_string(),
                })
            }
        };

        let step = match step_type.as_str() {
            "platform_switch" => {
                let mut variants = BTreeMap::new();
                for (key, nested) in fields {
                    variants.insert(key, Self::list_from_value(nested)?);
                }
                Self::PlatformSwitch { variants }
            }
            "platform_download_and_extract" => {
                let target = required_field(&mut fields, &step_type, "target")?;
                let mut variants = BTreeMap::new();
                for (key, source) in fields {
                    let source = serde_json::from_value::<DownloadSource>(source).map_err(
                        |err| ManifestError::InvalidStep {
                            step_type: step_type.clone(),
                            reason: format!("platform '{key}': {err}"),
                        },
                    )?;
                    variants.insert(key, source);
                }
                Self::PlatformDownloadAndExtract { target, variants }
            }
            "echo" => Self::Echo {
                value: required_field(&mut fields, &step_type, "value")?,
            },
            "shell_exec" => Self::ShellExec {
                value: required_field(&mut fields, &step_type, "value")?,
            },
            "enable_php_extension" => Self::EnablePhpExtension {
                name: required_field(&mut fields, &step_type, "name")?,
            },
            "disable_php_extension" => Self::DisablePhpExtension {
                name: required_field(&mut fields, &step_type, "name")?,
            },
            "install_unix_package" => Self::InstallUnixPackage {
                name: required_field(&mut fields, &step_type, "name")?,
            },
            "remove_unix_package" | "uninstall_unix_package" => Self::RemoveUnixPackage {
                name: required_field(&mut fields, &step_type, "name")?,
            },
            "download" => Self::Download(DownloadStep {
                url: required_field(&mut fields, &step_type, "url")?,
                target: required_field(&mut fields, &step_type, "target")?,
                hash: optional_field(&mut fields, &step_type, "hash")?.unwrap_or_default(),
            }),
            "extract" => Self::Extract {
                file: required_field(&mut fields, &step_type, "file")?,
                target: required_field(&mut fields, &step_type, "target")?,
            },
            "delete" => Self::Delete {
                file: required_field(&mut fields, &step_type, "file")?,
            },
            "keep" => Self::Keep {
                file: required_field(&mut fields, &step_type, "file")?,
                as_name: optional_field(&mut fields, &step_type, "as")?.unwrap_or_default(),
            },
            _ => return Err(ManifestError::UnknownStepType(step_type)),
        };
        Ok(step)
    }

    pub fn list_from_value(value: Value) -> Result<Vec<Self>, ManifestError> {
        let Value::Array(entries) = value else {
            return Err(ManifestError::InvalidManifest(
                "step list must be a JSON array".to_string(),
            ));
        };
        entries.into_iter().map(Self::from_value).collect()
    }

    pub fn to_value(&self) -> Value {
        let mut fields = Map::new();
        fields.insert("type".to_string(), Value::from(self.type_name()));
        match self {
            Self::PlatformSwitch { variants } => {
                for (key, steps) in variants {
                    fields.insert(
                        key.clone(),
                        Value::Array(steps.iter().map(Self::to_value).collect()),
                    );
                }
            }
            Self::PlatformDownloadAndExtract { target, variants } => {
                fields.insert("target".to_string(), Value::from(target.as_str()));
                for (key, source) in variants {
                    fields.insert(key.clone(), download_source_value(source));
                }
            }
            Self::Echo { value } | Self::ShellExec { value } => {
                fields.insert("value".to_string(), Value::from(value.as_str()));
            }
            Self::EnablePhpExtension { name }
            | Self::DisablePhpExtension { name }
            | Self::InstallUnixPackage { name }
            | Self::RemoveUnixPackage { name } => {
                fields.insert("name".to_string(), Value::from(name.as_str()));
            }
            Self::Download(download) => {
                fields.insert("url".to_string(), Value::from(download.url.as_str()));
                fields.insert("target".to_string(), Value::from(download.target.as_str()));
                if !download.hash.is_empty() {
                    fields.insert("hash".to_string(), hash_value(&download.hash));
                }
            }
            Self::Extract { file, target } => {
                fields.insert("file".to_string(), Value::from(file.as_str()));
                fields.insert("target".to_string(), Value::from(target.as_str()));
            }
            Self::Delete { file } => {
                fields.insert("file".to_string(), Value::from(file.as_str()));
            }
            Self::Keep { file, as_name } => {
                fields.insert("file".to_string(), Value::from(file.as_str()));
                fields.insert("as".to_string(), Value::from(as_name.as_str()));
            }
        }
        Value::Object(fields)
    }
}

impl Serialize for Step {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Step {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(D::Error::custom)
    }
}

pub(crate) fn archive_extension(platform_key: &str) -> &'static str {
    if is_windows_variant(platform_key) {
        ".zip"
    } else {
        ".tar.gz"
    }
}

fn required_field<T: DeserializeOwned>(
    fields: &mut Map<String, Value>,
    step_type: &str,
    key: &str,
) -> Result<T, ManifestError> {
    optional_field(fields, step_type, key)?.ok_or_else(|| ManifestError::InvalidStep {
        step_type: step_type.to_string(),
        reason: format!("missing field '{key}'"),
    })
}

fn optional_field<T: DeserializeOwned>(
    fields: &mut Map<String, Value>,
    step_type: &str,
    key: &str,
) -> Result<Option<T>, ManifestError> {
    match fields.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|err| ManifestError::InvalidStep {
                step_type: step_type.to_string(),
                reason: format!("field '{key}': {err}"),
            }),
    }
}

fn hash_value(hash: &BTreeMap<String, String>) -> Value {
    Value::Object(
        hash.iter()
            .map(|(algorithm, digest)| (algorithm.clone(), Value::from(digest.as_str())))
            .collect(),
    )
}

fn download_source_value(source: &DownloadSource) -> Value {
    let mut fields = Map::new();
    fields.insert("url".to_string(), Value::from(source.url.as_str()));
    if !source.hash.is_empty() {
        fields.insert("hash".to_string(), hash_value(&source.hash));
    }
    Value::Object(fields)
}
