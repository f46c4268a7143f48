use std::path::PathBuf;

use cone_core::ManifestError;
use thiserror::Error;

/// Failures surfaced by the engine to its caller.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{} can't be {action} as it doesn't exist", .path.display())]
    NotFound { action: &'static str, path: PathBuf },

    #[error("{} {algorithm} mismatch: expected {expected}, got {actual}", .path.display())]
    IntegrityError {
        path: PathBuf,
        algorithm: String,
        expected: String,
        actual: String,
    },

    #[error("unknown step type: {0}")]
    UnknownStepType(String),

    #[error("unknown prerequisite type: {0}")]
    UnknownPrerequisiteType(String),

    #[error("can't create {kind} for '{package}' as no file was kept")]
    MissingInstallDirectory { package: String, kind: &'static str },

    #[error("{kind} entry '{entry}' of '{package}' is missing target")]
    MissingShortcutTarget {
        package: String,
        kind: &'static str,
        entry: String,
    },

    #[error("dependency cycle: {chain}")]
    CyclicDependency { chain: String },

    #[error("unknown package: {0}")]
    UnknownPackage(String),

    #[error("unsupported hash algorithm '{algorithm}' for {}", .path.display())]
    UnsupportedHashAlgorithm { algorithm: String, path: PathBuf },

    #[error(transparent)]
    Manifest(ManifestError),

    #[error("failed to parse installed package registry {}: {source}", .path.display())]
    Registry {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Host(#[from] anyhow::Error),
}

impl EngineError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

impl From<ManifestError> for EngineError {
    fn from(err: ManifestError) -> Self {
        match err.kind() {
            ManifestError::UnknownStepType(step_type) => Self::UnknownStepType(step_type.clone()),
            ManifestError::UnknownPrerequisiteType(prerequisite) => {
                Self::UnknownPrerequisiteType(prerequisite.clone())
            }
            _ => Self::Manifest(err),
        }
    }
}
