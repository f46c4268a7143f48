use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("unknown step type: {0}")]
    UnknownStepType(String),

    #[error("unknown prerequisite type: {0}")]
    UnknownPrerequisiteType(String),

    #[error("invalid '{step_type}' step: {reason}")]
    InvalidStep { step_type: String, reason: String },

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("manifest '{package}': {source}")]
    Package {
        package: String,
        #[source]
        source: Box<ManifestError>,
    },
}

impl ManifestError {
    pub fn in_package(self, package: &str) -> Self {
        Self::Package {
            package: package.to_string(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping package wrappers.
    pub fn kind(&self) -> &ManifestError {
        match self {
            Self::Package { source, .. } => source.kind(),
            other => other,
        }
    }
}
