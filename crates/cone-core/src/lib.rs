mod error;
mod manifest;
mod platform;
mod step;
mod version;

pub use error::ManifestError;
pub use manifest::{
    PackageManifest, Prerequisite, ShortcutSpec, TargetArgument, VariableSpec,
};
pub use platform::{HostArch, HostOs, HostPlatform, OTHER_PLATFORM_KEY};
pub use step::{DownloadSource, DownloadStep, Step};
pub use version::{compare_versions, is_dev_version, is_newer_version};

#[cfg(test)]
mod tests;
