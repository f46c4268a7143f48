mod config;
mod error;
mod fs_utils;
mod host;
mod integration;
mod interpreter;
mod layout;
mod php_ini;
mod registry;
mod session;

pub use config::{ConeConfig, IntegrationPaths, ManualFlagPolicy};
pub use error::EngineError;
pub use fs_utils::{move_path_or_copy, remove_file_if_exists, remove_path_if_exists};
pub use host::{
    ArchiveExtractor, CommandExtractor, CommandLocator, Downloader, EnvironmentFile,
    EnvironmentStore, HostServices, HttpDownloader, NativePackageManager, ProcessRunner,
    Reporter, StdoutReporter, SystemCommandLocator, SystemPackageManager, SystemProcessRunner,
    WindowsMachineEnvironment,
};
pub use integration::{render_desktop_entry, render_launcher, ShortcutCommand};
pub use interpreter::{StepContext, StepInterpreter};
pub use layout::{default_user_prefix, PrefixLayout};
pub use php_ini::toggle_extension;
pub use registry::{InstalledPackageRecord, InstalledPackageRegistry};
pub use session::{
    Flow, InstallOptions, InstallOutcome, Session, UninstallOutcome, UpdateOutcome,
};
