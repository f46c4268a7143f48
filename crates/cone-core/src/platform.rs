use std::collections::BTreeMap;

pub const OTHER_PLATFORM_KEY: &str = "other";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    Windows,
    Linux,
    MacOs,
    OtherUnix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostArch {
    X64,
    X86,
}

impl HostOs {
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_os = "linux") {
            Self::Linux
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::OtherUnix
        }
    }

    pub fn is_windows(self) -> bool {
        self == Self::Windows
    }

    pub fn is_unix(self) -> bool {
        !self.is_windows()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::MacOs => "macos",
            Self::OtherUnix => "unix",
        }
    }
}

impl HostArch {
    pub fn current() -> Self {
        if cfg!(target_pointer_width = "64") {
            Self::X64
        } else {
            Self::X86
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::X64 => "x64",
            Self::X86 => "x86",
        }
    }
}

/// Decides which platform variant keys of a step apply to a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostPlatform {
    pub os: HostOs,
    pub arch: HostArch,
}

impl HostPlatform {
    pub fn new(os: HostOs, arch: HostArch) -> Self {
        Self { os, arch }
    }

    pub fn current() -> Self {
        Self::new(HostOs::current(), HostArch::current())
    }

    /// Keys this host answers to, in the order they fire. Does not include
    /// the `other` fallback.
    pub fn candidate_keys(&self) -> Vec<String> {
        let arch = self.arch.as_str();
        let families: &[&str] = match self.os {
            HostOs::Windows => &["windows"],
            HostOs::Linux => &["unix", "linux"],
            HostOs::MacOs => &["unix", "macos"],
            HostOs::OtherUnix => &["unix"],
        };

        let mut keys = Vec::with_capacity(families.len() * 2);
        for family in families {
            keys.push((*family).to_string());
            keys.push(format!("{family}_{arch}"));
        }
        keys
    }

    /// Selects the present keys that apply, falling back to `other` only when
    /// no host key is present at all.
    pub fn select_keys(&self, has_key: impl Fn(&str) -> bool) -> Vec<String> {
        let selected = self
            .candidate_keys()
            .into_iter()
            .filter(|key| has_key(key))
            .collect::<Vec<_>>();
        if selected.is_empty() && has_key(OTHER_PLATFORM_KEY) {
            return vec![OTHER_PLATFORM_KEY.to_string()];
        }
        selected
    }

    pub fn select<'a, T>(&self, variants: &'a BTreeMap<String, T>) -> Vec<(&'a str, &'a T)> {
        self.select_keys(|key| variants.contains_key(key))
            .into_iter()
            .filter_map(|key| variants.get_key_value(key.as_str()))
            .map(|(key, value)| (key.as_str(), value))
            .collect()
    }

    pub fn matches_any<'a>(&self, keys: impl IntoIterator<Item = &'a String>) -> bool {
        let keys = keys.into_iter().map(String::as_str).collect::<Vec<_>>();
        !self
            .select_keys(|key| keys.iter().any(|candidate| *candidate == key))
            .is_empty()
    }
}

/// `windows` and `windows_<arch>` variants ship zip archives.
pub(crate) fn is_windows_variant(key: &str) -> bool {
    key == "windows" || key.starts_with("windows_")
}
