use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use tracing::debug;

use crate::host::{CommandLocator, ProcessRunner};

/// Comments or uncomments the `extension=<name>` and
/// `extension=php_<name>.dll` lines of a php.ini document.
///
/// Only whole marker lines change; everything else, line endings included,
/// is kept byte for byte.
pub fn toggle_extension(content: &str, name: &str, enable: bool) -> String {
    let markers = [format!("extension={name}"), format!("extension=php_{name}.dll")];
    let mut toggled = String::with_capacity(content.len() + 2);

    for line in content.split_inclusive('\n') {
        let body = line.trim_end_matches(&['\r', '\n'][..]);
        let ending = &line[body.len()..];
        let replacement = markers.iter().find_map(|marker| {
            if enable && body.strip_prefix(';') == Some(marker.as_str()) {
                Some(marker.clone())
            } else if !enable && body == marker {
                Some(format!(";{marker}"))
            } else {
                None
            }
        });
        match replacement {
            Some(replacement) => {
                toggled.push_str(&replacement);
                toggled.push_str(ending);
            }
            None => toggled.push_str(line),
        }
    }
    toggled
}

pub(crate) fn toggle_extension_in_file(path: &Path, name: &str, enable: bool) -> Result<bool> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let toggled = toggle_extension(&content, name, enable);
    if toggled == content {
        return Ok(false);
    }
    fs::write(path, toggled).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

/// The php.ini the extension toggles edit: the configured file, the one
/// `php --ini` reports as loaded, or a fresh copy of `php.ini-development`
/// next to the `php` binary.
pub(crate) fn locate_php_ini(
    configured: Option<&Path>,
    processes: &dyn ProcessRunner,
    commands: &dyn CommandLocator,
) -> Result<Option<PathBuf>> {
    if let Some(path) = configured {
        return Ok(Some(path.to_path_buf()));
    }

    let Some(php) = commands.locate("php") else {
        debug!("php is not on PATH; no php.ini to edit");
        return Ok(None);
    };

    let mut command = Command::new(&php);
    command.arg("--ini");
    if let Ok(output) = processes.capture(&mut command, "failed to query php --ini") {
        if let Some(loaded) = parse_loaded_configuration_file(&output) {
            return Ok(Some(loaded));
        }
    }

    let Some(php_dir) = php.parent() else {
        return Ok(None);
    };
    let template = php_dir.join("php.ini-development");
    if !template.is_file() {
        return Ok(None);
    }
    let ini = php_dir.join("php.ini");
    fs::copy(&template, &ini).with_context(|| {
        format!(
            "failed to create {} from {}",
            ini.display(),
            template.display()
        )
    })?;
    Ok(Some(ini))
}

fn parse_loaded_configuration_file(output: &str) -> Option<PathBuf> {
    output.lines().find_map(|line| {
        let value = line.strip_prefix("Loaded Configuration File:")?.trim();
        (!value.is_empty() && value != "(none)").then(|| PathBuf::from(value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_loaded_configuration_file_reads_php_ini_output() {
        let output = "Configuration File (php.ini) Path: /etc/php/8.3/cli\nLoaded Configuration File:         /etc/php/8.3/cli/php.ini\nScan for additional .ini files in: /etc/php/8.3/cli/conf.d\n";
        assert_eq!(
            parse_loaded_configuration_file(output),
            Some(PathBuf::from("/etc/php/8.3/cli/php.ini"))
        );
        assert_eq!(
            parse_loaded_configuration_file("Loaded Configuration File:         (none)\n"),
            None
        );
    }
}
