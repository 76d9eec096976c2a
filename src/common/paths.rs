//! Configuration and scenario file locations
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/api-conformance/`
//! - macOS: `~/Library/Application Support/api-conformance/`
//! - Windows: `%APPDATA%\api-conformance\`

use std::path::{Path, PathBuf};

use super::{Error, Result};

/// Name used for the configuration directory
const APP_NAME: &str = "api-conformance";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Collect YAML files under the given paths, sorted by full path
///
/// Directories are walked recursively. Numbered directory prefixes
/// ("01 Setup", "05 Search") therefore decide execution order.
pub fn collect_yaml_files(roots: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for root in roots {
        if root.is_dir() {
            walk(root, &mut files)?;
        } else if root.is_file() {
            files.push(root.clone());
        } else {
            return Err(Error::FileRead {
                path: root.display().to_string(),
                error: "no such file or directory".to_string(),
            });
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, files)?;
        } else if is_yaml(&path) {
            files.push(path);
        }
    }
    Ok(())
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}
