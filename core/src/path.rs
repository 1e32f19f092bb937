use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use anyhow::Context;
use chrono::{DateTime, Utc};

use crate::error::ScriptError;

/// Turns a path written in a script into a path usable by this process.
/// Relative text is interpreted against `base`.
pub fn resolve(base: &Path, text: &str) -> Result<PathBuf, ScriptError> {
    if text.is_empty() || text.contains('\0') {
        return Err(ScriptError::InvalidPath(text.to_string()));
    }

    let path = Path::new(text);
    if path.is_absolute() {
        Ok(normalize(path))
    } else {
        Ok(normalize(&base.join(path)))
    }
}

/// Removes `.` components and folds `..` lexically, without touching the
/// filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Renders `path` relative to `base` when that spelling is shorter than the
/// absolute one.
pub fn shorten(path: &Path, base: &Path) -> String {
    let full = path.display().to_string();
    match relative_to(path, base) {
        Some(relative) => {
            let relative = relative.display().to_string();
            if !relative.is_empty() && relative.len() < full.len() {
                relative
            } else {
                full
            }
        }
        None => full,
    }
}

fn relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    if path.is_absolute() != base.is_absolute() {
        return None;
    }

    let path_components: Vec<_> = path.components().collect();
    let base_components: Vec<_> = base.components().collect();

    let common = path_components
        .iter()
        .zip(base_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    // Differing roots (e.g. Windows prefixes) cannot be bridged with `..`.
    if common == 0 {
        return None;
    }

    let mut relative = PathBuf::new();
    for _ in common..base_components.len() {
        relative.push("..");
    }
    for component in &path_components[common..] {
        relative.push(component.as_os_str());
    }
    Some(relative)
}

/// Last-write time of `path`, or `None` when the file does not exist.
pub fn modified(path: &Path) -> anyhow::Result<Option<SystemTime>> {
    match std::fs::metadata(path) {
        Ok(metadata) => {
            let time = metadata
                .modified()
                .with_context(|| format!("Failed to read timestamp: {}", path.display()))?;
            Ok(Some(time))
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => {
            Err(err).with_context(|| format!("Failed to read metadata: {}", path.display()))
        }
    }
}

pub fn format_time(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339()
}

pub fn describe_file(path: &Path) -> anyhow::Result<String> {
    let stamp = match modified(path)? {
        Some(time) => format_time(time),
        None => "Not Exists".to_string(),
    };
    Ok(format!("\"{}\" ({})", path.display(), stamp))
}

/// Deletes a file, treating an already-missing file as success.
pub fn remove_file_quietly(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
