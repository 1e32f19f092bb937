use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Local;

use crate::path::remove_file_quietly;

/// A log file receiving a copy of the console for one run. Kept only when
/// the run fails.
#[derive(Debug)]
pub struct LogFile {
    path: PathBuf,
}

impl LogFile {
    /// Creates a new uniquely named log file in `directory`, first removing
    /// the oldest logs so that at most `max_files` remain afterwards.
    pub fn create(directory: &Path, max_files: usize) -> anyhow::Result<(Self, File)> {
        fs::create_dir_all(directory).with_context(|| {
            format!("Failed to create log directory: {}", directory.display())
        })?;

        rotate(directory, max_files.saturating_sub(1))?;

        let stem = Local::now().format("%Y-%m-%dT%H-%M-%S%.6f").to_string();
        for attempt in 0u32.. {
            let name = if attempt == 0 {
                format!("{}.log", stem)
            } else {
                format!("{}-{}.log", stem, attempt)
            };
            let path = directory.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((Self { path }, file)),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("The log file could not be created: {}", path.display())
                    })
                }
            }
        }

        anyhow::bail!("The log file could not be created in {}", directory.display())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the log after a successful run; keeps it otherwise.
    pub fn finish(self, success: bool) -> io::Result<()> {
        if success {
            remove_file_quietly(&self.path)
        } else {
            Ok(())
        }
    }
}

fn rotate(directory: &Path, keep: usize) -> anyhow::Result<()> {
    let mut logs: Vec<PathBuf> = fs::read_dir(directory)
        .with_context(|| format!("Failed to read log directory: {}", directory.display()))?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "log"))
        .collect();

    if logs.len() <= keep {
        return Ok(());
    }

    // Names start with a sortable timestamp, so lexical order is age order.
    logs.sort();
    let excess = logs.len() - keep;
    for old in logs.into_iter().take(excess) {
        remove_file_quietly(&old)
            .with_context(|| format!("Failed to remove old log file: {}", old.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_then_delete_on_success() {
        let dir = tempfile::TempDir::new().unwrap();
        let (log, _file) = LogFile::create(dir.path(), 5).unwrap();
        let path = log.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(path.extension().unwrap(), "log");

        log.finish(true).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_kept_on_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let (log, _file) = LogFile::create(dir.path(), 5).unwrap();
        let path = log.path().to_path_buf();

        log.finish(false).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_rotation_removes_oldest() {
        let dir = tempfile::TempDir::new().unwrap();
        for name in ["2020-01-01.log", "2021-01-01.log", "2022-01-01.log", "notes.txt"] {
            fs::write(dir.path().join(name), b"old").unwrap();
        }

        let (log, _file) = LogFile::create(dir.path(), 2).unwrap();

        assert!(!dir.path().join("2020-01-01.log").exists());
        assert!(!dir.path().join("2021-01-01.log").exists());
        assert!(dir.path().join("2022-01-01.log").exists());
        assert!(dir.path().join("notes.txt").exists());
        assert!(log.path().exists());
    }

    #[test]
    fn test_unique_names() {
        let dir = tempfile::TempDir::new().unwrap();
        let (first, _a) = LogFile::create(dir.path(), 10).unwrap();
        let (second, _b) = LogFile::create(dir.path(), 10).unwrap();
        assert_ne!(first.path(), second.path());
    }
}
