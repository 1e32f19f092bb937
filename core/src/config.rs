use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logs: LogsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogsConfig {
    #[serde(default = "default_log_directory")]
    pub directory: String,
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            max_files: default_max_files(),
        }
    }
}

fn default_log_directory() -> String {
    "~/.bmake/log".to_string()
}

fn default_max_files() -> usize {
    20
}

impl Config {
    pub fn global_path() -> PathBuf {
        Self::expand_path("~/.config/bmake/bmake.toml")
    }

    pub fn expand_path(path: &str) -> PathBuf {
        let expanded = shellexpand::tilde(path);
        PathBuf::from(expanded.as_ref())
    }

    /// Loads `path` when given, the global configuration otherwise. A missing
    /// file yields the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load_from_file(Self::global_path()),
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = Self::expand_path(&path.as_ref().to_string_lossy());

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn log_directory(&self) -> PathBuf {
        Self::expand_path(&self.logs.directory)
    }

    pub fn max_log_files(&self) -> usize {
        self.logs.max_files.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_section_missing() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.logs.directory, "~/.bmake/log");
        assert_eq!(config.logs.max_files, 20);
    }

    #[test]
    fn test_partial_logs_section() {
        let config = Config::parse("[logs]\nmax_files = 0\n").unwrap();
        assert_eq!(config.logs.directory, "~/.bmake/log");
        assert_eq!(config.max_log_files(), 1);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.logs.max_files, 20);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bmake.toml");
        std::fs::write(&path, "[logs]\ndirectory = \"/var/log/bmake\"\nmax_files = 3\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.log_directory(), PathBuf::from("/var/log/bmake"));
        assert_eq!(config.max_log_files(), 3);
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        assert!(Config::parse("[logs\n").is_err());
    }
}
